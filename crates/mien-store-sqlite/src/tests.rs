//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{Duration, Utc};
use mien_core::{
  profile::{Profile, ProfileUpdate},
  session::Credential,
  store::{AccountStore, IdentityProvider, NewAccount, ProfileStore},
};

use crate::{Error, SqliteStore, hash_token};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn account(email: &str, username: Option<&str>) -> NewAccount {
  NewAccount {
    email:         email.into(),
    name:          Some("Ada".into()),
    username:      username.map(Into::into),
    password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".into(),
  }
}

async fn signed_up(s: &SqliteStore) -> Profile {
  s.create_account(account("ada@example.com", Some("ada")))
    .await
    .unwrap()
}

fn cred(token: &str) -> Credential { Credential::new(token).unwrap() }

// ─── Accounts ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_get_profile() {
  let s = store().await;
  let created = signed_up(&s).await;
  assert!(!created.email_verified);
  assert_eq!(created.username.as_deref(), Some("ada"));

  let fetched = s.get_profile(&created.id).await.unwrap().unwrap();
  assert_eq!(fetched, created);
}

#[tokio::test]
async fn get_profile_missing_returns_none() {
  let s = store().await;
  assert!(s.get_profile("u2").await.unwrap().is_none());
}

#[tokio::test]
async fn email_is_normalised_and_unique() {
  let s = store().await;
  let created = s
    .create_account(account("  Ada@Example.com", None))
    .await
    .unwrap();
  assert_eq!(created.email, "ada@example.com");

  let err = s
    .create_account(account("ADA@example.com", None))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Conflict("email")), "{err:?}");
}

#[tokio::test]
async fn duplicate_username_conflicts() {
  let s = store().await;
  signed_up(&s).await;
  let err = s
    .create_account(account("other@example.com", Some("ada")))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Conflict("username")), "{err:?}");
  assert!(matches!(mien_core::Error::from(err), mien_core::Error::Conflict(_)));
}

#[tokio::test]
async fn password_hash_lookup_is_case_insensitive() {
  let s = store().await;
  let created = signed_up(&s).await;
  let stored = s.password_hash("ADA@example.com").await.unwrap().unwrap();
  assert_eq!(stored.user_id, created.id);
  assert!(stored.password_hash.starts_with("$argon2id$"));
  assert!(s.password_hash("nobody@example.com").await.unwrap().is_none());
}

// ─── Profile edits ───────────────────────────────────────────────────────────

#[tokio::test]
async fn update_only_touches_present_fields() {
  let s = store().await;
  let created = signed_up(&s).await;

  let updated = s
    .update_profile(&created.id, ProfileUpdate {
      bio: Some("Enchantress of numbers".into()),
      ..Default::default()
    })
    .await
    .unwrap()
    .unwrap();

  assert_eq!(updated.bio.as_deref(), Some("Enchantress of numbers"));
  assert_eq!(updated.name, created.name);
  assert_eq!(updated.username, created.username);
  assert!(updated.updated_at >= created.updated_at);
}

#[tokio::test]
async fn update_missing_profile_returns_none() {
  let s = store().await;
  let result = s
    .update_profile("ghost", ProfileUpdate { name: Some("Ghost".into()), ..Default::default() })
    .await
    .unwrap();
  assert!(result.is_none());
}

#[tokio::test]
async fn update_to_taken_username_conflicts() {
  let s = store().await;
  signed_up(&s).await;
  let other = s
    .create_account(account("grace@example.com", Some("grace")))
    .await
    .unwrap();
  let err = s
    .update_profile(&other.id, ProfileUpdate { username: Some("ada".into()), ..Default::default() })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Conflict("username")), "{err:?}");
}

#[tokio::test]
async fn set_image_records_url() {
  let s = store().await;
  let created = signed_up(&s).await;
  let updated = s
    .set_image(&created.id, "http://localhost/avatars/a.png".into())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(updated.image.as_deref(), Some("http://localhost/avatars/a.png"));
  assert!(s.set_image("ghost", "x".into()).await.unwrap().is_none());
}

// ─── Sessions ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn live_session_resolves_subject() {
  let s = store().await;
  let created = signed_up(&s).await;
  s.create_session(&created.id, &cred("tok-1"), Utc::now() + Duration::hours(1))
    .await
    .unwrap();

  let subject = s.get_session(&cred("tok-1")).await.unwrap().unwrap();
  assert_eq!(subject.id, created.id);
  assert_eq!(subject.email, "ada@example.com");
}

#[tokio::test]
async fn unknown_and_expired_sessions_are_rejected() {
  let s = store().await;
  let created = signed_up(&s).await;
  s.create_session(&created.id, &cred("old"), Utc::now() - Duration::seconds(1))
    .await
    .unwrap();

  assert!(s.get_session(&cred("old")).await.unwrap().is_none());
  assert!(s.get_session(&cred("never-issued")).await.unwrap().is_none());
  assert_eq!(s.purge_expired_sessions().await.unwrap(), 1);
}

#[tokio::test]
async fn revoked_session_no_longer_resolves() {
  let s = store().await;
  let created = signed_up(&s).await;
  s.create_session(&created.id, &cred("tok"), Utc::now() + Duration::hours(1))
    .await
    .unwrap();

  assert!(s.revoke_session(&cred("tok")).await.unwrap());
  assert!(!s.revoke_session(&cred("tok")).await.unwrap());
  assert!(s.get_session(&cred("tok")).await.unwrap().is_none());
}

#[test]
fn token_digest_is_hex_sha256() {
  let digest = hash_token(&cred("abc"));
  assert_eq!(
    digest,
    "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
  );
}
