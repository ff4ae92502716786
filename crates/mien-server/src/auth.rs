//! Session credentials, password hashing and the `CurrentSubject` extractor.
//!
//! A credential is accepted from `Authorization: Bearer <token>` first and the
//! `mien_session` cookie second.

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
  password_hash::SaltString,
};
use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, header, request::Parts};
use axum_extra::extract::CookieJar;
use cookie::{Cookie, SameSite, time};
use mien_core::{
  Credential, Resolution,
  session::SessionSubject,
  store::{BlobStore, ProfileCache},
};
use rand_core::{OsRng, RngCore};

use crate::{AppState, Backend, error::Error};

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "mien_session";

const TOKEN_BYTES: usize = 32;

/// Verified against when the email is unknown, so a miss costs one argon2 run
/// like a hit does. Nothing hashes to it.
pub const DUMMY_PASSWORD_HASH: &str =
  "$argon2id$v=19$m=19456,t=2,p=1$c2FsdHNhbHRzYWx0c2FsdA$fKjlSKcNMktbL18q5obzU9bew3V8dYyQOHE3D2LRtbM";

// ─── Credentials ─────────────────────────────────────────────────────────────

/// Pull the session credential out of the request headers, if any.
pub fn credential_from_headers(headers: &HeaderMap) -> Option<Credential> {
  bearer_token(headers).and_then(Credential::new).or_else(|| {
    CookieJar::from_headers(headers)
      .get(SESSION_COOKIE)
      .and_then(|c| Credential::new(c.value()))
  })
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
  let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
  let (scheme, token) = value.split_once(' ')?;
  scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
}

/// A fresh random session token: 32 bytes from the OS, hex-encoded.
pub fn new_session_token() -> Credential {
  let mut buf = [0u8; TOKEN_BYTES];
  OsRng.fill_bytes(&mut buf);
  Credential::issued(hex::encode(buf))
}

/// The session cookie carrying `credential` for `max_age_secs`.
pub fn session_cookie(credential: &Credential, max_age_secs: u64, secure: bool) -> Cookie<'static> {
  let max_age = time::Duration::seconds(i64::try_from(max_age_secs).unwrap_or(i64::MAX));
  base_cookie(credential.token().to_owned(), secure)
    .max_age(max_age)
    .build()
}

/// A cookie that makes the client drop the session cookie.
pub fn clear_session_cookie(secure: bool) -> Cookie<'static> {
  let mut cookie = base_cookie(String::new(), secure).build();
  cookie.make_removal();
  cookie
}

fn base_cookie(value: String, secure: bool) -> cookie::CookieBuilder<'static> {
  Cookie::build((SESSION_COOKIE, value))
    .http_only(true)
    .secure(secure)
    .same_site(SameSite::Lax)
    .path("/")
}

// ─── Passwords ───────────────────────────────────────────────────────────────

/// Hash `password` into an argon2id PHC string.
pub fn hash_password_blocking(password: &str) -> Result<String, argon2::password_hash::Error> {
  let salt = SaltString::generate(&mut OsRng);
  Ok(Argon2::default().hash_password(password.as_bytes(), &salt)?.to_string())
}

/// [`hash_password_blocking`] on the blocking pool.
pub async fn hash_password(password: String) -> Result<String, Error> {
  tokio::task::spawn_blocking(move || hash_password_blocking(&password))
    .await
    .map_err(|e| Error::PasswordHash(e.to_string()))?
    .map_err(|e| Error::PasswordHash(e.to_string()))
}

/// Check `password` against a stored PHC string. Malformed hashes never match.
pub async fn verify_password(password: String, phc: String) -> bool {
  tokio::task::spawn_blocking(move || {
    let Ok(parsed) = PasswordHash::new(&phc) else {
      return false;
    };
    Argon2::default()
      .verify_password(password.as_bytes(), &parsed)
      .is_ok()
  })
  .await
  .unwrap_or(false)
}

// ─── Extractor ───────────────────────────────────────────────────────────────

/// The authenticated session subject. Rejects with a redirect when the
/// request carries no live session.
pub struct CurrentSubject(pub SessionSubject);

impl<S, C, B> FromRequestParts<AppState<S, C, B>> for CurrentSubject
where
  S: Backend,
  C: ProfileCache + 'static,
  B: BlobStore + 'static,
{
  type Rejection = Error;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S, C, B>,
  ) -> Result<Self, Self::Rejection> {
    let credential = credential_from_headers(&parts.headers);
    let resolution = state
      .within(state.resolver.resolve_session(credential.as_ref()))
      .await?;
    match resolution {
      Resolution::Resolved(subject) => Ok(CurrentSubject(subject)),
      Resolution::Unauthenticated { redirect_to } => Err(Error::Unauthenticated { redirect_to }),
    }
  }
}
