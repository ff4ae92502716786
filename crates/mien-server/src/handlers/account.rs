//! `/api/auth/*`: email/password accounts and the sessions issued for them.

use std::time::Duration;

use axum::{
  Json,
  extract::State,
  http::{HeaderMap, StatusCode},
  response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use chrono::{DateTime, Utc};
use mien_core::{
  Credential,
  profile::{Profile, ProfileUpdate, validate_email},
  store::{AccountStore as _, BlobStore, NewAccount, ProfileCache},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
  AppState, Backend,
  auth::{self, clear_session_cookie, session_cookie},
  error::Error,
};

pub const PASSWORD_MIN_LEN: usize = 8;

// ─── Request / response bodies ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SignUpBody {
  pub email:    String,
  pub password: String,
  #[serde(default)]
  pub name:     Option<String>,
  #[serde(default)]
  pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SignInBody {
  pub email:    String,
  pub password: String,
}

/// Returned by sign-up and sign-in alongside the session cookie.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionBody {
  pub token:      String,
  pub expires_at: DateTime<Utc>,
  pub profile:    Profile,
}

// ─── Handlers ────────────────────────────────────────────────────────────────

/// `POST /api/auth/sign-up`
pub async fn sign_up<S, C, B>(
  State(state): State<AppState<S, C, B>>,
  Json(body): Json<SignUpBody>,
) -> Result<Response, Error>
where
  S: Backend,
  C: ProfileCache + 'static,
  B: BlobStore + 'static,
{
  let email = body.email.trim().to_owned();
  validate_email(&email)?;
  check_password(&body.password)?;
  let fields = ProfileUpdate { name: body.name, username: body.username, ..Default::default() }
    .normalized()?;

  let password_hash = auth::hash_password(body.password).await?;
  let profile = state
    .store
    .create_account(NewAccount {
      email,
      name: fields.name,
      username: fields.username,
      password_hash,
    })
    .await
    .map_err(Error::core)?;
  info!(subject_id = %profile.id, "account created");

  let (credential, expires_at) = open_session(&state, &profile.id).await?;
  Ok(session_response(&state, StatusCode::CREATED, credential, expires_at, profile))
}

/// `POST /api/auth/sign-in`
pub async fn sign_in<S, C, B>(
  State(state): State<AppState<S, C, B>>,
  Json(body): Json<SignInBody>,
) -> Result<Response, Error>
where
  S: Backend,
  C: ProfileCache + 'static,
  B: BlobStore + 'static,
{
  let stored = state
    .within(state.store.password_hash(&body.email))
    .await?
    .map_err(Error::core)?;

  // Unknown emails still pay for an argon2 verification.
  let (candidate, phc) = match stored {
    Some(stored) => (Some(stored.user_id), stored.password_hash),
    None => (None, auth::DUMMY_PASSWORD_HASH.to_owned()),
  };
  let verified = auth::verify_password(body.password, phc).await;
  let user_id = match candidate {
    Some(user_id) if verified => user_id,
    Some(user_id) => {
      debug!(subject_id = %user_id, "sign-in with wrong password");
      return Err(Error::InvalidCredentials);
    }
    None => {
      debug!("sign-in for unknown email");
      return Err(Error::InvalidCredentials);
    }
  };

  let (credential, expires_at) = open_session(&state, &user_id).await?;
  let profile = state
    .within(state.resolver.profile_for(&user_id))
    .await??;
  info!(subject_id = %profile.id, "signed in");
  Ok(session_response(&state, StatusCode::OK, credential, expires_at, profile))
}

/// `POST /api/auth/sign-out`. Always succeeds; an unknown token is ignored.
pub async fn sign_out<S, C, B>(
  State(state): State<AppState<S, C, B>>,
  headers: HeaderMap,
) -> Result<Response, Error>
where
  S: Backend,
  C: ProfileCache + 'static,
  B: BlobStore + 'static,
{
  if let Some(credential) = auth::credential_from_headers(&headers) {
    let revoked = state
      .store
      .revoke_session(&credential)
      .await
      .map_err(Error::core)?;
    debug!(revoked, "signed out");
  }

  let cookie = clear_session_cookie(state.config.secure_cookies);
  Ok((StatusCode::NO_CONTENT, CookieJar::new().add(cookie)).into_response())
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn check_password(password: &str) -> Result<(), Error> {
  if password.chars().count() < PASSWORD_MIN_LEN {
    return Err(
      mien_core::Error::Invalid(format!(
        "password must be at least {PASSWORD_MIN_LEN} characters"
      ))
      .into(),
    );
  }
  Ok(())
}

async fn open_session<S, C, B>(
  state: &AppState<S, C, B>,
  user_id: &str,
) -> Result<(Credential, DateTime<Utc>), Error>
where
  S: Backend,
{
  let credential = auth::new_session_token();
  let ttl = chrono::Duration::from_std(Duration::from_secs(state.config.session_ttl_secs))
    .unwrap_or(chrono::Duration::MAX);
  let expires_at = Utc::now()
    .checked_add_signed(ttl)
    .unwrap_or(DateTime::<Utc>::MAX_UTC);

  state
    .store
    .create_session(user_id, &credential, expires_at)
    .await
    .map_err(Error::core)?;
  Ok((credential, expires_at))
}

fn session_response<S, C, B>(
  state: &AppState<S, C, B>,
  status: StatusCode,
  credential: Credential,
  expires_at: DateTime<Utc>,
  profile: Profile,
) -> Response {
  let cookie = session_cookie(
    &credential,
    state.config.session_ttl_secs,
    state.config.secure_cookies,
  );
  let body = SessionBody { token: credential.token().to_owned(), expires_at, profile };
  (status, CookieJar::new().add(cookie), Json(body)).into_response()
}
