//! `/api/session` and `/api/profile`: reading and editing the signed-in
//! subject's profile.

use axum::{
  Json,
  extract::{Query, State},
  http::{HeaderMap, header},
};
use bytes::Bytes;
use mien_core::{
  Resolution,
  profile::{Profile, ProfileUpdate},
  session::SessionSubject,
  store::{BlobStore, ProfileCache},
};
use serde::Deserialize;

use crate::{
  AppState, Backend,
  auth::{CurrentSubject, credential_from_headers},
  error::Error,
};

/// `GET /api/profile`: the full profile, read through the cache.
pub async fn show<S, C, B>(
  State(state): State<AppState<S, C, B>>,
  headers: HeaderMap,
) -> Result<Json<Profile>, Error>
where
  S: Backend,
  C: ProfileCache + 'static,
  B: BlobStore + 'static,
{
  let credential = credential_from_headers(&headers);
  let resolution = state
    .within(state.resolver.resolve_profile(credential.as_ref()))
    .await??;

  match resolution {
    Resolution::Resolved(profile) => Ok(Json(profile)),
    Resolution::Unauthenticated { redirect_to } => Err(Error::Unauthenticated { redirect_to }),
  }
}

/// `GET /api/session`: the session subject only, without touching the cache.
pub async fn session<S, C, B>(
  State(_state): State<AppState<S, C, B>>,
  CurrentSubject(subject): CurrentSubject,
) -> Json<SessionSubject>
where
  S: Backend,
  C: ProfileCache + 'static,
  B: BlobStore + 'static,
{
  Json(subject)
}

/// `PATCH /api/profile`
pub async fn update<S, C, B>(
  State(state): State<AppState<S, C, B>>,
  CurrentSubject(subject): CurrentSubject,
  Json(update): Json<ProfileUpdate>,
) -> Result<Json<Profile>, Error>
where
  S: Backend,
  C: ProfileCache + 'static,
  B: BlobStore + 'static,
{
  let profile = state
    .within(state.updater.update_profile(&subject.id, update))
    .await??;
  Ok(Json(profile))
}

#[derive(Debug, Deserialize)]
pub struct AvatarQuery {
  pub filename: Option<String>,
}

/// `POST /api/profile/avatar?filename=<name>` with the raw image as the body.
pub async fn upload_avatar<S, C, B>(
  State(state): State<AppState<S, C, B>>,
  CurrentSubject(subject): CurrentSubject,
  Query(query): Query<AvatarQuery>,
  headers: HeaderMap,
  body: Bytes,
) -> Result<Json<Profile>, Error>
where
  S: Backend,
  C: ProfileCache + 'static,
  B: BlobStore + 'static,
{
  let content_type = headers
    .get(header::CONTENT_TYPE)
    .and_then(|v| v.to_str().ok())
    .unwrap_or("application/octet-stream")
    .to_ascii_lowercase();
  let file_name = query.filename.as_deref().unwrap_or("avatar");

  let profile = state
    .within(
      state
        .updater
        .upload_avatar(&subject.id, file_name, &content_type, body.to_vec()),
    )
    .await??;
  Ok(Json(profile))
}
