//! HTTP layer for Mien.
//!
//! Exposes an axum [`Router`] serving session resolution, account sign-up /
//! sign-in and profile edits, backed by any store that implements the
//! `mien-core` traits.

pub mod auth;
pub mod blob;
pub mod error;
pub mod handlers;

pub use blob::FsBlobStore;
pub use error::Error;

use std::{future::Future, path::PathBuf, sync::Arc, time::Duration};

use axum::{
  Router,
  extract::DefaultBodyLimit,
  http::{HeaderValue, header},
  routing::{get, post},
};
use mien_cache::CacheConfig;
use mien_core::{
  ProfileUpdater, RetryPolicy, SessionResolver,
  resolver::ResolverConfig,
  store::{AccountStore, BlobStore, IdentityProvider, ProfileCache, ProfileStore},
  update::AVATAR_MAX_BYTES,
};
use serde::Deserialize;
use tower::Layer as _;
use tower_http::{
  services::ServeDir,
  set_header::SetResponseHeaderLayer,
  trace::TraceLayer,
};

use handlers::{account, profile};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and `MIEN_*`
/// environment variables.
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ServerConfig {
  pub host:               String,
  pub port:               u16,
  /// Origin prefixed to avatar URLs, e.g. `https://mien.example.com`.
  pub public_base_url:    String,
  pub store_path:         PathBuf,
  pub avatar_dir:         PathBuf,
  /// Where unauthenticated requests are redirected.
  pub redirect_to:        String,
  pub session_ttl_secs:   u64,
  pub request_timeout_ms: u64,
  /// Mark the session cookie `Secure`. Enable behind HTTPS.
  pub secure_cookies:     bool,
  pub cache:              CacheConfig,
  pub retry:              RetryConfig,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:               "127.0.0.1".to_string(),
      port:               3000,
      public_base_url:    "http://localhost:3000".to_string(),
      store_path:         PathBuf::from("mien.db"),
      avatar_dir:         PathBuf::from("avatars"),
      redirect_to:        "/".to_string(),
      session_ttl_secs:   7 * 24 * 60 * 60,
      request_timeout_ms: 10_000,
      secure_cookies:     false,
      cache:              CacheConfig::default(),
      retry:              RetryConfig::default(),
    }
  }
}

impl ServerConfig {
  pub fn request_timeout(&self) -> Duration { Duration::from_millis(self.request_timeout_ms) }

  pub fn resolver_config(&self) -> ResolverConfig {
    ResolverConfig {
      redirect_to: self.redirect_to.clone(),
      cache_ttl:   self.cache.ttl(),
      retry:       self.retry.policy(),
    }
  }
}

/// `[retry]` section: bounded retry of system-of-record reads.
#[derive(Deserialize, Clone, Copy, Debug)]
#[serde(default)]
pub struct RetryConfig {
  pub attempts:   u32,
  pub backoff_ms: u64,
}

impl Default for RetryConfig {
  fn default() -> Self {
    let policy = RetryPolicy::default();
    Self { attempts: policy.attempts, backoff_ms: policy.backoff.as_millis() as u64 }
  }
}

impl RetryConfig {
  pub fn policy(&self) -> RetryPolicy {
    RetryPolicy { attempts: self.attempts, backoff: Duration::from_millis(self.backoff_ms) }
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// A store that is at once the identity provider, the profile system of
/// record and the account registry.
pub trait Backend: ProfileStore + AccountStore + IdentityProvider + 'static {}

impl<T> Backend for T where T: ProfileStore + AccountStore + IdentityProvider + 'static {}

/// Shared state threaded through all axum handlers.
pub struct AppState<S, C, B> {
  pub store:    Arc<S>,
  pub resolver: Arc<SessionResolver<S, C, S>>,
  pub updater:  Arc<ProfileUpdater<S, C, B>>,
  pub config:   Arc<ServerConfig>,
}

// Derived `Clone` would demand `S: Clone` and friends; only the `Arc`s clone.
impl<S, C, B> Clone for AppState<S, C, B> {
  fn clone(&self) -> Self {
    Self {
      store:    Arc::clone(&self.store),
      resolver: Arc::clone(&self.resolver),
      updater:  Arc::clone(&self.updater),
      config:   Arc::clone(&self.config),
    }
  }
}

impl<S, C, B> AppState<S, C, B>
where
  S: Backend,
  C: ProfileCache + 'static,
  B: BlobStore + 'static,
{
  /// Wire the resolver and updater around shared collaborators.
  pub fn new(store: Arc<S>, cache: Arc<C>, blobs: Arc<B>, config: ServerConfig) -> Self {
    let resolver = SessionResolver::new(
      Arc::clone(&store),
      Arc::clone(&cache),
      Arc::clone(&store),
      config.resolver_config(),
    );
    let updater = ProfileUpdater::new(Arc::clone(&store), cache, blobs);
    Self {
      store,
      resolver: Arc::new(resolver),
      updater: Arc::new(updater),
      config: Arc::new(config),
    }
  }

  /// Run `fut` under the configured request timeout.
  pub async fn within<F: Future>(&self, fut: F) -> Result<F::Output, Error> {
    tokio::time::timeout(self.config.request_timeout(), fut)
      .await
      .map_err(|_| Error::Timeout)
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the axum [`Router`] for the Mien server.
pub fn router<S, C, B>(state: AppState<S, C, B>) -> Router
where
  S: Backend,
  C: ProfileCache + 'static,
  B: BlobStore + 'static,
{
  // Stored avatars are served by extension only; browsers must not sniff.
  let avatars = SetResponseHeaderLayer::overriding(
    header::X_CONTENT_TYPE_OPTIONS,
    HeaderValue::from_static("nosniff"),
  )
  .layer(ServeDir::new(&state.config.avatar_dir));

  Router::new()
    .route("/api/auth/sign-up",   post(account::sign_up::<S, C, B>))
    .route("/api/auth/sign-in",   post(account::sign_in::<S, C, B>))
    .route("/api/auth/sign-out",  post(account::sign_out::<S, C, B>))
    .route("/api/session",        get(profile::session::<S, C, B>))
    .route("/api/profile",        get(profile::show::<S, C, B>).patch(profile::update::<S, C, B>))
    .route("/api/profile/avatar", post(profile::upload_avatar::<S, C, B>))
    .nest_service("/avatars", avatars)
    // Leave headroom over the avatar cap so the size check can report it.
    .layer(DefaultBodyLimit::max(AVATAR_MAX_BYTES + 64 * 1024))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

// ─── Integration tests ────────────────────────────────────────────────────────
