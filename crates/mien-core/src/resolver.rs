//! Session resolution with a cache-aside read path.
//!
//! `credential → identity provider → cache lookup → (miss) system of record →
//! cache populate`. Each step is a sequential suspend point; concurrent misses
//! for the same subject are not coalesced and simply both populate the cache.

use std::{future::Future, sync::Arc, time::Duration};

use tracing::{debug, warn};

use crate::{
  Error, Result,
  profile::Profile,
  session::{Credential, Resolution, SessionSubject},
  store::{IdentityProvider, ProfileCache, ProfileStore},
};

// ─── Configuration ───────────────────────────────────────────────────────────

/// Bounded retry for transient system-of-record failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
  /// Total attempts, including the first. Zero behaves like one.
  pub attempts: u32,
  /// Delay before the second attempt; grows linearly with each retry.
  pub backoff:  Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self { attempts: 3, backoff: Duration::from_millis(50) }
  }
}

impl RetryPolicy {
  pub fn none() -> Self { Self { attempts: 1, backoff: Duration::ZERO } }

  /// Run `op` until it succeeds, fails with a non-retryable error, or the
  /// attempt budget is spent.
  pub async fn run<T, E, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Into<Error>,
  {
    let attempts = self.attempts.max(1);
    let mut attempt = 1;
    loop {
      match op().await {
        Ok(v) => return Ok(v),
        Err(e) => {
          let err: Error = e.into();
          if !err.is_retryable() || attempt >= attempts {
            return Err(err);
          }
          warn!(attempt, attempts, error = %err, "{what} failed, retrying");
          tokio::time::sleep(self.backoff * attempt).await;
          attempt += 1;
        }
      }
    }
  }
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
  /// Where unauthenticated callers are sent.
  pub redirect_to: String,
  /// Lifetime of a cache entry after it is written.
  pub cache_ttl:   Duration,
  pub retry:       RetryPolicy,
}

impl Default for ResolverConfig {
  fn default() -> Self {
    Self {
      redirect_to: "/".to_string(),
      cache_ttl:   Duration::from_secs(300),
      retry:       RetryPolicy::default(),
    }
  }
}

// ─── Resolver ────────────────────────────────────────────────────────────────

/// Resolves a request's credential into a session subject and, on demand, the
/// subject's full [`Profile`].
///
/// All collaborators are injected; there is no process-wide state.
pub struct SessionResolver<I, C, S> {
  identity: Arc<I>,
  cache:    Arc<C>,
  store:    Arc<S>,
  config:   ResolverConfig,
}

impl<I, C, S> SessionResolver<I, C, S>
where
  I: IdentityProvider,
  C: ProfileCache,
  S: ProfileStore,
{
  pub fn new(
    identity: Arc<I>,
    cache: Arc<C>,
    store: Arc<S>,
    config: ResolverConfig,
  ) -> Self {
    Self { identity, cache, store, config }
  }

  pub fn config(&self) -> &ResolverConfig { &self.config }

  /// Ask the identity provider who this credential belongs to.
  ///
  /// Missing credentials, rejected credentials and identity-provider failures
  /// all yield [`Resolution::Unauthenticated`].
  pub async fn resolve_session(
    &self,
    credential: Option<&Credential>,
  ) -> Resolution<SessionSubject> {
    let Some(credential) = credential else {
      debug!("no session credential presented");
      return self.unauthenticated();
    };

    match self.identity.get_session(credential).await {
      Ok(Some(subject)) => {
        debug!(subject_id = %subject.id, "session resolved");
        Resolution::Resolved(subject)
      }
      Ok(None) => {
        debug!("session credential rejected");
        self.unauthenticated()
      }
      Err(e) => {
        warn!(error = %e, "identity provider failed, treating request as unauthenticated");
        self.unauthenticated()
      }
    }
  }

  /// Resolve the session and return the subject's profile, consulting the
  /// cache before the system of record.
  pub async fn resolve_profile(
    &self,
    credential: Option<&Credential>,
  ) -> Result<Resolution<Profile>> {
    let subject = match self.resolve_session(credential).await {
      Resolution::Resolved(subject) => subject,
      Resolution::Unauthenticated { redirect_to } => {
        return Ok(Resolution::Unauthenticated { redirect_to });
      }
    };

    self.profile_for(&subject.id).await.map(Resolution::Resolved)
  }

  /// Cache-aside read of a single profile by subject id.
  pub async fn profile_for(&self, id: &str) -> Result<Profile> {
    if let Some(profile) = self.cached(id).await {
      debug!(subject_id = %id, "profile cache hit");
      return Ok(profile);
    }
    debug!(subject_id = %id, "profile cache miss");

    let store: &S = &self.store;
    let profile = self
      .config
      .retry
      .run("profile lookup", move || store.get_profile(id))
      .await?
      .ok_or_else(|| Error::NotFound(id.to_owned()))?;

    self.populate(&profile).await;
    Ok(profile)
  }

  fn unauthenticated<T>(&self) -> Resolution<T> {
    Resolution::Unauthenticated { redirect_to: self.config.redirect_to.clone() }
  }

  /// A cache failure or an undecodable entry counts as a miss.
  async fn cached(&self, id: &str) -> Option<Profile> {
    let raw = match self.cache.get(id).await {
      Ok(raw) => raw?,
      Err(e) => {
        warn!(subject_id = %id, error = %e, "profile cache read failed, bypassing");
        return None;
      }
    };

    match Profile::from_cached(&raw) {
      Ok(profile) if profile.id == id => Some(profile),
      Ok(profile) => {
        warn!(subject_id = %id, cached_id = %profile.id, "cache entry belongs to another subject");
        None
      }
      Err(e) => {
        warn!(subject_id = %id, error = %e, "undecodable profile cache entry");
        None
      }
    }
  }

  async fn populate(&self, profile: &Profile) {
    let raw = match profile.to_cached() {
      Ok(raw) => raw,
      Err(e) => {
        warn!(subject_id = %profile.id, error = %e, "cannot encode profile for cache");
        return;
      }
    };
    if let Err(e) = self.cache.set(&profile.id, raw, self.config.cache_ttl).await {
      warn!(subject_id = %profile.id, error = %e, "profile cache write failed");
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::Ordering;

  use super::*;
  use crate::testing::{FakeCache, FakeIdentity, FakeStore, profile};

  fn resolver(
    identity: FakeIdentity,
    cache: FakeCache,
    store: FakeStore,
  ) -> (
    SessionResolver<FakeIdentity, FakeCache, FakeStore>,
    Arc<FakeIdentity>,
    Arc<FakeCache>,
    Arc<FakeStore>,
  ) {
    let identity = Arc::new(identity);
    let cache = Arc::new(cache);
    let store = Arc::new(store);
    let config = ResolverConfig {
      retry: RetryPolicy { attempts: 3, backoff: Duration::ZERO },
      ..Default::default()
    };
    (
      SessionResolver::new(identity.clone(), cache.clone(), store.clone(), config),
      identity,
      cache,
      store,
    )
  }

  fn cred(token: &str) -> Credential { Credential::new(token).unwrap() }

  #[tokio::test]
  async fn miss_populates_cache_and_second_call_hits() {
    let ada = profile("u1", "Ada");
    let (r, _, cache, store) = resolver(
      FakeIdentity::with("tok-u1", &ada),
      FakeCache::default(),
      FakeStore::with(&[ada.clone()]),
    );

    let first = r.resolve_profile(Some(&cred("tok-u1"))).await.unwrap();
    assert_eq!(first, Resolution::Resolved(ada.clone()));
    assert!(cache.contains("u1"));
    assert_eq!(store.reads.load(Ordering::SeqCst), 1);

    let second = r.resolve_profile(Some(&cred("tok-u1"))).await.unwrap();
    assert_eq!(second, Resolution::Resolved(ada));
    assert_eq!(store.reads.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn resolved_profile_id_matches_subject() {
    let grace = profile("u7", "Grace");
    let (r, ..) = resolver(
      FakeIdentity::with("tok", &grace),
      FakeCache::default(),
      FakeStore::with(&[grace.clone(), profile("u8", "Other")]),
    );
    let resolved = r
      .resolve_profile(Some(&cred("tok")))
      .await
      .unwrap()
      .resolved()
      .unwrap();
    assert_eq!(resolved.id, "u7");
  }

  #[tokio::test]
  async fn missing_row_is_not_found() {
    let ghost = profile("u2", "Ghost");
    let (r, _, cache, _) = resolver(
      FakeIdentity::with("tok-u2", &ghost),
      FakeCache::default(),
      FakeStore::default(),
    );
    let err = r.resolve_profile(Some(&cred("tok-u2"))).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(ref id) if id == "u2"), "{err:?}");
    assert!(!cache.contains("u2"));
  }

  #[tokio::test]
  async fn no_credential_short_circuits() {
    let (r, identity, cache, store) = resolver(
      FakeIdentity::default(),
      FakeCache::default(),
      FakeStore::default(),
    );
    let outcome = r.resolve_profile(None).await.unwrap();
    assert_eq!(outcome, Resolution::Unauthenticated { redirect_to: "/".into() });
    assert_eq!(identity.calls.load(Ordering::SeqCst), 0);
    assert_eq!(cache.reads.load(Ordering::SeqCst), 0);
    assert_eq!(store.reads.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn rejected_credential_never_reaches_cache_or_store() {
    let (r, identity, cache, store) = resolver(
      FakeIdentity::default(),
      FakeCache::default(),
      FakeStore::with(&[profile("u1", "Ada")]),
    );
    let outcome = r.resolve_profile(Some(&cred("bogus"))).await.unwrap();
    assert!(!outcome.is_resolved());
    assert_eq!(identity.calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.reads.load(Ordering::SeqCst), 0);
    assert_eq!(store.reads.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn identity_outage_is_unauthenticated() {
    let identity = FakeIdentity::default();
    identity.fail.store(true, Ordering::SeqCst);
    let (r, ..) = resolver(identity, FakeCache::default(), FakeStore::default());
    let outcome = r.resolve_session(Some(&cred("tok"))).await;
    assert_eq!(outcome, Resolution::Unauthenticated { redirect_to: "/".into() });
  }

  #[tokio::test]
  async fn cache_outage_falls_back_to_store() {
    let ada = profile("u1", "Ada");
    let cache = FakeCache::default();
    cache.fail.store(true, Ordering::SeqCst);
    let (r, _, _, store) = resolver(
      FakeIdentity::with("tok", &ada),
      cache,
      FakeStore::with(&[ada.clone()]),
    );

    for _ in 0..2 {
      let outcome = r.resolve_profile(Some(&cred("tok"))).await.unwrap();
      assert_eq!(outcome, Resolution::Resolved(ada.clone()));
    }
    assert_eq!(store.reads.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn garbage_cache_entry_is_replaced() {
    let ada = profile("u1", "Ada");
    let cache = FakeCache::default();
    cache.insert("u1", "{not json");
    let (r, _, cache, store) = resolver(
      FakeIdentity::with("tok", &ada),
      cache,
      FakeStore::with(&[ada.clone()]),
    );

    let outcome = r.resolve_profile(Some(&cred("tok"))).await.unwrap();
    assert_eq!(outcome, Resolution::Resolved(ada.clone()));
    assert_eq!(store.reads.load(Ordering::SeqCst), 1);
    assert_eq!(Profile::from_cached(&cache.raw("u1").unwrap()).unwrap(), ada);
  }

  #[tokio::test]
  async fn cached_entry_is_served_without_revalidation() {
    let ada = profile("u1", "Ada");
    let mut stale = ada.clone();
    stale.name = Some("Ada (stale)".into());
    let cache = FakeCache::default();
    cache.insert("u1", &stale.to_cached().unwrap());
    let (r, _, _, store) = resolver(
      FakeIdentity::with("tok", &ada),
      cache,
      FakeStore::with(&[ada]),
    );

    let outcome = r.resolve_profile(Some(&cred("tok"))).await.unwrap();
    assert_eq!(outcome, Resolution::Resolved(stale));
    assert_eq!(store.reads.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn transient_store_failures_are_retried() {
    let ada = profile("u1", "Ada");
    let store = FakeStore::with(&[ada.clone()]);
    store.failures.store(2, Ordering::SeqCst);
    let (r, _, _, store) = resolver(FakeIdentity::with("tok", &ada), FakeCache::default(), store);

    let outcome = r.resolve_profile(Some(&cred("tok"))).await.unwrap();
    assert_eq!(outcome, Resolution::Resolved(ada));
    assert_eq!(store.reads.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn persistent_store_failure_is_upstream() {
    let ada = profile("u1", "Ada");
    let store = FakeStore::with(&[ada.clone()]);
    store.failures.store(10, Ordering::SeqCst);
    let (r, _, cache, store) = resolver(FakeIdentity::with("tok", &ada), FakeCache::default(), store);

    let err = r.resolve_profile(Some(&cred("tok"))).await.unwrap_err();
    assert!(err.is_retryable(), "{err:?}");
    assert_eq!(store.reads.load(Ordering::SeqCst), 3);
    assert!(!cache.contains("u1"));
  }

  #[tokio::test]
  async fn custom_redirect_target() {
    let identity = Arc::new(FakeIdentity::default());
    let r = SessionResolver::new(
      identity,
      Arc::new(FakeCache::default()),
      Arc::new(FakeStore::default()),
      ResolverConfig { redirect_to: "/sign-in".into(), ..Default::default() },
    );
    assert_eq!(
      r.resolve_session(None).await,
      Resolution::Unauthenticated { redirect_to: "/sign-in".into() }
    );
  }
}
