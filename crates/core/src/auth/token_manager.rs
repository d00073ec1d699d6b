//! Token manager with single-flight refresh
//!
//! Keeps one cached credential per realm:
//! - Cached credentials are served until they come within the safety margin
//!   of their expiry
//! - Concurrent callers that find the cache stale wait on one refresh instead
//!   of each hitting the token endpoint
//! - A failed refresh is reported to every waiter and never cached
//! - `invalidate` forces the next caller to refresh (used after a 401)

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use crawlsync_common::{Clock, SystemClock};
use crawlsync_domain::{AuthConfig, Credential, Realm};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::ports::CredentialSource;
use crate::errors::AuthError;

/// Per-realm cache slot
struct RealmSlot {
    source: Arc<dyn CredentialSource>,
    cached: RwLock<Option<Credential>>,
    /// Held by the task currently refreshing
    refresh_gate: Mutex<()>,
    /// Incremented after every completed refresh attempt
    attempts: AtomicU64,
    last_error: RwLock<Option<AuthError>>,
}

impl RealmSlot {
    fn new(source: Arc<dyn CredentialSource>) -> Self {
        Self {
            source,
            cached: RwLock::new(None),
            refresh_gate: Mutex::new(()),
            attempts: AtomicU64::new(0),
            last_error: RwLock::new(None),
        }
    }
}

/// Credential cache shared by every transport in the process.
pub struct TokenManager {
    slots: HashMap<Realm, RealmSlot>,
    clock: Arc<dyn Clock>,
    safety_margin: chrono::Duration,
}

impl TokenManager {
    /// Create a token manager with no realms; add sources with
    /// [`with_source`](Self::with_source).
    pub fn new(config: &AuthConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &AuthConfig, clock: Arc<dyn Clock>) -> Self {
        let margin_secs = i64::try_from(config.safety_margin_secs).unwrap_or(i64::MAX);
        Self {
            slots: HashMap::new(),
            clock,
            safety_margin: chrono::Duration::seconds(margin_secs),
        }
    }

    /// Register the credential source for `realm`, replacing any earlier one
    #[must_use]
    pub fn with_source(mut self, realm: Realm, source: Arc<dyn CredentialSource>) -> Self {
        self.slots.insert(realm, RealmSlot::new(source));
        self
    }

    pub fn has_realm(&self, realm: Realm) -> bool {
        self.slots.contains_key(&realm)
    }

    /// Return a credential for `realm` that will not expire within the
    /// safety margin, refreshing it if needed.
    ///
    /// # Errors
    /// Returns [`AuthError::NotConfigured`] for an unknown realm, or the
    /// source's error when a refresh fails.
    pub async fn get_token(&self, realm: Realm) -> Result<Credential, AuthError> {
        let slot = self.slots.get(&realm).ok_or(AuthError::NotConfigured(realm))?;

        if let Some(credential) = self.fresh_cached(slot).await {
            debug!(realm = %realm, "credential cache hit");
            return Ok(credential);
        }

        let observed_attempts = slot.attempts.load(Ordering::Acquire);
        let _gate = slot.refresh_gate.lock().await;

        // Someone else refreshed while we waited for the gate
        if let Some(credential) = self.fresh_cached(slot).await {
            debug!(realm = %realm, "credential refreshed by concurrent caller");
            return Ok(credential);
        }
        // A refresh completed while we queued: share its outcome even when the
        // credential's lifetime is shorter than the safety margin
        if slot.attempts.load(Ordering::Acquire) != observed_attempts {
            if let Some(credential) = slot.cached.read().await.clone() {
                debug!(realm = %realm, "sharing short-lived credential from concurrent refresh");
                return Ok(credential);
            }
            if let Some(err) = slot.last_error.read().await.clone() {
                return Err(err);
            }
        }

        let result = slot.source.fetch(realm).await;
        match &result {
            Ok(credential) => {
                info!(
                    realm = %realm,
                    expires_at = ?credential.expires_at,
                    "credential refreshed"
                );
                *slot.cached.write().await = Some(credential.clone());
                *slot.last_error.write().await = None;
            }
            Err(err) => {
                warn!(realm = %realm, error = %err, "credential refresh failed");
                *slot.cached.write().await = None;
                *slot.last_error.write().await = Some(err.clone());
            }
        }
        slot.attempts.fetch_add(1, Ordering::AcqRel);
        result
    }

    /// Drop the cached credential for `realm` so the next call refreshes.
    pub async fn invalidate(&self, realm: Realm) {
        if let Some(slot) = self.slots.get(&realm) {
            if slot.cached.write().await.take().is_some() {
                warn!(realm = %realm, "credential invalidated");
            }
        }
    }

    /// Number of completed refresh attempts for `realm`
    pub fn refresh_count(&self, realm: Realm) -> u64 {
        self.slots.get(&realm).map_or(0, |slot| slot.attempts.load(Ordering::Acquire))
    }

    fn now(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.clock.system_time())
    }

    async fn fresh_cached(&self, slot: &RealmSlot) -> Option<Credential> {
        let cached = slot.cached.read().await;
        cached.as_ref().filter(|c| c.is_fresh_at(self.now(), self.safety_margin)).cloned()
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut realms: Vec<_> = self.slots.keys().copied().collect();
        realms.sort();
        f.debug_struct("TokenManager")
            .field("realms", &realms)
            .field("safety_margin", &self.safety_margin)
            .finish_non_exhaustive()
    }
}
