//! Configuration structures
//!
//! Loaded from TOML, JSON or `CRAWLSYNC_*` environment variables by the infra
//! config loader. Secrets only ever arrive through these values.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_PAGE_SIZE, UNAUTHENTICATED_MESSAGE};
use crate::errors::{CrawlSyncError, Result};
use crate::types::Realm;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub governor: GovernorConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        self.api.validate()?;
        self.transport.validate()?;
        self.governor.validate()?;
        self.crawl.validate()?;
        self.store.validate()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    pub primary: RealmConfig,
    #[serde(default)]
    pub orchestration: Option<RealmConfig>,
}

impl ApiConfig {
    pub fn realm(&self, realm: Realm) -> Option<&RealmConfig> {
        match realm {
            Realm::Primary => Some(&self.primary),
            Realm::Orchestration => self.orchestration.as_ref(),
        }
    }

    fn validate(&self) -> Result<()> {
        self.primary.validate(Realm::Primary)?;
        if let Some(orchestration) = &self.orchestration {
            orchestration.validate(Realm::Orchestration)?;
        }
        Ok(())
    }
}

/// Endpoint and credentials for one realm.
///
/// Either `static_token` or the client-credentials triple
/// (`token_url`, `client_id`, `client_secret`) must be present.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RealmConfig {
    pub endpoint: String,
    #[serde(default)]
    pub token_url: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub static_token: Option<String>,
}

impl RealmConfig {
    pub fn has_client_credentials(&self) -> bool {
        self.token_url.is_some() && self.client_id.is_some() && self.client_secret.is_some()
    }

    fn validate(&self, realm: Realm) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(CrawlSyncError::Config(format!("api.{realm}.endpoint is required")));
        }
        if self.static_token.is_none() && !self.has_client_credentials() {
            return Err(CrawlSyncError::Config(format!(
                "api.{realm} needs either static_token or token_url, client_id and client_secret"
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for RealmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealmConfig")
            .field("endpoint", &self.endpoint)
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("audience", &self.audience)
            .field("scope", &self.scope)
            .field("static_token", &self.static_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// GraphQL error classification inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub timeout_secs: u64,
    /// Error codes returned alongside data that should not fail the call
    pub informational_codes: Vec<String>,
    /// Error codes worth retrying
    pub transient_codes: Vec<String>,
    /// Error codes treated as server throttling
    pub throttle_codes: Vec<String>,
    /// Error codes treated as an expired or rejected credential
    pub unauthorized_codes: Vec<String>,
    /// Message fragments treated as an expired or rejected credential
    pub unauthorized_patterns: Vec<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            informational_codes: Vec::new(),
            transient_codes: vec![
                "INTERNAL_SERVER_ERROR".into(),
                "SERVICE_UNAVAILABLE".into(),
                "TIMEOUT".into(),
            ],
            throttle_codes: vec!["THROTTLED".into(), "RATE_LIMITED".into()],
            unauthorized_codes: vec!["UNAUTHENTICATED".into(), "FORBIDDEN".into()],
            unauthorized_patterns: vec![UNAUTHENTICATED_MESSAGE.into()],
        }
    }
}

impl TransportConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(CrawlSyncError::Config("transport.timeout_secs must be > 0".into()));
        }
        Ok(())
    }
}

/// Rate and retry budget shared by every crawl stream in the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    pub requests_per_second: u32,
    pub burst: u32,
    pub max_concurrent: usize,
    /// Calls allowed per failure kind before giving up
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 5,
            burst: 5,
            max_concurrent: 4,
            max_attempts: 5,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

impl GovernorConfig {
    pub const fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub const fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.requests_per_second == 0 || self.burst == 0 {
            return Err(CrawlSyncError::Config(
                "governor.requests_per_second and governor.burst must be > 0".into(),
            ));
        }
        if self.max_concurrent == 0 {
            return Err(CrawlSyncError::Config("governor.max_concurrent must be > 0".into()));
        }
        if self.max_attempts == 0 {
            return Err(CrawlSyncError::Config("governor.max_attempts must be > 0".into()));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(CrawlSyncError::Config(
                "governor.base_delay_ms must not exceed governor.max_delay_ms".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// A token is refreshed this long before it expires
    pub safety_margin_secs: u64,
    pub token_timeout_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self { safety_margin_secs: 60, token_timeout_secs: 30 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    pub page_size: u32,
    /// Deepest offset the server accepts, e.g. 10 000 for ElasticSearch
    pub offset_ceiling: Option<u64>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self { page_size: DEFAULT_PAGE_SIZE, offset_ceiling: None }
    }
}

impl CrawlConfig {
    fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(CrawlSyncError::Config("crawl.page_size must be > 0".into()));
        }
        if let Some(ceiling) = self.offset_ceiling {
            if ceiling < u64::from(self.page_size) {
                return Err(CrawlSyncError::Config(
                    "crawl.offset_ceiling must be at least crawl.page_size".into(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: String,
    pub pool_size: u32,
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: "crawlsync.db".into(), pool_size: 4, busy_timeout_ms: 5_000 }
    }
}

impl StoreConfig {
    fn validate(&self) -> Result<()> {
        if self.path.trim().is_empty() {
            return Err(CrawlSyncError::Config("store.path is required".into()));
        }
        if self.pool_size == 0 {
            return Err(CrawlSyncError::Config("store.pool_size must be > 0".into()));
        }
        Ok(())
    }
}
