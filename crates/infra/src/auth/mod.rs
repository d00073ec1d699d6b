//! Credential sources for the token manager

pub mod client_credentials;
pub mod static_token;

use std::sync::Arc;
use std::time::Duration;

use crawlsync_core::{CredentialSource, TokenManager};
use crawlsync_domain::{Config, CrawlSyncError, Realm, RealmConfig, Result};
use tracing::debug;

pub use client_credentials::ClientCredentialsSource;
pub use static_token::StaticTokenSource;

use crate::http::HttpClient;

/// Build a [`TokenManager`] with a source for every configured realm.
///
/// A realm's `static_token` takes precedence over its client credentials.
pub fn token_manager_from_config(config: &Config) -> Result<TokenManager> {
    let client = HttpClient::new(Duration::from_secs(config.auth.token_timeout_secs.max(1)))?;

    let mut manager = TokenManager::new(&config.auth);
    for realm in Realm::ALL {
        if let Some(realm_config) = config.api.realm(realm) {
            manager = manager.with_source(realm, credential_source(realm, realm_config, &client)?);
        }
    }
    Ok(manager)
}

fn credential_source(
    realm: Realm,
    config: &RealmConfig,
    client: &HttpClient,
) -> Result<Arc<dyn CredentialSource>> {
    if let Some(token) = &config.static_token {
        debug!(realm = %realm, "using static token");
        return Ok(Arc::new(StaticTokenSource::new(token.clone())));
    }
    match ClientCredentialsSource::from_realm_config(client.clone(), config) {
        Some(source) => {
            debug!(realm = %realm, "using client credentials");
            Ok(Arc::new(source))
        }
        None => Err(CrawlSyncError::Config(format!("api.{realm} has no usable credentials"))),
    }
}
