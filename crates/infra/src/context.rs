//! Application context - dependency injection container

use std::sync::Arc;

use crawlsync_core::{RateGovernor, SyncEngine, TokenManager};
use crawlsync_domain::{Config, CrawlSyncError, Result};
use tracing::info;

use crate::auth::token_manager_from_config;
use crate::database::{DbManager, SqliteStore};
use crate::graphql::HttpGraphqlTransport;

/// Everything a sync run needs, wired from one [`Config`].
///
/// The token manager and rate governor are shared by every run started
/// through [`AppContext::engine`].
pub struct AppContext {
    pub config: Config,
    pub db: Arc<DbManager>,
    pub store: Arc<SqliteStore>,
    pub tokens: Arc<TokenManager>,
    pub transport: Arc<HttpGraphqlTransport>,
    pub governor: Arc<RateGovernor>,
}

impl AppContext {
    /// Validate `config`, open the store and build the crawl stack.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let db = Arc::new(DbManager::from_config(&config.store)?);
        let store = Arc::new(SqliteStore::new(Arc::clone(&db)));
        let tokens = Arc::new(token_manager_from_config(&config)?);
        let transport =
            Arc::new(HttpGraphqlTransport::from_config(&config, Arc::clone(&tokens))?);
        let governor = Arc::new(
            RateGovernor::new(&config.governor)
                .map_err(|e| CrawlSyncError::Config(e.to_string()))?,
        );

        info!(
            db_path = %db.path().display(),
            orchestration = config.api.orchestration.is_some(),
            "application context ready"
        );

        Ok(Self { config, db, store, tokens, transport, governor })
    }

    /// Sync engine over the shared transport, governor and store
    pub fn engine(&self) -> SyncEngine {
        SyncEngine::new(
            self.transport.clone(),
            Arc::clone(&self.governor),
            self.store.clone(),
            self.store.clone(),
        )
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("db", &self.db)
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}
