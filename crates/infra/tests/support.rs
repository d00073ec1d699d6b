//! Shared harness for `crawlsync-infra` integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crawlsync_core::{AuthError, CredentialSource, ErrorPolicy, TokenManager};
use crawlsync_domain::{
    AuthConfig, Credential, GraphqlRequest, PageSchema, Realm, StoreConfig, TransportConfig,
};
use crawlsync_infra::database::{DbManager, SqliteStore};
use crawlsync_infra::{HttpClient, HttpGraphqlTransport};
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::MockServer;

pub const GRAPHQL_PATH: &str = "/graphql";
pub const DEPRECATED: &str = "DEPRECATED_FIELD";

/// Temporary database that keeps its directory alive for the duration of a
/// test run.
pub struct TestDatabase {
    pub manager: Arc<DbManager>,
    pub store: SqliteStore,
    _temp_dir: TempDir,
}

impl TestDatabase {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir should be created");
        let config = StoreConfig {
            path: temp_dir.path().join("crawlsync.db").display().to_string(),
            pool_size: 2,
            busy_timeout_ms: 1_000,
        };
        let manager = Arc::new(DbManager::from_config(&config).expect("db manager created"));
        let store = SqliteStore::new(Arc::clone(&manager));
        Self { manager, store, _temp_dir: temp_dir }
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

/// Credential source handing out `token-1`, `token-2`, ... on each fetch.
#[derive(Debug, Default)]
pub struct SequenceSource {
    issued: AtomicU64,
}

impl SequenceSource {
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialSource for SequenceSource {
    async fn fetch(&self, realm: Realm) -> Result<Credential, AuthError> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Credential::new(realm, format!("token-{n}"), None))
    }
}

pub fn token_manager(source: &Arc<SequenceSource>) -> Arc<TokenManager> {
    let source: Arc<dyn CredentialSource> = source.clone();
    Arc::new(TokenManager::new(&AuthConfig::default()).with_source(Realm::Primary, source))
}

/// Transport pointed at `server` with `DEPRECATED_FIELD` treated as
/// informational.
pub fn transport(server: &MockServer, tokens: Arc<TokenManager>) -> HttpGraphqlTransport {
    let config = TransportConfig {
        timeout_secs: 5,
        informational_codes: vec![DEPRECATED.into()],
        ..TransportConfig::default()
    };
    let client = HttpClient::new(Duration::from_secs(5)).expect("http client built");
    HttpGraphqlTransport::new(client, tokens, ErrorPolicy::from_config(&config))
        .with_endpoint(Realm::Primary, format!("{}{GRAPHQL_PATH}", server.uri()))
}

pub fn schema() -> PageSchema {
    PageSchema::connection("/search").items("/results").updated_on("/updatedOn").total("/total")
}

pub fn request() -> GraphqlRequest {
    let query = "query Projects($limit: Int!, $offset: Int) { search { total results { id } } }";
    GraphqlRequest::new(Realm::Primary, query, schema())
}

pub fn project(n: u64) -> Value {
    json!({
        "id": format!("p-{n:03}"),
        "name": format!("Project {n}"),
        "updatedOn": format!("2024-03-{:02}T10:00:00Z", (n % 28) + 1),
    })
}

/// `data` envelope holding one page of projects out of `total`.
pub fn page_body(projects: &[Value], total: u64) -> Value {
    json!({ "data": { "search": { "total": total, "results": projects } } })
}
