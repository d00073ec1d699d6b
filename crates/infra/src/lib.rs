//! # CrawlSync Infrastructure
//!
//! Infrastructure implementations of core ports.
//!
//! This crate contains:
//! - The GraphQL-over-HTTP transport and the HTTP client under it
//! - Client-credentials and static-token credential sources
//! - The SQLite record and checkpoint store (r2d2 pool)
//! - Configuration loading and tracing initialisation
//!
//! ## Architecture
//! - Implements traits defined in `crawlsync-core`
//! - Depends on `crawlsync-domain`, `crawlsync-common` and `crawlsync-core`
//! - Contains all "impure" code (network and file I/O)

pub mod auth;
pub mod config;
pub mod context;
pub mod database;
pub mod errors;
pub mod graphql;
pub mod http;
pub mod observability;

// Re-export commonly used items
pub use auth::{token_manager_from_config, ClientCredentialsSource, StaticTokenSource};
pub use context::AppContext;
pub use database::{DbManager, SqliteStore};
pub use errors::InfraError;
pub use graphql::HttpGraphqlTransport;
pub use http::{HttpClient, RetryPolicy};
pub use observability::{init_tracing, LogFormat};
