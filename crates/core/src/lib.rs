//! # CrawlSync Core
//!
//! Crawl and sync logic with no HTTP or database code.
//!
//! This crate contains:
//! - The token manager, rate governor and paginated crawler
//! - The sync engine with change detection and deletion reconciliation
//! - Port interfaces (traits) for credential sources, GraphQL transports and
//!   the local store
//!
//! ## Architecture Principles
//! - Depends only on `crawlsync-common` and `crawlsync-domain`
//! - All I/O goes through ports implemented in `crawlsync-infra`
//! - Time and sleeping are injected so retry behaviour is testable

pub mod auth;
pub mod crawl;
pub mod errors;
pub mod governor;
pub mod sync;
pub mod transport;

pub use auth::ports::CredentialSource;
pub use auth::TokenManager;
pub use crawl::{FetchedPage, Paginator};
pub use errors::{AuthError, CrawlError, SyncRunError, TransportError, TransportErrorKind};
pub use governor::RateGovernor;
pub use sync::ports::{CheckpointStore, LocalStore, PageTransaction, StoredRecord};
pub use sync::{SyncEngine, SyncRequest};
pub use transport::ports::GraphqlTransport;
pub use transport::{ErrorPolicy, ErrorVerdict};
