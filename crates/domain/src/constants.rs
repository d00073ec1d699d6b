//! Domain-level constants

/// Page schema version understood by [`crate::PageSchema::decode`]
pub const PAGE_SCHEMA_VERSION: u32 = 1;

/// Default number of records requested per page
pub const DEFAULT_PAGE_SIZE: u32 = 500;

/// Offset ceiling of ElasticSearch-backed search endpoints
pub const ELASTICSEARCH_OFFSET_CEILING: u64 = 10_000;

/// Error message fragment the primary API returns when a token has lapsed
pub const UNAUTHENTICATED_MESSAGE: &str = "You must be authenticated";

/// Record id prefix used in `SyncOutcome::errors` for a skipped page
pub const SKIPPED_PAGE_PREFIX: &str = "page@offset=";
