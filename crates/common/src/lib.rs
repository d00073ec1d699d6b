//! Modular common utilities shared across CrawlSync crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: error classification and pure backoff math
//! - `runtime`: async infrastructure (rate limiting, bulkhead, sleepers)
//! - `observability`: tracing (pulled in by `runtime`)
//! - `test-utils`: deterministic clocks and sleepers for tests

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod error;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod resilience;
#[cfg(feature = "runtime")]
pub mod time;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod testing;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "foundation")]
pub use error::{ErrorClassification, ErrorSeverity};
#[cfg(feature = "runtime")]
pub use resilience::{
    Bulkhead, BulkheadConfig, ExponentialBackoff, ResilienceError, TokenBucket, TokenBucketConfig,
};
#[cfg(feature = "runtime")]
pub use time::{Clock, Sleeper, SystemClock, TokioSleeper};
