//! Resilience patterns for talking to a throttled remote API
//!
//! - **Token Bucket**: bounds the request rate, allowing short bursts
//! - **Bulkhead**: bounds the number of requests in flight
//! - **Exponential Backoff**: pure delay math with multiplicative jitter
//!
//! The retry loop that combines these lives with the rate governor in
//! `crawlsync-core`; this module only supplies the building blocks.

pub mod backoff;
pub mod bulkhead;
pub mod rate_limiter;

use std::time::Duration;

use thiserror::Error;

pub use backoff::ExponentialBackoff;
pub use bulkhead::{Bulkhead, BulkheadConfig};
pub use rate_limiter::{TokenBucket, TokenBucketConfig};

/// Errors raised by the resilience primitives themselves
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResilienceError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("timed out after {timeout:?} waiting for a permit")]
    Timeout { timeout: Duration },

    #[error("bulkhead closed")]
    Closed,
}
