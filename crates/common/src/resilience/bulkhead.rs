//! Bulkhead pattern for limiting concurrent operations
//!
//! Limits the number of operations in flight at once. Callers beyond the
//! limit wait for a permit, optionally bounded by an acquire timeout.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use super::ResilienceError;

/// Configuration for bulkhead behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkheadConfig {
    /// Maximum number of concurrent operations allowed
    pub max_concurrent: usize,
    /// Optional timeout for acquiring a permit
    pub acquire_timeout: Option<Duration>,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self { max_concurrent: 4, acquire_timeout: None }
    }
}

impl BulkheadConfig {
    pub fn new(max_concurrent: usize) -> Self {
        Self { max_concurrent, ..Self::default() }
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent == 0 {
            return Err("max_concurrent must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Semaphore-backed concurrency ceiling.
///
/// Cloned bulkheads share permits.
///
/// # Examples
///
/// ```rust
/// use crawlsync_common::resilience::{Bulkhead, BulkheadConfig};
///
/// # tokio_test::block_on(async {
/// let bulkhead = Bulkhead::new(BulkheadConfig::new(2)).unwrap();
/// let value = bulkhead.execute(|| async { 42 }).await.unwrap();
/// assert_eq!(value, 42);
/// # });
/// ```
#[derive(Clone)]
pub struct Bulkhead {
    config: BulkheadConfig,
    semaphore: Arc<Semaphore>,
    total_operations: Arc<AtomicU64>,
    timeout_count: Arc<AtomicU64>,
}

impl Bulkhead {
    /// Create a new bulkhead with the given configuration
    pub fn new(config: BulkheadConfig) -> Result<Self, ResilienceError> {
        config.validate().map_err(ResilienceError::Config)?;
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(config.max_concurrent)),
            total_operations: Arc::new(AtomicU64::new(0)),
            timeout_count: Arc::new(AtomicU64::new(0)),
            config,
        })
    }

    /// Wait for a permit; it is released when dropped
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, ResilienceError> {
        let acquire = Arc::clone(&self.semaphore).acquire_owned();
        let permit = match self.config.acquire_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, acquire).await {
                Ok(result) => result.map_err(|_| ResilienceError::Closed)?,
                Err(_) => {
                    self.timeout_count.fetch_add(1, Ordering::Relaxed);
                    return Err(ResilienceError::Timeout { timeout });
                }
            },
            None => acquire.await.map_err(|_| ResilienceError::Closed)?,
        };
        self.total_operations.fetch_add(1, Ordering::Relaxed);
        debug!(in_flight = self.current_concurrent(), "bulkhead permit acquired");
        Ok(permit)
    }

    /// Run `operation` while holding a permit
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T, ResilienceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _permit = self.acquire().await?;
        Ok(operation().await)
    }

    /// Get the current number of concurrent operations
    pub fn current_concurrent(&self) -> usize {
        self.config.max_concurrent.saturating_sub(self.semaphore.available_permits())
    }

    pub fn total_operations(&self) -> u64 {
        self.total_operations.load(Ordering::Acquire)
    }

    pub fn timeout_count(&self) -> u64 {
        self.timeout_count.load(Ordering::Acquire)
    }

    pub fn max_concurrent(&self) -> usize {
        self.config.max_concurrent
    }
}

impl fmt::Debug for Bulkhead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bulkhead")
            .field("max_concurrent", &self.config.max_concurrent)
            .field("current_concurrent", &self.current_concurrent())
            .finish()
    }
}
