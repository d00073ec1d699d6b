//! Error classification shared across crates
//!
//! Component errors (auth, transport, crawl) live next to their components and
//! implement [`ErrorClassification`] so the retry layer and the engine can
//! treat them uniformly. [`ErrorSeverity`] is the level they are logged at.
//!
//! ```rust
//! use std::time::Duration;
//!
//! use crawlsync_common::error::{ErrorClassification, ErrorSeverity};
//!
//! struct Throttled(u64);
//!
//! impl ErrorClassification for Throttled {
//!     fn is_retryable(&self) -> bool {
//!         true
//!     }
//!     fn severity(&self) -> ErrorSeverity {
//!         ErrorSeverity::Warning
//!     }
//!     fn is_critical(&self) -> bool {
//!         false
//!     }
//!     fn retry_after(&self) -> Option<Duration> {
//!         Some(Duration::from_secs(self.0))
//!     }
//! }
//!
//! let err = Throttled(2);
//! assert!(err.is_retryable());
//! assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
//! ```

use std::fmt;
use std::time::Duration;

/// Trait for classifying errors by their characteristics
pub trait ErrorClassification {
    /// Check if this error is retryable
    ///
    /// Retryable errors are transient issues that may succeed if attempted
    /// again: network timeouts, throttling, temporary unavailability.
    fn is_retryable(&self) -> bool;

    /// Get the error severity level
    fn severity(&self) -> ErrorSeverity;

    /// Check if this is a critical error requiring immediate attention
    fn is_critical(&self) -> bool;

    /// Get the suggested retry delay if applicable
    ///
    /// Returns `Some(Duration)` when the server asked for a specific delay
    /// (for example through a `Retry-After` header).
    fn retry_after(&self) -> Option<Duration>;
}

/// Error severity levels for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational, typically for debugging
    Info,
    /// Warning, should be monitored but not critical
    Warning,
    /// Error, requires attention and action
    Error,
    /// Critical, immediate action required
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}
