//! Error taxonomy for the crawl pipeline
//!
//! Each layer has its own error type. Lower layers are wrapped rather than
//! flattened so callers can still tell a throttled request from a dead token
//! once the error reaches the sync engine.

use std::time::Duration;

use crawlsync_common::{ErrorClassification, ErrorSeverity, ResilienceError};
use crawlsync_domain::{CrawlSyncError, GraphqlError, Realm, SchemaViolation, SyncOutcome};
use thiserror::Error;

/// Credential acquisition failures. Never retried by the token manager.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("no credential source configured for realm '{0}'")]
    NotConfigured(Realm),

    #[error("token refresh failed for realm '{realm}': {message}")]
    RefreshFailed { realm: Realm, message: String },

    #[error("credential rejected for realm '{realm}': {message}")]
    InvalidCredential { realm: Realm, message: String },
}

impl AuthError {
    pub fn refresh_failed(realm: Realm, message: impl Into<String>) -> Self {
        Self::RefreshFailed { realm, message: message.into() }
    }

    pub fn invalid_credential(realm: Realm, message: impl Into<String>) -> Self {
        Self::InvalidCredential { realm, message: message.into() }
    }
}

impl ErrorClassification for AuthError {
    fn is_retryable(&self) -> bool {
        false
    }

    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Error
    }

    fn is_critical(&self) -> bool {
        matches!(self, Self::NotConfigured(_) | Self::InvalidCredential { .. })
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Coarse failure class of a [`TransportError`], used for retry budgets and
/// log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    Unauthorized,
    Throttled,
    Transient,
    MalformedResponse,
    GraphQl,
    Auth,
}

crawlsync_domain::impl_label_conversions!(TransportErrorKind {
    Unauthorized => "unauthorized",
    Throttled => "throttled",
    Transient => "transient",
    MalformedResponse => "malformed_response",
    GraphQl => "graphql_error",
    Auth => "auth_error",
});

/// Outcome of a single GraphQL call that did not produce a page.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    /// The server rejected the credential, after one refresh-and-retry
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("throttled by server{}", fmt_retry_after(.retry_after))]
    Throttled { retry_after: Option<Duration> },

    /// 5xx, timeout or connection failure
    #[error("transient failure: {message}")]
    Transient { message: String },

    #[error("malformed response: {message}")]
    MalformedResponse { message: String },

    #[error("GraphQL errors: {}", join_messages(.errors))]
    GraphQl { errors: Vec<GraphqlError>, retryable: bool },

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl TransportError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized { message: message.into() }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient { message: message.into() }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse { message: message.into() }
    }

    pub const fn kind(&self) -> TransportErrorKind {
        match self {
            Self::Unauthorized { .. } => TransportErrorKind::Unauthorized,
            Self::Throttled { .. } => TransportErrorKind::Throttled,
            Self::Transient { .. } => TransportErrorKind::Transient,
            Self::MalformedResponse { .. } => TransportErrorKind::MalformedResponse,
            Self::GraphQl { .. } => TransportErrorKind::GraphQl,
            Self::Auth(_) => TransportErrorKind::Auth,
        }
    }
}

impl From<SchemaViolation> for TransportError {
    fn from(violation: SchemaViolation) -> Self {
        Self::malformed(violation.to_string())
    }
}

impl ErrorClassification for TransportError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Throttled { .. } | Self::Transient { .. } => true,
            Self::GraphQl { retryable, .. } => *retryable,
            _ => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        if self.is_retryable() {
            ErrorSeverity::Warning
        } else {
            ErrorSeverity::Error
        }
    }

    fn is_critical(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Throttled { retry_after } => *retry_after,
            _ => None,
        }
    }
}

fn fmt_retry_after(retry_after: &Option<Duration>) -> String {
    retry_after.map(|d| format!(" (retry after {d:?})")).unwrap_or_default()
}

fn join_messages(errors: &[GraphqlError]) -> String {
    errors.iter().map(|e| e.message.as_str()).collect::<Vec<_>>().join("; ")
}

/// Failures that stop a crawl.
#[derive(Debug, Clone, Error)]
pub enum CrawlError {
    #[error(transparent)]
    Transport(TransportError),

    #[error(transparent)]
    Auth(AuthError),

    #[error("gave up after {attempts} {kind} failures: {last}")]
    RetriesExhausted { kind: TransportErrorKind, attempts: u32, last: Box<TransportError> },

    #[error("crawl interrupted")]
    Interrupted,

    #[error(transparent)]
    Store(#[from] CrawlSyncError),

    #[error("invalid crawl request: {0}")]
    InvalidRequest(String),

    #[error("offset {offset} would pass the server ceiling and no window rollover is configured")]
    OffsetCeiling { offset: u64 },

    #[error(transparent)]
    Resilience(#[from] ResilienceError),
}

impl From<TransportError> for CrawlError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Auth(auth) => Self::Auth(auth),
            other => Self::Transport(other),
        }
    }
}

impl ErrorClassification for CrawlError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(err) => err.is_retryable(),
            // A later run may succeed once the server recovers
            Self::RetriesExhausted { .. } | Self::Interrupted => true,
            _ => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Interrupted => ErrorSeverity::Info,
            Self::Store(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    fn is_critical(&self) -> bool {
        matches!(self, Self::Store(_))
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Transport(err) => err.retry_after(),
            _ => None,
        }
    }
}

/// A failed sync run, carrying the partial outcome up to the failure.
#[derive(Debug, Clone, Error)]
#[error(
    "sync of '{}' failed after {} committed pages: {source}",
    .outcome.entity_type,
    .outcome.pages_committed
)]
pub struct SyncRunError {
    pub source: CrawlError,
    pub outcome: Box<SyncOutcome>,
}

impl SyncRunError {
    pub fn new(source: CrawlError, outcome: SyncOutcome) -> Self {
        Self { source, outcome: Box::new(outcome) }
    }
}

impl ErrorClassification for SyncRunError {
    fn is_retryable(&self) -> bool {
        self.source.is_retryable()
    }

    fn severity(&self) -> ErrorSeverity {
        self.source.severity()
    }

    fn is_critical(&self) -> bool {
        self.source.is_critical()
    }

    fn retry_after(&self) -> Option<Duration> {
        self.source.retry_after()
    }
}
