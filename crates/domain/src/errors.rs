//! Error types used throughout the workspace

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for CrawlSync
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum CrawlSyncError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for CrawlSyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias for CrawlSync operations
pub type Result<T> = std::result::Result<T, CrawlSyncError>;

/// A GraphQL payload that does not match the declared page schema.
///
/// Decoding fails closed: missing or mistyped fields are reported here rather
/// than surfacing as nulls further down the pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("schema violation at '{path}': {reason}")]
pub struct SchemaViolation {
    /// JSON pointer (relative to `data`) where decoding failed
    pub path: String,
    /// What was expected there
    pub reason: String,
}

impl SchemaViolation {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { path: path.into(), reason: reason.into() }
    }
}
