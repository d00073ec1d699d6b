//! Records and result pages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single entity returned by the catalog.
///
/// Identity is `id`. Sync equality uses `updated_on` first and falls back to a
/// content hash of `payload` when timestamps are absent or equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub updated_on: Option<DateTime<Utc>>,
    pub payload: Value,
}

impl Record {
    pub fn new(id: impl Into<String>, updated_on: Option<DateTime<Utc>>, payload: Value) -> Self {
        Self { id: id.into(), updated_on, payload }
    }
}

/// One response worth of records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub items: Vec<Record>,
    pub next_cursor: Option<String>,
    /// Server-reported size of the whole result set; may drift between calls
    pub total_count: Option<u64>,
    pub server_stats: Option<Map<String, Value>>,
    /// Informational GraphQL errors that accompanied the data
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<GraphqlError>,
}

impl Page {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Source location attached to a GraphQL error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphqlErrorLocation {
    pub line: u32,
    pub column: u32,
}

/// One entry of a GraphQL `errors` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphqlError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<GraphqlErrorLocation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
}

impl GraphqlError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), locations: None, path: None, extensions: None }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.extensions
            .get_or_insert_with(Map::new)
            .insert("code".into(), Value::String(code.into()));
        self
    }

    /// `extensions.code`, the conventional machine-readable error class
    pub fn code(&self) -> Option<&str> {
        self.extensions.as_ref()?.get("code")?.as_str()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn graphql_error_code_reads_extensions() {
        let err: GraphqlError = serde_json::from_value(json!({
            "message": "slow down",
            "extensions": {"code": "THROTTLED"}
        }))
        .unwrap();
        assert_eq!(err.code(), Some("THROTTLED"));
        assert_eq!(GraphqlError::new("plain").code(), None);
        assert_eq!(GraphqlError::new("x").with_code("TIMEOUT").code(), Some("TIMEOUT"));
    }
}
