//! Versioned decode of GraphQL connection payloads into [`Page`]s.
//!
//! Every location is a JSON pointer. `connection` is resolved against the
//! response `data`, `items`/`cursor`/`total`/`stats` against the connection
//! object, and `id`/`updated_on` against each item (after `item` unwrapping).
//!
//! Decoding fails closed: a configured field that is missing from the payload
//! is a [`SchemaViolation`], while an explicit `null` decodes to `None`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::page::{Page, Record};
use crate::constants::PAGE_SCHEMA_VERSION;
use crate::errors::SchemaViolation;

/// Variable locations the crawler writes when requesting the next page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationVariables {
    pub limit: String,
    pub offset: Option<String>,
    /// When unset, server cursors are written to `offset` verbatim
    pub cursor: Option<String>,
}

impl Default for PaginationVariables {
    fn default() -> Self {
        Self { limit: "/limit".into(), offset: Some("/offset".into()), cursor: None }
    }
}

/// Date-window rollover for back-ends that cap deep offsets.
///
/// Results must be sorted descending on `field`. When the offset ceiling is
/// reached, `variable` is set to one millisecond before the last record's
/// `field` value and the offset restarts at zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowRollover {
    /// Pointer into the request variables, e.g. `/searchParams/createdOn/to`
    pub variable: String,
    /// Pointer into each record payload, e.g. `/createdOn`
    pub field: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSchema {
    #[serde(default = "default_version")]
    pub version: u32,
    pub connection: String,
    pub items: String,
    #[serde(default)]
    pub item: Option<String>,
    pub id: String,
    #[serde(default)]
    pub updated_on: Option<String>,
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub total: Option<String>,
    #[serde(default)]
    pub stats: Option<String>,
    #[serde(default)]
    pub pagination: PaginationVariables,
    #[serde(default)]
    pub window: Option<WindowRollover>,
}

const fn default_version() -> u32 {
    PAGE_SCHEMA_VERSION
}

impl PageSchema {
    /// Schema rooted at `connection` with `/items` and `/id` defaults
    pub fn connection(connection: impl Into<String>) -> Self {
        Self {
            version: PAGE_SCHEMA_VERSION,
            connection: connection.into(),
            items: "/items".into(),
            item: None,
            id: "/id".into(),
            updated_on: None,
            cursor: None,
            total: None,
            stats: None,
            pagination: PaginationVariables::default(),
            window: None,
        }
    }

    pub fn items(mut self, pointer: impl Into<String>) -> Self {
        self.items = pointer.into();
        self
    }

    pub fn item(mut self, pointer: impl Into<String>) -> Self {
        self.item = Some(pointer.into());
        self
    }

    pub fn id(mut self, pointer: impl Into<String>) -> Self {
        self.id = pointer.into();
        self
    }

    pub fn updated_on(mut self, pointer: impl Into<String>) -> Self {
        self.updated_on = Some(pointer.into());
        self
    }

    pub fn cursor(mut self, pointer: impl Into<String>) -> Self {
        self.cursor = Some(pointer.into());
        self
    }

    pub fn total(mut self, pointer: impl Into<String>) -> Self {
        self.total = Some(pointer.into());
        self
    }

    pub fn stats(mut self, pointer: impl Into<String>) -> Self {
        self.stats = Some(pointer.into());
        self
    }

    pub fn pagination(mut self, pagination: PaginationVariables) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn window(mut self, window: WindowRollover) -> Self {
        self.window = Some(window);
        self
    }

    /// Decode the `data` member of a GraphQL response.
    pub fn decode(&self, data: &Value) -> Result<Page, SchemaViolation> {
        if self.version != PAGE_SCHEMA_VERSION {
            return Err(SchemaViolation::new(
                "",
                format!(
                    "unsupported page schema version {} (expected {PAGE_SCHEMA_VERSION})",
                    self.version
                ),
            ));
        }

        let connection = data
            .pointer(&self.connection)
            .and_then(Value::as_object)
            .ok_or_else(|| SchemaViolation::new(&self.connection, "expected an object"))?;
        let conn_path = |p: &str| format!("{}{}", self.connection, p);

        let raw_items = connection_field(connection, &self.items)
            .and_then(Value::as_array)
            .ok_or_else(|| SchemaViolation::new(conn_path(&self.items), "expected an array"))?;

        let mut items = Vec::with_capacity(raw_items.len());
        for (index, raw) in raw_items.iter().enumerate() {
            let at = format!("{}/{index}", conn_path(&self.items));
            items.push(self.decode_record(raw, &at)?);
        }

        let next_cursor = match self.cursor.as_deref() {
            None => None,
            Some(p) => match required(connection, p, &conn_path(p))? {
                Value::Null => None,
                Value::String(s) if s.is_empty() => None,
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => return Err(SchemaViolation::new(conn_path(p), "expected a cursor string")),
            },
        };

        let total_count = match self.total.as_deref() {
            None => None,
            Some(p) => match required(connection, p, &conn_path(p))? {
                Value::Null => None,
                v => Some(v.as_u64().ok_or_else(|| {
                    SchemaViolation::new(conn_path(p), "expected a non-negative integer")
                })?),
            },
        };

        let server_stats = match self.stats.as_deref() {
            None => None,
            Some(p) => match required(connection, p, &conn_path(p))? {
                Value::Null => None,
                Value::Object(map) => Some(map.clone()),
                _ => return Err(SchemaViolation::new(conn_path(p), "expected an object")),
            },
        };

        Ok(Page { items, next_cursor, total_count, server_stats, warnings: Vec::new() })
    }

    fn decode_record(&self, raw: &Value, at: &str) -> Result<Record, SchemaViolation> {
        let payload = match self.item.as_deref() {
            Some(p) => raw
                .pointer(p)
                .ok_or_else(|| SchemaViolation::new(format!("{at}{p}"), "missing item"))?,
            None => raw,
        };
        let item_path = format!("{at}{}", self.item.as_deref().unwrap_or_default());
        let object = payload
            .as_object()
            .ok_or_else(|| SchemaViolation::new(&item_path, "expected an object"))?;

        let id = match required(object, &self.id, &format!("{item_path}{}", self.id))? {
            Value::String(s) if !s.is_empty() => s.clone(),
            Value::Number(n) if n.is_u64() || n.is_i64() => n.to_string(),
            _ => {
                return Err(SchemaViolation::new(
                    format!("{item_path}{}", self.id),
                    "expected a non-empty string or integer id",
                ))
            }
        };

        let updated_on = match self.updated_on.as_deref() {
            None => None,
            Some(p) => {
                let field_path = format!("{item_path}{p}");
                match required(object, p, &field_path)? {
                    Value::Null => None,
                    Value::String(s) => Some(parse_timestamp(s).ok_or_else(|| {
                        let reason = format!("invalid RFC 3339 timestamp '{s}'");
                        SchemaViolation::new(&field_path, reason)
                    })?),
                    _ => return Err(SchemaViolation::new(field_path, "expected a timestamp")),
                }
            }
        };

        Ok(Record { id, updated_on, payload: payload.clone() })
    }
}

fn connection_field<'a>(object: &'a Map<String, Value>, pointer: &str) -> Option<&'a Value> {
    let (head, rest) = split_head(pointer)?;
    let first = object.get(&head)?;
    if rest.is_empty() {
        Some(first)
    } else {
        first.pointer(rest)
    }
}

fn required<'a>(
    object: &'a Map<String, Value>,
    pointer: &str,
    full_path: &str,
) -> Result<&'a Value, SchemaViolation> {
    connection_field(object, pointer)
        .ok_or_else(|| SchemaViolation::new(full_path, "missing field"))
}

fn split_head(pointer: &str) -> Option<(String, &str)> {
    let rest = pointer.strip_prefix('/')?;
    let (head, tail) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, ""),
    };
    Some((head.replace("~1", "/").replace("~0", "~"), tail))
}

/// Parse an RFC 3339 timestamp into UTC
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.with_timezone(&Utc))
}
