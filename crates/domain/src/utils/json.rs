//! JSON pointer writes and canonical serialization.
//!
//! Request variables are addressed with RFC 6901 pointers (`/searchParams/tags`)
//! so pagination and filter bindings work for any query shape.

use serde_json::{Map, Value};

use crate::errors::{CrawlSyncError, Result};

/// Split a JSON pointer into unescaped segments.
///
/// The empty pointer addresses the root and yields no segments.
pub fn pointer_segments(pointer: &str) -> Result<Vec<String>> {
    if pointer.is_empty() {
        return Ok(Vec::new());
    }
    let Some(rest) = pointer.strip_prefix('/') else {
        return Err(CrawlSyncError::InvalidInput(format!(
            "JSON pointer must start with '/': {pointer}"
        )));
    };
    Ok(rest.split('/').map(|s| s.replace("~1", "/").replace("~0", "~")).collect())
}

/// Write `value` at `pointer` inside `root`, creating intermediate objects.
///
/// Fails when a non-object value sits on the path.
pub fn set_pointer(root: &mut Map<String, Value>, pointer: &str, value: Value) -> Result<()> {
    let segments = pointer_segments(pointer)?;
    let Some((last, parents)) = segments.split_last() else {
        return Err(CrawlSyncError::InvalidInput("cannot overwrite the variables root".into()));
    };

    let mut current = root;
    for segment in parents {
        let slot =
            current.entry(segment.clone()).or_insert_with(|| Value::Object(Map::new()));
        if slot.is_null() {
            *slot = Value::Object(Map::new());
        }
        current = slot.as_object_mut().ok_or_else(|| {
            CrawlSyncError::InvalidInput(format!(
                "cannot write '{pointer}': '{segment}' is not an object"
            ))
        })?;
    }
    current.insert(last.clone(), value);
    Ok(())
}

/// Serialize with object keys sorted at every depth.
///
/// Two values that are equal as JSON produce identical strings, which makes the
/// output suitable for hashing.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                if let Some(v) = map.get(*key) {
                    write_canonical(v, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
