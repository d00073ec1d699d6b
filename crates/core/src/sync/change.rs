//! Change detection
//!
//! A record is re-written only when it is newer than the stored copy. With
//! no usable timestamps (missing on either side, or equal) the canonical
//! content hash decides. An older incoming timestamp never overwrites.

use crawlsync_domain::utils::canonical_json;
use crawlsync_domain::Record;
use serde_json::Value;

use super::ports::StoredRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Inserted,
    Updated,
    Unchanged,
}

crawlsync_domain::impl_label_conversions!(Change {
    Inserted => "inserted",
    Updated => "updated",
    Unchanged => "unchanged",
});

/// Hex BLAKE3 digest of the payload's canonical JSON form
pub fn content_hash(payload: &Value) -> String {
    blake3::hash(canonical_json(payload).as_bytes()).to_hex().to_string()
}

pub fn detect_change(
    stored: Option<&StoredRecord>,
    incoming: &Record,
    incoming_hash: &str,
) -> Change {
    let Some(stored) = stored else {
        return Change::Inserted;
    };

    match (stored.updated_on, incoming.updated_on) {
        (Some(old), Some(new)) if new > old => Change::Updated,
        (Some(old), Some(new)) if new < old => Change::Unchanged,
        _ if stored.content_hash != incoming_hash => Change::Updated,
        _ => Change::Unchanged,
    }
}
