//! Stable identity for a crawl
//!
//! Two runs with the same entity type, query text, variables and scope share
//! a fingerprint, and therefore a checkpoint. Variable key order does not
//! matter.

use crawlsync_domain::utils::canonical_json;
use crawlsync_domain::CrawlScope;
use serde_json::{Map, Value};

const FINGERPRINT_BYTES: usize = 16;

pub fn query_fingerprint(
    entity_type: &str,
    query: &str,
    variables: &Map<String, Value>,
    scope: &CrawlScope,
) -> String {
    let variables = canonical_json(&Value::Object(variables.clone()));
    let scope = canonical_json(&serde_json::to_value(scope).unwrap_or_default());

    let mut hasher = blake3::Hasher::new();
    for part in [entity_type, query.trim(), &variables, &scope] {
        hasher.update(part.as_bytes());
        hasher.update(&[0]);
    }
    hex::encode(&hasher.finalize().as_bytes()[..FINGERPRINT_BYTES])
}
