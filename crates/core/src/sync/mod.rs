//! Incremental sync of crawled records into the local store

pub mod change;
pub mod engine;
pub mod fingerprint;
pub mod ports;
pub mod request;

pub use change::{content_hash, detect_change, Change};
pub use engine::SyncEngine;
pub use fingerprint::query_fingerprint;
pub use ports::{CheckpointStore, LocalStore, PageTransaction, StoredRecord};
pub use request::SyncRequest;
