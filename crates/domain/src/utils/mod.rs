//! Shared helpers for the domain model

pub mod json;

pub use json::{canonical_json, pointer_segments, set_pointer};
