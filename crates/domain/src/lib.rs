//! # CrawlSync Domain
//!
//! Data model for the crawl and sync engine.
//!
//! This crate contains:
//! - Records, pages, checkpoints and run outcomes
//! - The page schema used to decode GraphQL connection payloads
//! - Configuration structures
//! - The crate-wide error type and `Result` alias
//!
//! ## Architecture
//! - No dependencies on other CrawlSync crates
//! - Only external dependencies allowed
//! - Pure data structures and decoding rules

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;
pub mod utils;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
