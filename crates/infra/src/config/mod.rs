//! Configuration loading
//!
//! This module loads [`crawlsync_domain::Config`] from environment
//! variables and files.

pub mod loader;

// Re-export commonly used items
pub use loader::{load, load_from_env, load_from_file, find_config_file};
