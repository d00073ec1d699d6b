//! SQLite persistence

pub mod manager;
pub mod store;

pub use manager::{DbManager, SqliteConnection};
pub use store::SqliteStore;
