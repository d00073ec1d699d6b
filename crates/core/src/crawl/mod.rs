//! Paginated crawling

pub mod paginator;

pub use paginator::{FetchedPage, PageMode, Paginator};
