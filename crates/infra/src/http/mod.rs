//! HTTP client shared by the GraphQL transport and credential sources

pub mod client;

pub(crate) use client::retry_after;
pub use client::{HttpClient, RetryPolicy};
