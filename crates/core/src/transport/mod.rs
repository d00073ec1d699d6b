//! GraphQL transport port and response classification

pub mod classify;
pub mod ports;

pub use classify::{ErrorPolicy, ErrorVerdict};
pub use ports::GraphqlTransport;
