//! GraphQL transport adapter

pub mod transport;

pub use transport::HttpGraphqlTransport;
