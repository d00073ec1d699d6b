//! Credential caching and refresh

pub mod ports;
pub mod token_manager;

pub use ports::CredentialSource;
pub use token_manager::TokenManager;
