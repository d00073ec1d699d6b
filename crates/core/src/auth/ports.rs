//! Port interfaces for credential acquisition

use async_trait::async_trait;
use crawlsync_domain::{Credential, Realm};

use crate::errors::AuthError;

/// Produces fresh credentials for a realm (client-credentials grant,
/// static developer token, ...).
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Acquire a new credential. Called only when the cached one is missing,
    /// expiring or invalidated.
    async fn fetch(&self, realm: Realm) -> Result<Credential, AuthError>;
}
