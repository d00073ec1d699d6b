//! Pre-issued development tokens

use async_trait::async_trait;
use crawlsync_core::{AuthError, CredentialSource};
use crawlsync_domain::{Credential, Realm};

/// Serves one fixed token that never expires.
///
/// An empty token is reported as an invalid credential on every fetch.
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

#[async_trait]
impl CredentialSource for StaticTokenSource {
    async fn fetch(&self, realm: Realm) -> Result<Credential, AuthError> {
        if self.token.trim().is_empty() {
            return Err(AuthError::invalid_credential(realm, "static token is empty"));
        }
        Ok(Credential::new(realm, self.token.clone(), None))
    }
}

impl std::fmt::Debug for StaticTokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenSource").field("token", &"<redacted>").finish()
    }
}
