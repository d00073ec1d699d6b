//! OAuth 2.0 client-credentials grant

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use crawlsync_common::{Clock, SystemClock};
use crawlsync_core::{AuthError, CredentialSource};
use crawlsync_domain::{Credential, Realm, RealmConfig};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::http::HttpClient;

/// Token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    token_type: Option<String>,
}

/// Error body defined by RFC 6749 section 5.2
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Machine credentials exchanged for bearer tokens at a token URL.
pub struct ClientCredentialsSource {
    client: HttpClient,
    token_url: String,
    client_id: String,
    client_secret: String,
    audience: Option<String>,
    scope: Option<String>,
    clock: Arc<dyn Clock>,
}

impl ClientCredentialsSource {
    pub fn new(
        client: HttpClient,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            client,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            audience: None,
            scope: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Source for a realm configured with `token_url`, `client_id` and
    /// `client_secret`; `None` when any of them is missing.
    pub fn from_realm_config(client: HttpClient, config: &RealmConfig) -> Option<Self> {
        let source = Self::new(
            client,
            config.token_url.clone()?,
            config.client_id.clone()?,
            config.client_secret.clone()?,
        );
        Some(source.with_audience(config.audience.clone()).with_scope(config.scope.clone()))
    }

    #[must_use]
    pub fn with_audience(mut self, audience: Option<String>) -> Self {
        self.audience = audience;
        self
    }

    #[must_use]
    pub fn with_scope(mut self, scope: Option<String>) -> Self {
        self.scope = scope;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn form(&self) -> Vec<(&'static str, &str)> {
        let mut params = vec![
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        if let Some(audience) = &self.audience {
            params.push(("audience", audience.as_str()));
        }
        if let Some(scope) = &self.scope {
            params.push(("scope", scope.as_str()));
        }
        params
    }

    fn now(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.clock.system_time())
    }
}

#[async_trait]
impl CredentialSource for ClientCredentialsSource {
    async fn fetch(&self, realm: Realm) -> Result<Credential, AuthError> {
        let requested_at = self.now();
        let builder = self.client.post(&self.token_url).form(&self.form());

        let response = self
            .client
            .send_with_retry(builder)
            .await
            .map_err(|err| AuthError::refresh_failed(realm, err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = match response.json::<TokenErrorResponse>().await {
                Ok(body) => match body.error_description {
                    Some(description) => format!("{}: {description}", body.error),
                    None => body.error,
                },
                Err(_) => format!("HTTP {status}"),
            };
            return Err(match status {
                StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    AuthError::invalid_credential(realm, detail)
                }
                _ => AuthError::refresh_failed(realm, detail),
            });
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            AuthError::refresh_failed(realm, format!("unreadable token response: {e}"))
        })?;
        if token.access_token.is_empty() {
            return Err(AuthError::refresh_failed(realm, "token response has no access_token"));
        }
        if let Some(token_type) = token.token_type.as_deref() {
            if !token_type.eq_ignore_ascii_case("bearer") {
                return Err(AuthError::refresh_failed(
                    realm,
                    format!("unsupported token type '{token_type}'"),
                ));
            }
        }

        // Expiry counts from when the request was sent
        let expires_at = token.expires_in.map(|secs| requested_at + Duration::seconds(secs));
        debug!(realm = %realm, expires_in = ?token.expires_in, "client credentials exchanged");
        Ok(Credential::new(realm, token.access_token, expires_at))
    }
}

impl std::fmt::Debug for ClientCredentialsSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentialsSource")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("audience", &self.audience)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}
