//! GraphQL over HTTP
//!
//! Every call is a `POST` of `{query, variables}` with the realm's bearer
//! credential. A rejected credential (HTTP 401/403 or an auth error in the
//! GraphQL error list) is invalidated and the call repeated once with a
//! fresh token. Each `execute` emits exactly one event at
//! `crawlsync::transport`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use crawlsync_core::{
    AuthError, ErrorPolicy, ErrorVerdict, GraphqlTransport, TokenManager, TransportError,
};
use crawlsync_domain::{Config, CrawlSyncError, GraphqlError, GraphqlRequest, Page, Realm, Result};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::http::{retry_after, HttpClient};

/// Response envelope defined by the GraphQL over HTTP convention
#[derive(Debug, Deserialize)]
struct GraphqlEnvelope {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Option<Vec<GraphqlError>>,
}

/// What one HTTP exchange looked like, for the call event
#[derive(Debug, Default)]
struct ExchangeTrace {
    status: Option<u16>,
    bytes: usize,
}

/// [`GraphqlTransport`] backed by [`HttpClient`].
pub struct HttpGraphqlTransport {
    client: HttpClient,
    tokens: Arc<TokenManager>,
    policy: ErrorPolicy,
    endpoints: HashMap<Realm, String>,
    timeout: Duration,
}

impl HttpGraphqlTransport {
    /// Transport with no endpoints; add them with
    /// [`with_endpoint`](Self::with_endpoint).
    pub fn new(client: HttpClient, tokens: Arc<TokenManager>, policy: ErrorPolicy) -> Self {
        Self {
            client,
            tokens,
            policy,
            endpoints: HashMap::new(),
            timeout: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn with_endpoint(mut self, realm: Realm, endpoint: impl Into<String>) -> Self {
        self.endpoints.insert(realm, endpoint.into());
        self
    }

    /// Default per-call timeout when a request carries none
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Transport for every realm configured in `config`.
    ///
    /// Each call is a single HTTP attempt; retries belong to the rate
    /// governor.
    pub fn from_config(config: &Config, tokens: Arc<TokenManager>) -> Result<Self> {
        let client = HttpClient::new(config.transport.timeout())?;

        let mut transport = Self::new(client, tokens, ErrorPolicy::from_config(&config.transport))
            .with_timeout(config.transport.timeout());
        for realm in Realm::ALL {
            if let Some(realm_config) = config.api.realm(realm) {
                transport = transport.with_endpoint(realm, realm_config.endpoint.clone());
            }
        }
        Ok(transport)
    }

    pub fn endpoint(&self, realm: Realm) -> Option<&str> {
        self.endpoints.get(&realm).map(String::as_str)
    }

    async fn exchange(
        &self,
        request: &GraphqlRequest,
        trace: &mut ExchangeTrace,
    ) -> std::result::Result<Page, TransportError> {
        let endpoint =
            self.endpoints.get(&request.realm).ok_or(AuthError::NotConfigured(request.realm))?;
        let credential = self.tokens.get_token(request.realm).await?;

        let builder = self
            .client
            .post(endpoint)
            .header(AUTHORIZATION, credential.bearer())
            .header(ACCEPT, "application/json")
            .timeout(request.timeout.unwrap_or(self.timeout))
            .json(&request.body());

        let response = self.client.send_once(builder).await.map_err(send_failure)?;
        let status = response.status();
        trace.status = Some(status.as_u16());
        let retry_after = retry_after(response.headers());

        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::transient(format!("failed to read response body: {e}")))?;
        trace.bytes = body.len();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(TransportError::unauthorized(format!("HTTP {status}")));
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(TransportError::Throttled { retry_after });
        }
        if status.is_server_error() {
            return Err(TransportError::transient(format!("HTTP {status}")));
        }

        let envelope: Option<GraphqlEnvelope> = serde_json::from_slice(&body).ok();
        if !status.is_success() {
            return Err(self.rejected(status, envelope));
        }
        let envelope = envelope.ok_or_else(|| {
            let len = body.len();
            TransportError::malformed(format!("body is not a GraphQL response ({len} bytes)"))
        })?;

        let data = envelope.data.filter(|data| !data.is_null());
        let errors = envelope.errors.unwrap_or_default();
        let warnings = match self.policy.classify(&errors, data.is_some()) {
            ErrorVerdict::Clean => Vec::new(),
            ErrorVerdict::Warnings(warnings) => warnings,
            ErrorVerdict::Fail(err) => return Err(err),
        };

        let data = data.ok_or_else(|| TransportError::malformed("response carries no data"))?;
        let mut page = request.schema.decode(&data)?;
        page.warnings = warnings;
        Ok(page)
    }

    /// A 4xx other than auth or throttling; the body may still explain why
    fn rejected(&self, status: StatusCode, envelope: Option<GraphqlEnvelope>) -> TransportError {
        let errors = envelope.and_then(|e| e.errors).unwrap_or_default();
        if errors.is_empty() {
            return TransportError::GraphQl {
                errors: vec![GraphqlError::new(format!("HTTP {status}"))],
                retryable: false,
            };
        }
        match self.policy.classify(&errors, false) {
            ErrorVerdict::Fail(err) => err,
            ErrorVerdict::Clean | ErrorVerdict::Warnings(_) => {
                TransportError::GraphQl { errors, retryable: false }
            }
        }
    }
}

#[async_trait]
impl GraphqlTransport for HttpGraphqlTransport {
    async fn execute(&self, request: &GraphqlRequest) -> std::result::Result<Page, TransportError> {
        let started = Instant::now();
        let mut trace = ExchangeTrace::default();

        let mut result = self.exchange(request, &mut trace).await;
        if let Err(TransportError::Unauthorized { message }) = &result {
            warn!(
                realm = %request.realm,
                reason = %message,
                "credential rejected; refreshing once"
            );
            self.tokens.invalidate(request.realm).await;
            trace = ExchangeTrace::default();
            result = self.exchange(request, &mut trace).await;
        }

        let outcome = match &result {
            Ok(page) if page.warnings.is_empty() => "ok",
            Ok(_) => "ok_with_warnings",
            Err(err) => err.kind().as_str(),
        };
        info!(
            target: "crawlsync::transport",
            realm = %request.realm,
            duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            bytes = trace.bytes,
            outcome,
            status = trace.status,
            "graphql call"
        );
        result
    }
}

impl std::fmt::Debug for HttpGraphqlTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGraphqlTransport")
            .field("endpoints", &self.endpoints)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn send_failure(err: CrawlSyncError) -> TransportError {
    match err {
        CrawlSyncError::Network(message) => TransportError::transient(message),
        other => TransportError::malformed(other.to_string()),
    }
}
