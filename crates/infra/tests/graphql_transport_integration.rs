//! Integration tests for the GraphQL transport against a WireMock server
//!
//! **Coverage:**
//! - Page decoding and bearer header on the happy path
//! - Credential rejection (HTTP 401 or an auth error message) refreshes
//!   exactly once
//! - Throttling, server errors and malformed bodies map to their kinds
//! - Informational GraphQL errors surface as page warnings

#[path = "support.rs"]
mod support;

use std::sync::Arc;
use std::time::Duration;

use crawlsync_core::{AuthError, GraphqlTransport, TransportError};
use crawlsync_domain::{GraphqlRequest, Realm};
use serde_json::json;
use support::{page_body, project, request, schema, token_manager, transport, SequenceSource};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PATH: &str = support::GRAPHQL_PATH;

// ============================================================================
// Happy path
// ============================================================================

#[tokio::test]
async fn test_execute_decodes_page_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PATH))
        .and(header("authorization", "Bearer token-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(page_body(&[project(1), project(2)], 2)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let source = Arc::new(SequenceSource::default());
    let transport = transport(&server, token_manager(&source));

    let page = transport.execute(&request()).await.expect("page decoded");

    assert_eq!(page.len(), 2);
    assert_eq!(page.total_count, Some(2));
    assert_eq!(page.items[0].id, "p-001");
    assert!(page.warnings.is_empty());
    assert_eq!(source.issued(), 1);
}

#[tokio::test]
async fn test_informational_errors_become_warnings() {
    let server = MockServer::start().await;
    let mut body = page_body(&[project(1)], 1);
    body["errors"] = json!([
        { "message": "field 'name' is deprecated", "extensions": { "code": support::DEPRECATED } }
    ]);
    Mock::given(method("POST"))
        .and(path(PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let source = Arc::new(SequenceSource::default());
    let page = transport(&server, token_manager(&source))
        .execute(&request())
        .await
        .expect("warnings do not fail the call");

    assert_eq!(page.len(), 1);
    assert_eq!(page.warnings.len(), 1);
    assert_eq!(page.warnings[0].code(), Some(support::DEPRECATED));
}

// ============================================================================
// Credential rejection
// ============================================================================

#[tokio::test]
async fn test_http_401_refreshes_credential_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PATH))
        .and(header("authorization", "Bearer token-1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(PATH))
        .and(header("authorization", "Bearer token-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(&[project(1)], 1)))
        .expect(1)
        .mount(&server)
        .await;

    let source = Arc::new(SequenceSource::default());
    let tokens = token_manager(&source);
    let page = transport(&server, Arc::clone(&tokens))
        .execute(&request())
        .await
        .expect("retry with fresh token succeeds");

    assert_eq!(page.len(), 1);
    assert_eq!(source.issued(), 2);
    assert_eq!(tokens.refresh_count(Realm::Primary), 2);
}

#[tokio::test]
async fn test_persistent_rejection_is_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PATH))
        .respond_with(ResponseTemplate::new(403))
        .expect(2)
        .mount(&server)
        .await;

    let source = Arc::new(SequenceSource::default());
    let err = transport(&server, token_manager(&source)).execute(&request()).await.unwrap_err();

    assert!(matches!(err, TransportError::Unauthorized { .. }), "got {err:?}");
    assert_eq!(source.issued(), 2);
}

#[tokio::test]
async fn test_auth_error_message_triggers_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PATH))
        .and(header("authorization", "Bearer token-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": null,
            "errors": [{ "message": "You must be authenticated to access this resource" }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(PATH))
        .and(header("authorization", "Bearer token-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(&[project(7)], 1)))
        .expect(1)
        .mount(&server)
        .await;

    let source = Arc::new(SequenceSource::default());
    let page = transport(&server, token_manager(&source)).execute(&request()).await.unwrap();

    assert_eq!(page.items[0].id, "p-007");
    assert_eq!(source.issued(), 2);
}

#[tokio::test]
async fn test_concurrent_calls_share_one_credential() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PATH))
        .and(header("authorization", "Bearer token-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(&[project(1)], 1)))
        .expect(6)
        .mount(&server)
        .await;

    let source = Arc::new(SequenceSource::default());
    let transport = Arc::new(transport(&server, token_manager(&source)));
    let request = request();

    let calls = (0..6).map(|_| {
        let transport = Arc::clone(&transport);
        let request = request.clone();
        async move { transport.execute(&request).await }
    });
    let results = futures::future::join_all(calls).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(source.issued(), 1);
}

// ============================================================================
// Failure classification
// ============================================================================

#[tokio::test]
async fn test_http_429_carries_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PATH))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "3"))
        .mount(&server)
        .await;

    let source = Arc::new(SequenceSource::default());
    let err = transport(&server, token_manager(&source)).execute(&request()).await.unwrap_err();

    assert_eq!(err, TransportError::Throttled { retry_after: Some(Duration::from_secs(3)) });
}

#[tokio::test]
async fn test_server_error_is_transient_and_not_retried_by_transport() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let source = Arc::new(SequenceSource::default());
    let err = transport(&server, token_manager(&source)).execute(&request()).await.unwrap_err();

    assert!(matches!(err, TransportError::Transient { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_non_json_body_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&server)
        .await;

    let source = Arc::new(SequenceSource::default());
    let err = transport(&server, token_manager(&source)).execute(&request()).await.unwrap_err();

    assert!(matches!(err, TransportError::MalformedResponse { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_missing_schema_field_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "data": { "search": { "results": [] } } })),
        )
        .mount(&server)
        .await;

    let source = Arc::new(SequenceSource::default());
    let err = transport(&server, token_manager(&source)).execute(&request()).await.unwrap_err();

    match err {
        TransportError::MalformedResponse { message } => assert!(message.contains("/total")),
        other => panic!("expected malformed response, got {other:?}"),
    }
}

#[tokio::test]
async fn test_bad_request_with_errors_is_not_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "errors": [{
                "message": "Cannot query field 'nope'",
                "extensions": { "code": "GRAPHQL_VALIDATION_FAILED" }
            }]
        })))
        .mount(&server)
        .await;

    let source = Arc::new(SequenceSource::default());
    let err = transport(&server, token_manager(&source)).execute(&request()).await.unwrap_err();

    match err {
        TransportError::GraphQl { errors, retryable } => {
            assert!(!retryable);
            assert_eq!(errors[0].code(), Some("GRAPHQL_VALIDATION_FAILED"));
        }
        other => panic!("expected GraphQL error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unconfigured_realm_fails_without_a_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let source = Arc::new(SequenceSource::default());
    let request = GraphqlRequest::new(Realm::Orchestration, "query { ping }", schema());
    let err = transport(&server, token_manager(&source)).execute(&request).await.unwrap_err();

    assert_eq!(err, TransportError::Auth(AuthError::NotConfigured(Realm::Orchestration)));
    assert_eq!(source.issued(), 0);
}
