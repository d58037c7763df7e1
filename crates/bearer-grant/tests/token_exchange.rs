//! Token exchange against a mock authorization server

mod common;

use std::time::Duration;

use bearer_grant::{
    AssertionBuilder, CancellationToken, Error, ExchangeErrorKind, SignedAssertion,
    TokenExchangeClient,
};
use common::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::{
    Mock, ResponseTemplate,
    matchers::{body_json, header, method, path},
};

fn assertion() -> SignedAssertion {
    AssertionBuilder::new()
        .build(APP_ID, AUDIENCE, &signing_key(), &pem_fingerprint())
        .unwrap()
}

#[tokio::test]
async fn test_exchange_sends_documented_request() {
    let server = MockAuthServer::start().await;
    let assertion = assertion();

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(header("content-type", "application/json"))
        .and(header(
            "authorization",
            format!("Bearer {}", assertion.as_str()).as_str(),
        ))
        .and(body_json(json!({
            "duration_seconds": 86399,
            "grant_type": "urn:ietf:params:oauth:grant-type:jwt-bearer",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "czs_matched",
            "expires_in": 1_721_135_859,
            "token_type": "Bearer",
        })))
        .expect(1)
        .mount(&server.server)
        .await;

    let token = TokenExchangeClient::new()
        .unwrap()
        .exchange(&assertion, &server.token_endpoint, 86_399)
        .await
        .unwrap();

    assert_eq!(token.access_token, "czs_matched");
    assert_eq!(token.expires_in, 1_721_135_859);
    assert_eq!(token.token_type.as_deref(), Some("Bearer"));
}

#[tokio::test]
async fn test_minimal_success_body() {
    let server = MockAuthServer::start().await;
    server
        .mock_token_json(200, json!({"access_token": "abc", "expires_in": 3600}))
        .await;

    let token = TokenExchangeClient::new()
        .unwrap()
        .exchange(&assertion(), &server.token_endpoint, 86_399)
        .await
        .unwrap();

    assert_eq!(token.access_token, "abc");
    assert_eq!(token.expires_in, 3600);
    assert!(token.token_type.is_none());
}

#[tokio::test]
async fn test_exchange_passes_requested_duration() {
    let server = MockAuthServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_json(json!({
            "duration_seconds": 900,
            "grant_type": "urn:ietf:params:oauth:grant-type:jwt-bearer",
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "short", "expires_in": 900})),
        )
        .expect(1)
        .mount(&server.server)
        .await;

    let token = TokenExchangeClient::new()
        .unwrap()
        .exchange(&assertion(), &server.token_endpoint, 900)
        .await
        .unwrap();
    assert_eq!(token.access_token, "short");
}

#[tokio::test]
async fn test_rejection_keeps_status_and_body() {
    let server = MockAuthServer::start().await;
    server
        .mock_token_json(401, json!({"error": "invalid_client"}))
        .await;

    let err = TokenExchangeClient::new()
        .unwrap()
        .exchange(&assertion(), &server.token_endpoint, 86_399)
        .await
        .unwrap_err();

    let exchange = match err {
        Error::Exchange(exchange) => exchange,
        other => panic!("expected exchange error, got {other:?}"),
    };
    assert_eq!(exchange.kind(), ExchangeErrorKind::Status);
    assert_eq!(exchange.status_code(), 401);
    assert_eq!(exchange.body(), r#"{"error":"invalid_client"}"#);
    assert_eq!(exchange.server_error().unwrap().code, "invalid_client");
}

#[tokio::test]
async fn test_coze_error_shape_is_understood() {
    let server = MockAuthServer::start().await;
    server
        .mock_token_json(
            400,
            json!({
                "error_code": "invalid_request",
                "error_message": "duration_seconds out of range",
            }),
        )
        .await;

    let err = TokenExchangeClient::new()
        .unwrap()
        .exchange(&assertion(), &server.token_endpoint, 86_399)
        .await
        .unwrap_err();

    let exchange = match err {
        Error::Exchange(exchange) => exchange,
        other => panic!("expected exchange error, got {other:?}"),
    };
    let server_error = exchange.server_error().unwrap();
    assert_eq!(server_error.code, "invalid_request");
    assert_eq!(
        server_error.message.as_deref(),
        Some("duration_seconds out of range")
    );
}

#[tokio::test]
async fn test_malformed_success_body() {
    let server = MockAuthServer::start().await;
    server.mock_token_raw(200, "<html>gateway</html>").await;

    let err = TokenExchangeClient::new()
        .unwrap()
        .exchange(&assertion(), &server.token_endpoint, 86_399)
        .await
        .unwrap_err();

    match err {
        Error::Exchange(exchange) => {
            assert_eq!(exchange.kind(), ExchangeErrorKind::MalformedResponse);
            assert_eq!(exchange.status_code(), 200);
            assert_eq!(exchange.body(), "<html>gateway</html>");
            assert!(exchange.reason().is_some());
        }
        other => panic!("expected exchange error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_slow_endpoint_times_out() {
    let server = MockAuthServer::start().await;
    server.mock_token_slow(Duration::from_secs(5)).await;

    let client =
        TokenExchangeClient::with_timeouts(Duration::from_secs(1), Duration::from_millis(200))
            .unwrap();
    let err = client
        .exchange(&assertion(), &server.token_endpoint, 86_399)
        .await
        .unwrap_err();

    match err {
        Error::Transport(transport) => {
            assert!(transport.is_timeout());
            assert_eq!(transport.endpoint(), server.token_endpoint.as_str());
        }
        other => panic!("expected transport error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transport_error() {
    let endpoint = unreachable_endpoint();

    let err = TokenExchangeClient::new()
        .unwrap()
        .exchange(&assertion(), &endpoint, 86_399)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Transport(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_cancellation_aborts_exchange() {
    let server = MockAuthServer::start().await;
    server.mock_token_slow(Duration::from_secs(5)).await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = TokenExchangeClient::new()
        .unwrap()
        .exchange_with_cancellation(&assertion(), &server.token_endpoint, 86_399, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
}

#[tokio::test]
async fn test_already_cancelled_sends_nothing() {
    let server = MockAuthServer::start().await;
    server.mock_token_success("unused", 3600).await;

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = TokenExchangeClient::new()
        .unwrap()
        .exchange_with_cancellation(&assertion(), &server.token_endpoint, 86_399, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(server.request_count().await, 0);
}
