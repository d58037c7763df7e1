//! Common test utilities for integration tests
//!
//! Provides a mock authorization server and the RSA fixtures shared by the
//! assertion, exchange and issuer tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use bearer_grant::{KeyFingerprint, SigningKey};
use serde_json::{Value, json};
use url::Url;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

pub const PRIVATE_KEY: &str = include_str!("../fixtures/private_key.pem");
pub const PUBLIC_KEY: &str = include_str!("../fixtures/public_key.pem");
pub const OTHER_PUBLIC_KEY: &str = include_str!("../fixtures/other_public_key.pem");

pub const TOKEN_PATH: &str = "/api/permission/oauth2/token";
pub const APP_ID: &str = "1150000000001";
pub const AUDIENCE: &str = "api.coze.cn";

/// Absolute path of a file under `tests/fixtures`
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn signing_key() -> SigningKey {
    SigningKey::from_pem(PRIVATE_KEY).expect("fixture private key parses")
}

/// The public key PEM used verbatim as `kid`
pub fn pem_fingerprint() -> KeyFingerprint {
    KeyFingerprint::new(PUBLIC_KEY).expect("fixture public key parses")
}

/// Mock authorization server with one token endpoint
pub struct MockAuthServer {
    pub server: MockServer,
    pub token_endpoint: Url,
}

impl MockAuthServer {
    /// Start a new mock authorization server
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let token_endpoint = Url::parse(&format!("{}{}", server.uri(), TOKEN_PATH))
            .expect("mock server uri is a valid url");
        Self {
            server,
            token_endpoint,
        }
    }

    /// Mock a successful Coze-style token response
    pub async fn mock_token_success(&self, access_token: &str, expires_in: i64) {
        self.mock_token_json(
            200,
            json!({
                "access_token": access_token,
                "expires_in": expires_in,
                "token_type": "Bearer",
            }),
        )
        .await;
    }

    /// Mock the token endpoint with any status and JSON body
    pub async fn mock_token_json(&self, status: u16, body: Value) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Mock the token endpoint with a raw body
    pub async fn mock_token_raw(&self, status: u16, body: &str) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&self.server)
            .await;
    }

    /// Mock a token endpoint that answers only after `delay`
    pub async fn mock_token_slow(&self, delay: Duration) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "late", "expires_in": 60}))
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }

    /// Number of requests the server has received
    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }
}

/// An endpoint on a port nothing listens on
pub fn unreachable_endpoint() -> Url {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);
    Url::parse(&format!("http://127.0.0.1:{port}{TOKEN_PATH}")).expect("valid url")
}
