//! HTTP token service
//!
//! Exposes the token flow to callers that hold a shared service key:
//!
//! - `POST /token` with `{"api_key": "...", "duration_seconds": 3600}`
//!   returns the authorization server's token response.
//! - `GET /health` returns `ok`.
//!
//! The service key is compared as a BLAKE3 digest in constant time, so the
//! comparison does not leak how much of a guessed key was correct.

use std::fmt;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bearer_grant::{Error, TokenIssuer, TokenResponse};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use subtle::ConstantTimeEq;
use tracing::{error, info, warn};

use crate::error::CliResult;

/// Shared state behind the router
#[derive(Clone)]
pub struct TokenService {
    issuer: Arc<TokenIssuer>,
    api_key_digest: [u8; 32],
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("issuer", &self.issuer)
            .field("api_key_digest", &"[REDACTED]")
            .finish()
    }
}

impl TokenService {
    /// Serve tokens from `issuer` to callers presenting `api_key`
    pub fn new(issuer: Arc<TokenIssuer>, api_key: &SecretString) -> Self {
        Self {
            issuer,
            api_key_digest: digest(api_key.expose_secret()),
        }
    }

    fn authorized(&self, presented: &str) -> bool {
        digest(presented).ct_eq(&self.api_key_digest).into()
    }

    /// Build the axum router
    pub fn router(self) -> Router {
        Router::new()
            .route("/token", post(issue_token))
            .route("/health", get(health))
            .with_state(self)
    }

    /// Bind `bind` and serve until Ctrl-C
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the listener cannot be bound or the server fails.
    pub async fn serve(self, bind: &str) -> CliResult<()> {
        let listener = tokio::net::TcpListener::bind(bind).await?;
        info!(addr = %listener.local_addr()?, "Token service listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Token service stopped");
        Ok(())
    }
}

#[inline]
fn digest(key: &str) -> [u8; 32] {
    blake3::hash(key.as_bytes()).into()
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install Ctrl-C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Body of `POST /token`
#[derive(Deserialize)]
pub struct IssueRequest {
    /// Service key; an absent key is treated as a wrong one
    #[serde(default)]
    pub api_key: String,
    /// Requested token lifetime, defaults to the issuer's
    #[serde(default)]
    pub duration_seconds: Option<u64>,
}

impl fmt::Debug for IssueRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssueRequest")
            .field("api_key", &"[REDACTED]")
            .field("duration_seconds", &self.duration_seconds)
            .finish()
    }
}

async fn issue_token(
    State(service): State<TokenService>,
    Json(request): Json<IssueRequest>,
) -> Result<Json<TokenResponse>, ServiceError> {
    if !service.authorized(&request.api_key) {
        warn!("Rejected token request with a wrong service key");
        return Err(ServiceError::Unauthorized);
    }

    let duration = request
        .duration_seconds
        .unwrap_or_else(|| service.issuer.duration_seconds());

    let token = service.issuer.issue_with_duration(duration).await?;
    info!(expires_in = token.expires_in, "Issued access token");
    Ok(Json(token))
}

async fn health() -> &'static str {
    "ok"
}

/// Failure of a `POST /token` call
#[derive(Debug)]
pub enum ServiceError {
    /// Wrong or missing service key
    Unauthorized,
    /// The token flow failed
    Grant(Error),
}

impl From<Error> for ServiceError {
    fn from(err: Error) -> Self {
        Self::Grant(err)
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let err = match self {
            Self::Unauthorized => {
                return (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({
                        "error": "unauthorized",
                        "message": "invalid api_key",
                    })),
                )
                    .into_response();
            }
            Self::Grant(err) => err,
        };

        match &err {
            Error::InvalidDuration { .. } => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "invalid_duration", "message": err.to_string() })),
            )
                .into_response(),
            Error::Exchange(e) => {
                warn!(status = e.status_code(), "Authorization server rejected exchange");
                let mut body = json!({
                    "error": "upstream_rejected",
                    "message": err.to_string(),
                    "upstream_status": e.status_code(),
                });
                if let Some(server) = e.server_error() {
                    body["code"] = json!(server.code);
                    if let Some(message) = &server.message {
                        body["message"] = json!(message);
                    }
                }
                (StatusCode::BAD_GATEWAY, Json(body)).into_response()
            }
            Error::Transport(e) if e.is_timeout() => {
                warn!(endpoint = %e.endpoint(), "Token endpoint timed out");
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    Json(json!({ "error": "upstream_timeout", "message": err.to_string() })),
                )
                    .into_response()
            }
            Error::Transport(e) => {
                warn!(endpoint = %e.endpoint(), "Token endpoint unreachable");
                (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({ "error": "upstream_unreachable", "message": err.to_string() })),
                )
                    .into_response()
            }
            Error::Cancelled => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "cancelled", "message": err.to_string() })),
            )
                .into_response(),
            Error::Signing(_) | Error::KeyLoad(_) | Error::Config(_) => {
                error!(stage = %err.stage(), "Token flow failed: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal", "message": "failed to build assertion" })),
                )
                    .into_response()
            }
        }
    }
}
