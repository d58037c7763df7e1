//! Token exchange with the authorization server (JWT-bearer grant)
//!
//! Sends a signed assertion to the token endpoint and turns the reply into a
//! [`TokenResponse`] or a typed failure. This is a single-shot exchange: no
//! retry, no backoff, no caching. Retry policy belongs to the caller.
//!
//! ## Wire format
//!
//! ```text
//! POST <endpoint>
//! Content-Type: application/json
//! Authorization: Bearer <assertion>
//!
//! {"duration_seconds": 86399, "grant_type": "urn:ietf:params:oauth:grant-type:jwt-bearer"}
//! ```
//!
//! ## HTTP client configuration
//!
//! - Redirects are not followed (the assertion must only reach the
//!   configured endpoint)
//! - Connect and request timeouts are always set

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::assertion::SignedAssertion;
use crate::error::{Error, ExchangeError, Result, TransportError};

/// Grant type identifier for the JWT-bearer grant (RFC 7523)
pub const JWT_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Default requested access-token lifetime, one second short of the
/// assertion lifetime
pub const DEFAULT_DURATION_SECONDS: u64 = 86_399;

/// Default TCP connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default overall request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Body of the token request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenRequest {
    /// Requested access-token lifetime in seconds
    pub duration_seconds: u64,
    /// Always [`JWT_BEARER_GRANT_TYPE`]
    pub grant_type: &'static str,
}

impl TokenRequest {
    /// JWT-bearer token request for the given lifetime
    pub fn new(duration_seconds: u64) -> Self {
        Self {
            duration_seconds,
            grant_type: JWT_BEARER_GRANT_TYPE,
        }
    }
}

/// Successful token response
///
/// Field names beyond `access_token` are defined by the authorization
/// server; anything not modelled here is kept in `additional`.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The issued access token
    pub access_token: String,

    /// Lifetime information as reported by the server
    pub expires_in: i64,

    /// Token type (usually `Bearer`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    /// Other fields returned by the server
    #[serde(flatten)]
    pub additional: HashMap<String, serde_json::Value>,
}

// Manual Debug impl to keep the access token out of logs
impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .field("additional", &self.additional)
            .finish()
    }
}

/// Client for the token endpoint
///
/// Cheap to clone; clones share one connection pool.
///
/// # Example
///
/// ```rust,no_run
/// # use bearer_grant::assertion::SignedAssertion;
/// use bearer_grant::exchange::{DEFAULT_DURATION_SECONDS, TokenExchangeClient};
/// use url::Url;
///
/// # async fn example(assertion: SignedAssertion) -> Result<(), Box<dyn std::error::Error>> {
/// let client = TokenExchangeClient::new()?;
/// let endpoint = Url::parse("https://api.coze.cn/api/permission/oauth2/token")?;
///
/// let token = client.exchange(&assertion, &endpoint, DEFAULT_DURATION_SECONDS).await?;
/// println!("token expires_in = {}", token.expires_in);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TokenExchangeClient {
    http: reqwest::Client,
}

impl fmt::Debug for TokenExchangeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenExchangeClient")
            .field("http", &"<reqwest::Client>")
            .finish()
    }
}

impl TokenExchangeClient {
    /// Client with the default connect and request timeouts
    ///
    /// # Errors
    ///
    /// Returns the `reqwest` error if the TLS backend cannot be initialised.
    pub fn new() -> std::result::Result<Self, reqwest::Error> {
        Self::with_timeouts(DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Client with explicit timeouts
    ///
    /// # Errors
    ///
    /// Returns the `reqwest` error if the TLS backend cannot be initialised.
    pub fn with_timeouts(
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> std::result::Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()?;

        Ok(Self { http })
    }

    /// Wrap an existing client.
    ///
    /// # Warning
    /// Make sure the client does not follow redirects and has a timeout.
    pub fn from_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Exchange an assertion for an access token.
    ///
    /// The assertion is not re-validated here; build it right before
    /// calling.
    ///
    /// # Errors
    ///
    /// - [`Error::Transport`] when the endpoint cannot be reached or the
    ///   request times out
    /// - [`Error::Exchange`] for a non-2xx status, or a 2xx body that is not
    ///   a token response
    pub async fn exchange(
        &self,
        assertion: &SignedAssertion,
        endpoint: &Url,
        requested_lifetime_seconds: u64,
    ) -> Result<TokenResponse> {
        let request = TokenRequest::new(requested_lifetime_seconds);

        info!(
            endpoint = %endpoint,
            duration_seconds = request.duration_seconds,
            jti = %assertion.claims().jti,
            "Exchanging assertion for access token"
        );

        let response = self
            .http
            .post(endpoint.clone())
            .bearer_auth(assertion.as_str())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!(endpoint = %endpoint, error = %e, "Token request failed");
                TransportError::new(endpoint.as_str(), e)
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::new(endpoint.as_str(), e))?;

        debug!(status = %status, body_len = body.len(), "Token endpoint responded");

        if !status.is_success() {
            let err = ExchangeError::status(status.as_u16(), body);
            warn!(status = %status, error = %err, "Token endpoint rejected the assertion");
            return Err(err.into());
        }

        let token = parse_token_response(status.as_u16(), body)?;
        info!(
            expires_in = token.expires_in,
            token_type = token.token_type.as_deref().unwrap_or("unspecified"),
            "Access token issued"
        );
        Ok(token)
    }

    /// [`exchange`](Self::exchange), aborted when `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if the token is cancelled before the
    /// exchange completes; otherwise as [`exchange`](Self::exchange).
    pub async fn exchange_with_cancellation(
        &self,
        assertion: &SignedAssertion,
        endpoint: &Url,
        requested_lifetime_seconds: u64,
        cancel: &CancellationToken,
    ) -> Result<TokenResponse> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                warn!(endpoint = %endpoint, "Token exchange cancelled");
                Err(Error::Cancelled)
            }
            result = self.exchange(assertion, endpoint, requested_lifetime_seconds) => result,
        }
    }
}

fn parse_token_response(status: u16, body: String) -> std::result::Result<TokenResponse, ExchangeError> {
    let token: TokenResponse = match serde_json::from_str(&body) {
        Ok(token) => token,
        Err(e) => {
            warn!(status, error = %e, "Token endpoint returned an unparseable body");
            return Err(ExchangeError::malformed(status, body, e.to_string()));
        }
    };

    if token.access_token.trim().is_empty() {
        warn!(status, "Token endpoint returned an empty access_token");
        return Err(ExchangeError::malformed(
            status,
            body,
            "access_token is empty",
        ));
    }

    Ok(token)
}
