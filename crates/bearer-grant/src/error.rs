//! Error types for the JWT-bearer token flow
//!
//! Every stage of the flow has its own error type so that callers can tell
//! which stage failed and decide whether to retry, re-provision keys, or
//! abort. [`Error`] wraps them for the orchestrated flow.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// Result type for the token flow
pub type Result<T> = std::result::Result<T, Error>;

/// Which kind of key material a [`KeyLoadError`] refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// RSA private signing key
    PrivateKey,
    /// Key fingerprint (`kid` header value)
    Fingerprint,
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrivateKey => write!(f, "private key"),
            Self::Fingerprint => write!(f, "key fingerprint"),
        }
    }
}

/// Failure to load key material. Fatal: there is no fallback key.
#[derive(Debug, Error)]
pub enum KeyLoadError {
    /// The configured file does not exist
    #[error("{kind} source not found: {}", .path.display())]
    NotFound {
        /// Which key was being loaded
        kind: KeyKind,
        /// Path that was looked up
        path: PathBuf,
    },

    /// The file exists but could not be read
    #[error("failed to read {kind} from {}: {source}", .path.display())]
    Io {
        /// Which key was being loaded
        kind: KeyKind,
        /// Path that was read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The source resolved to nothing but whitespace
    #[error("{kind} source is empty")]
    Empty {
        /// Which key was being loaded
        kind: KeyKind,
    },

    /// The PEM structure does not parse, or it is not an RSA key
    #[error("malformed {kind}: {reason}")]
    Malformed {
        /// Which key was being loaded
        kind: KeyKind,
        /// Parser message
        reason: String,
    },
}

impl KeyLoadError {
    /// True when the source could not be found
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True when the source was found but the key material is invalid
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed { .. } | Self::Empty { .. })
    }

    /// Which key the error refers to
    pub fn kind(&self) -> KeyKind {
        match self {
            Self::NotFound { kind, .. }
            | Self::Io { kind, .. }
            | Self::Empty { kind }
            | Self::Malformed { kind, .. } => *kind,
        }
    }
}

/// Failure to produce a signed assertion. Fatal, never retried.
#[derive(Debug, Error)]
pub enum SigningError {
    /// The key cannot produce an RS256 signature
    #[error("signing key is unusable for RS256: {0}")]
    InvalidKey(String),

    /// A claim value was rejected before signing
    #[error("invalid assertion claims: {0}")]
    InvalidClaims(String),
}

/// Why an exchange response was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeErrorKind {
    /// The server answered with a non-2xx status
    Status,
    /// The server answered 2xx but the body is not a token response
    MalformedResponse,
}

impl ExchangeErrorKind {
    fn qualifier(self) -> &'static str {
        match self {
            Self::Status => "",
            Self::MalformedResponse => " with an unusable body",
        }
    }
}

/// Error details reported by the authorization server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    /// Machine-readable code (`error`, `error_code` or `code`)
    pub code: String,
    /// Human-readable message, if the server sent one
    pub message: Option<String>,
}

impl ServerError {
    /// Extract a server error from a response body.
    ///
    /// Understands the OAuth2 shape (`error`/`error_description`), the Coze
    /// shape (`error_code`/`error_message`) and `code`/`msg`. Returns `None`
    /// when the body is not JSON or carries no code.
    pub fn from_body(body: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(body).ok()?;
        let object = value.as_object()?;

        let code = ["error", "error_code", "code"]
            .iter()
            .filter_map(|key| object.get(*key))
            .find_map(scalar_to_string)?;

        let message = ["error_description", "error_message", "msg", "message"]
            .iter()
            .filter_map(|key| object.get(*key))
            .find_map(scalar_to_string);

        Some(Self { code, message })
    }
}

fn scalar_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.code, message),
            None => write!(f, "{}", self.code),
        }
    }
}

/// The authorization server rejected the exchange or sent an unusable body.
///
/// Carries the HTTP status and the raw body so no diagnostic information is
/// lost. Retryable at the caller's discretion.
#[derive(Debug, Clone, Error)]
#[error(
    "token endpoint returned {status}{}: {}",
    .kind.qualifier(),
    exchange_detail(.server_error, .reason, .body)
)]
pub struct ExchangeError {
    kind: ExchangeErrorKind,
    status: u16,
    body: String,
    reason: Option<String>,
    server_error: Option<ServerError>,
}

impl ExchangeError {
    /// Non-2xx response
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        Self {
            kind: ExchangeErrorKind::Status,
            status,
            server_error: ServerError::from_body(&body),
            body,
            reason: None,
        }
    }

    /// 2xx response whose body is not a usable token response
    pub fn malformed(status: u16, body: impl Into<String>, reason: impl Into<String>) -> Self {
        let body = body.into();
        Self {
            kind: ExchangeErrorKind::MalformedResponse,
            status,
            server_error: ServerError::from_body(&body),
            body,
            reason: Some(reason.into()),
        }
    }

    /// Why the response was rejected
    pub fn kind(&self) -> ExchangeErrorKind {
        self.kind
    }

    /// HTTP status code returned by the server
    pub fn status_code(&self) -> u16 {
        self.status
    }

    /// Raw response body
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Parse failure reason, for malformed 2xx responses
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Structured error reported by the server, if the body had one
    pub fn server_error(&self) -> Option<&ServerError> {
        self.server_error.as_ref()
    }
}

fn exchange_detail(
    server_error: &Option<ServerError>,
    reason: &Option<String>,
    body: &str,
) -> String {
    match (server_error, reason) {
        (Some(server), _) => server.to_string(),
        (None, Some(reason)) => reason.clone(),
        (None, None) => body.to_string(),
    }
}

/// Network failure or timeout talking to the token endpoint.
///
/// Retryable by the caller with backoff.
#[derive(Debug, Error)]
#[error("request to {endpoint} failed: {source}")]
pub struct TransportError {
    endpoint: String,
    #[source]
    source: reqwest::Error,
}

impl TransportError {
    pub(crate) fn new(endpoint: impl Into<String>, source: reqwest::Error) -> Self {
        Self {
            endpoint: endpoint.into(),
            source,
        }
    }

    /// Endpoint that was being called
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// True when the request hit the connect or request timeout
    pub fn is_timeout(&self) -> bool {
        self.source.is_timeout()
    }

    /// True when the connection could not be established
    pub fn is_connect(&self) -> bool {
        self.source.is_connect()
    }
}

/// Stage of the flow an [`Error`] came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Loading or validating configuration
    Config,
    /// Loading key material
    KeyLoad,
    /// Building and signing the assertion
    Signing,
    /// Exchanging the assertion for a token
    Exchange,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config => write!(f, "config"),
            Self::KeyLoad => write!(f, "key-load"),
            Self::Signing => write!(f, "signing"),
            Self::Exchange => write!(f, "exchange"),
        }
    }
}

/// Error from the orchestrated token flow
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration is missing or invalid
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Key material could not be loaded
    #[error(transparent)]
    KeyLoad(#[from] KeyLoadError),

    /// The assertion could not be signed
    #[error(transparent)]
    Signing(#[from] SigningError),

    /// The server rejected the exchange
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    /// The server could not be reached
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Requested token lifetime is outside the allowed range
    #[error(
        "requested token duration {requested}s must be positive and shorter than the assertion lifetime {assertion_lifetime}s"
    )]
    InvalidDuration {
        /// Requested access-token lifetime
        requested: u64,
        /// Lifetime of the authorizing assertion
        assertion_lifetime: u64,
    },

    /// The exchange was cancelled before it completed
    #[error("token exchange cancelled")]
    Cancelled,
}

impl Error {
    /// Stage of the flow that failed
    pub fn stage(&self) -> Stage {
        match self {
            Self::Config(_) | Self::InvalidDuration { .. } => Stage::Config,
            Self::KeyLoad(_) => Stage::KeyLoad,
            Self::Signing(_) => Stage::Signing,
            Self::Exchange(_) | Self::Transport(_) | Self::Cancelled => Stage::Exchange,
        }
    }

    /// True when retrying the same call might succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Exchange(_) | Self::Transport(_))
    }
}
