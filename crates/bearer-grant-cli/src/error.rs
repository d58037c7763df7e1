//! CLI error types

use std::fmt;

use bearer_grant::{ConfigError, Stage};
use thiserror::Error;

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Token flow failed
    #[error(transparent)]
    Grant(#[from] bearer_grant::Error),

    /// JSON output error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error (binding the listener, writing output)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        Self::Grant(err.into())
    }
}

impl CliError {
    /// User-facing hints for resolving the error
    pub fn suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::Grant(bearer_grant::Error::KeyLoad(e)) if e.is_not_found() => vec![
                "Check private_key_path / public_key_path",
                "Paths are resolved relative to the working directory",
            ],
            Self::Grant(bearer_grant::Error::KeyLoad(_)) => vec![
                "The private key must be an RSA key in PEM form (PKCS#8 or PKCS#1)",
                "A PEM fingerprint must be the matching RSA public key",
            ],
            Self::Grant(bearer_grant::Error::Config(_)) => vec![
                "Set BEARER_GRANT_APP_ID and the key settings, or pass --config",
                "duration_seconds must be shorter than assertion_lifetime_seconds",
            ],
            Self::Grant(bearer_grant::Error::Exchange(e)) if e.status_code() == 401 => vec![
                "Verify the app id matches the key pair registered with the server",
                "Verify the key fingerprint (kid) the server expects",
            ],
            Self::Grant(bearer_grant::Error::Transport(e)) if e.is_timeout() => vec![
                "Increase timeouts.request_secs",
                "Check network connectivity to the token endpoint",
            ],
            Self::Grant(bearer_grant::Error::Transport(_)) => {
                vec!["Check the token_endpoint URL and network connectivity"]
            }
            _ => vec![],
        }
    }

    /// Error category for display
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Grant(e) => match e.stage() {
                Stage::Config => ErrorCategory::Config,
                Stage::KeyLoad | Stage::Signing => ErrorCategory::Key,
                Stage::Exchange => ErrorCategory::Server,
            },
            Self::Json(_) | Self::Io(_) => ErrorCategory::System,
        }
    }
}

/// Error categories for display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Config,
    Key,
    Server,
    System,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config => write!(f, "Configuration"),
            Self::Key => write!(f, "Key Material"),
            Self::Server => write!(f, "Authorization Server"),
            Self::System => write!(f, "System"),
        }
    }
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;
    use bearer_grant::ExchangeError;

    #[test]
    fn test_config_error_category() {
        let err = CliError::from(ConfigError::Missing("app_id"));
        assert_eq!(err.category(), ErrorCategory::Config);
        assert!(!err.suggestions().is_empty());
    }

    #[test]
    fn test_unauthorized_exchange_has_hints() {
        let err = CliError::from(bearer_grant::Error::from(ExchangeError::status(
            401,
            r#"{"error": "invalid_client"}"#,
        )));
        assert_eq!(err.category(), ErrorCategory::Server);
        assert_eq!(err.suggestions().len(), 2);
        assert!(err.to_string().contains("401"));
    }

    #[test]
    fn test_io_error_is_system() {
        let err = CliError::from(std::io::Error::other("address in use"));
        assert_eq!(err.category(), ErrorCategory::System);
        assert!(err.suggestions().is_empty());
    }
}
