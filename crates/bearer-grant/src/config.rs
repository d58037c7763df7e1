//! Configuration for the token flow
//!
//! Configuration is layered: an optional file (TOML, YAML or JSON, picked by
//! extension) is read first, then environment variables prefixed with
//! `BEARER_GRANT_` override it. Nested keys use `__`, for example
//! `BEARER_GRANT_TIMEOUTS__REQUEST_SECS=5`.
//!
//! | key | env | default |
//! |---|---|---|
//! | `app_id` | `BEARER_GRANT_APP_ID` | required |
//! | `audience` | `BEARER_GRANT_AUDIENCE` | `api.coze.cn` |
//! | `token_endpoint` | `BEARER_GRANT_TOKEN_ENDPOINT` | Coze CN token endpoint |
//! | `private_key_path` / `private_key` | `BEARER_GRANT_PRIVATE_KEY_PATH` / `BEARER_GRANT_PRIVATE_KEY` | one required |
//! | `public_key_path` / `key_fingerprint` | `BEARER_GRANT_PUBLIC_KEY_PATH` / `BEARER_GRANT_KEY_FINGERPRINT` | one required |
//! | `duration_seconds` | `BEARER_GRANT_DURATION_SECONDS` | 86399 |
//! | `assertion_lifetime_seconds` | `BEARER_GRANT_ASSERTION_LIFETIME_SECONDS` | 86400 |

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

use crate::assertion::ASSERTION_LIFETIME_SECONDS;
use crate::exchange::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_DURATION_SECONDS, DEFAULT_REQUEST_TIMEOUT};
use crate::keys::{FingerprintSource, PrivateKeySource};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "BEARER_GRANT";

/// Default audience (`aud` claim)
pub const DEFAULT_AUDIENCE: &str = "api.coze.cn";

/// Default token endpoint
pub const DEFAULT_TOKEN_ENDPOINT: &str = "https://api.coze.cn/api/permission/oauth2/token";

/// Longest accepted assertion lifetime (one year)
pub const MAX_ASSERTION_LIFETIME_SECONDS: u64 = 365 * 86_400;

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Unsupported file format
    #[error("Unsupported configuration file format. Use .toml, .yaml, .yml, or .json")]
    UnsupportedFormat,

    /// Configuration parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] config::ConfigError),

    /// A required setting is absent
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    /// A setting has an unusable value
    #[error("Invalid value for {field}: {reason}")]
    Invalid {
        /// Setting name
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

/// HTTP timeouts for the token exchange
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// TCP connect timeout in seconds
    pub connect_secs: u64,
    /// Overall request timeout in seconds
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: DEFAULT_CONNECT_TIMEOUT.as_secs(),
            request_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
        }
    }
}

impl TimeoutConfig {
    /// Connect timeout as a `Duration`
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    /// Request timeout as a `Duration`
    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }
}

/// Settings for the HTTP token service
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listen address
    pub bind: String,
    /// Shared key callers must present
    #[serde(deserialize_with = "deserialize_optional_secret")]
    pub api_key: Option<SecretString>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:9000".to_string(),
            api_key: None,
        }
    }
}

/// Configuration of one JWT-bearer client
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GrantConfig {
    /// Application identity (`iss` claim)
    pub app_id: Option<String>,
    /// Authorization server identifier (`aud` claim)
    pub audience: String,
    /// Token endpoint URL
    pub token_endpoint: String,
    /// Path to the PEM private key
    pub private_key_path: Option<PathBuf>,
    /// Inline PEM private key, used when no path is given
    #[serde(deserialize_with = "deserialize_optional_secret")]
    pub private_key: Option<SecretString>,
    /// Path to a file holding the `kid` value (usually the public key PEM)
    pub public_key_path: Option<PathBuf>,
    /// Inline `kid` value, used when no path is given
    pub key_fingerprint: Option<String>,
    /// Requested access-token lifetime in seconds
    pub duration_seconds: u64,
    /// Assertion lifetime in seconds
    pub assertion_lifetime_seconds: u64,
    /// HTTP timeouts
    pub timeouts: TimeoutConfig,
    /// Token service settings
    pub server: ServiceConfig,
}

impl Default for GrantConfig {
    fn default() -> Self {
        Self {
            app_id: None,
            audience: DEFAULT_AUDIENCE.to_string(),
            token_endpoint: DEFAULT_TOKEN_ENDPOINT.to_string(),
            private_key_path: None,
            private_key: None,
            public_key_path: None,
            key_fingerprint: None,
            duration_seconds: DEFAULT_DURATION_SECONDS,
            assertion_lifetime_seconds: ASSERTION_LIFETIME_SECONDS,
            timeouts: TimeoutConfig::default(),
            server: ServiceConfig::default(),
        }
    }
}

impl GrantConfig {
    /// Load configuration from an optional file plus `BEARER_GRANT_*`
    /// environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file is missing or unparseable.
    /// The result is not validated; call [`GrantConfig::validate`].
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env_prefix(path, ENV_PREFIX)
    }

    /// Like [`GrantConfig::load`] with a custom environment prefix
    ///
    /// # Errors
    ///
    /// See [`GrantConfig::load`].
    pub fn load_with_env_prefix(path: Option<&Path>, env_prefix: &str) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.to_path_buf()));
            }
            let format = file_format(path)?;
            builder = builder.add_source(File::new(
                path.to_str().ok_or(ConfigError::UnsupportedFormat)?,
                format,
            ));
        }

        let config = builder
            // Environment variables override file settings
            .add_source(
                Environment::with_prefix(env_prefix)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Check the configuration is complete and consistent
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] or [`ConfigError::Invalid`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.identity()?;
        if self.audience.trim().is_empty() {
            return Err(ConfigError::Missing("audience"));
        }
        self.endpoint()?;
        self.private_key_source()?;
        self.fingerprint_source()?;

        if self.assertion_lifetime_seconds == 0
            || self.assertion_lifetime_seconds > MAX_ASSERTION_LIFETIME_SECONDS
        {
            return Err(ConfigError::Invalid {
                field: "assertion_lifetime_seconds",
                reason: format!("must be between 1 and {MAX_ASSERTION_LIFETIME_SECONDS} seconds"),
            });
        }
        if self.duration_seconds == 0 || self.duration_seconds >= self.assertion_lifetime_seconds {
            return Err(ConfigError::Invalid {
                field: "duration_seconds",
                reason: format!(
                    "must be positive and shorter than the assertion lifetime ({}s)",
                    self.assertion_lifetime_seconds
                ),
            });
        }
        if self.timeouts.connect_secs == 0 || self.timeouts.request_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "timeouts",
                reason: "timeouts must be positive".to_string(),
            });
        }

        Ok(())
    }

    /// Application identity
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when unset or blank.
    pub fn identity(&self) -> Result<&str, ConfigError> {
        self.app_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or(ConfigError::Missing("app_id"))
    }

    /// Parsed token endpoint
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an unparseable or non-HTTP URL.
    pub fn endpoint(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.token_endpoint).map_err(|e| ConfigError::Invalid {
            field: "token_endpoint",
            reason: e.to_string(),
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ConfigError::Invalid {
                field: "token_endpoint",
                reason: format!("unsupported scheme '{other}'"),
            }),
        }
    }

    /// Where to load the private key from; a path wins over an inline key
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when neither is set.
    pub fn private_key_source(&self) -> Result<PrivateKeySource, ConfigError> {
        match (&self.private_key_path, &self.private_key) {
            (Some(path), _) => Ok(PrivateKeySource::File(path.clone())),
            (None, Some(pem)) => Ok(PrivateKeySource::Inline(pem.clone())),
            (None, None) => Err(ConfigError::Missing("private_key_path or private_key")),
        }
    }

    /// Where to load the key fingerprint from; a path wins over an inline value
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when neither is set.
    pub fn fingerprint_source(&self) -> Result<FingerprintSource, ConfigError> {
        match (&self.public_key_path, &self.key_fingerprint) {
            (Some(path), _) => Ok(FingerprintSource::File(path.clone())),
            (None, Some(kid)) => Ok(FingerprintSource::Inline(kid.clone())),
            (None, None) => Err(ConfigError::Missing("public_key_path or key_fingerprint")),
        }
    }
}

// Secrets are wrapped on the way in so they zeroize on drop
fn deserialize_optional_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: Option<String> = serde::Deserialize::deserialize(deserializer)?;
    Ok(s.filter(|s| !s.is_empty()).map(SecretString::new))
}

fn file_format(path: &Path) -> Result<FileFormat, ConfigError> {
    match path.extension().and_then(|s| s.to_str()) {
        Some("toml") => Ok(FileFormat::Toml),
        Some("yaml") | Some("yml") => Ok(FileFormat::Yaml),
        Some("json") => Ok(FileFormat::Json),
        _ => Err(ConfigError::UnsupportedFormat),
    }
}
