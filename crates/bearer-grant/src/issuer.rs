//! End-to-end token issuance
//!
//! [`TokenIssuer`] owns the loaded key material and runs
//! load -> build -> exchange for each request. It keeps no mutable state, so
//! one issuer can serve concurrent callers behind an `Arc`.

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};
use url::Url;

use crate::assertion::{AssertionBuilder, SignedAssertion};
use crate::clock::Clock;
use crate::config::GrantConfig;
use crate::error::{Error, Result};
use crate::exchange::{DEFAULT_DURATION_SECONDS, TokenExchangeClient, TokenResponse};
use crate::keys::{KeyFingerprint, KeyMaterial, SigningKey};

/// Issues access tokens for one application identity
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    identity: String,
    audience: String,
    endpoint: Url,
    duration_seconds: u64,
    signing_key: SigningKey,
    fingerprint: KeyFingerprint,
    builder: AssertionBuilder,
    client: TokenExchangeClient,
}

impl TokenIssuer {
    /// Assemble an issuer from already-loaded parts.
    ///
    /// Uses the system clock, the default assertion lifetime, the default
    /// token duration and default HTTP timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the HTTP client cannot be initialised.
    pub fn new(
        identity: impl Into<String>,
        audience: impl Into<String>,
        endpoint: Url,
        signing_key: SigningKey,
        fingerprint: KeyFingerprint,
    ) -> Result<Self> {
        let client = TokenExchangeClient::new().map_err(http_client_error)?;
        Ok(Self {
            identity: identity.into(),
            audience: audience.into(),
            endpoint,
            duration_seconds: DEFAULT_DURATION_SECONDS,
            signing_key,
            fingerprint,
            builder: AssertionBuilder::new(),
            client,
        })
    }

    /// Validate `config`, load the key material it names, and build an issuer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for invalid settings and
    /// [`Error::KeyLoad`] when key material cannot be loaded.
    pub fn from_config(config: &GrantConfig) -> Result<Self> {
        config.validate()?;

        let (signing_key, fingerprint) =
            KeyMaterial::load(&config.private_key_source()?, &config.fingerprint_source()?)?;

        let client =
            TokenExchangeClient::with_timeouts(config.timeouts.connect(), config.timeouts.request())
                .map_err(http_client_error)?;

        let issuer = Self {
            identity: config.identity()?.to_string(),
            audience: config.audience.clone(),
            endpoint: config.endpoint()?,
            duration_seconds: config.duration_seconds,
            signing_key,
            fingerprint,
            builder: AssertionBuilder::new()
                .with_lifetime_seconds(config.assertion_lifetime_seconds),
            client,
        };

        info!(
            iss = %issuer.identity,
            aud = %issuer.audience,
            endpoint = %issuer.endpoint,
            pem_kid = issuer.fingerprint.is_pem(),
            "Token issuer ready"
        );
        Ok(issuer)
    }

    /// Replace the assertion builder (clock and lifetime)
    pub fn with_builder(mut self, builder: AssertionBuilder) -> Self {
        self.builder = builder;
        self
    }

    /// Replace the time source, keeping the lifetime
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.builder = self.builder.with_clock(clock);
        self
    }

    /// Replace the exchange client
    pub fn with_client(mut self, client: TokenExchangeClient) -> Self {
        self.client = client;
        self
    }

    /// Set the default requested token duration
    pub fn with_duration_seconds(mut self, seconds: u64) -> Self {
        self.duration_seconds = seconds;
        self
    }

    /// Application identity (`iss`)
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Token endpoint
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Default requested token duration
    pub fn duration_seconds(&self) -> u64 {
        self.duration_seconds
    }

    /// Build a signed assertion without exchanging it
    ///
    /// # Errors
    ///
    /// Returns [`Error::Signing`] if signing fails.
    pub fn assertion(&self) -> Result<SignedAssertion> {
        Ok(self.builder.build(
            &self.identity,
            &self.audience,
            &self.signing_key,
            &self.fingerprint,
        )?)
    }

    /// Build an assertion and exchange it for a token of the default duration
    ///
    /// # Errors
    ///
    /// See [`TokenIssuer::issue_with_duration`].
    pub async fn issue(&self) -> Result<TokenResponse> {
        self.issue_with_duration(self.duration_seconds).await
    }

    /// Build an assertion and exchange it for a token of `duration_seconds`
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidDuration`] unless `0 < duration_seconds < assertion lifetime`
    /// - [`Error::Signing`], [`Error::Exchange`], [`Error::Transport`] from the stages
    #[instrument(skip(self), fields(iss = %self.identity))]
    pub async fn issue_with_duration(&self, duration_seconds: u64) -> Result<TokenResponse> {
        self.check_duration(duration_seconds)?;
        let assertion = self.assertion()?;
        self.client
            .exchange(&assertion, &self.endpoint, duration_seconds)
            .await
    }

    /// [`issue`](Self::issue), aborted when `cancel` fires
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] on cancellation; otherwise as
    /// [`issue_with_duration`](Self::issue_with_duration).
    pub async fn issue_with_cancellation(&self, cancel: &CancellationToken) -> Result<TokenResponse> {
        self.check_duration(self.duration_seconds)?;
        let assertion = self.assertion()?;
        self.client
            .exchange_with_cancellation(&assertion, &self.endpoint, self.duration_seconds, cancel)
            .await
    }

    fn check_duration(&self, requested: u64) -> Result<()> {
        let assertion_lifetime = self.builder.lifetime_seconds();
        if requested == 0 || requested >= assertion_lifetime {
            return Err(Error::InvalidDuration {
                requested,
                assertion_lifetime,
            });
        }
        Ok(())
    }
}

fn http_client_error(e: reqwest::Error) -> Error {
    crate::config::ConfigError::Invalid {
        field: "http_client",
        reason: e.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;

    const PRIVATE_KEY: &str = include_str!("../tests/fixtures/private_key.pem");

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(
            "app",
            "api.coze.cn",
            Url::parse("http://127.0.0.1:9/token").unwrap(),
            SigningKey::from_pem(PRIVATE_KEY).unwrap(),
            KeyFingerprint::new("kid").unwrap(),
        )
        .unwrap()
        .with_clock(FixedClock::from_timestamp(1_700_000_000).unwrap())
    }

    #[test]
    fn test_assertion_uses_identity() {
        let assertion = issuer().assertion().unwrap();
        assert_eq!(assertion.claims().iss, "app");
        assert_eq!(assertion.claims().aud, "api.coze.cn");
        assert_eq!(assertion.claims().iat, 1_700_000_000);
    }

    #[tokio::test]
    async fn test_duration_not_shorter_than_assertion_rejected() {
        let err = issuer().issue_with_duration(86_400).await.unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidDuration {
                requested: 86_400,
                assertion_lifetime: 86_400
            }
        ));
    }

    #[tokio::test]
    async fn test_zero_duration_rejected() {
        let err = issuer().issue_with_duration(0).await.unwrap_err();
        assert!(matches!(err, Error::InvalidDuration { .. }));
    }

    #[test]
    fn test_from_config_reports_missing_key_file() {
        let config = GrantConfig {
            app_id: Some("app".to_string()),
            private_key_path: Some("/nonexistent/private_key.pem".into()),
            key_fingerprint: Some("kid".to_string()),
            ..GrantConfig::default()
        };
        match TokenIssuer::from_config(&config) {
            Err(Error::KeyLoad(e)) => assert!(e.is_not_found()),
            other => panic!("expected KeyLoad error, got {other:?}"),
        }
    }

    #[test]
    fn test_from_config_validates_first() {
        let config = GrantConfig::default();
        assert!(matches!(
            TokenIssuer::from_config(&config),
            Err(Error::Config(_))
        ));
    }
}
