//! JWT assertion construction and signing (RFC 7523)
//!
//! An assertion is a short-lived RS256 JWT that authenticates the calling
//! application to the authorization server's token endpoint. Each assertion
//! carries a fresh random `jti`, so two assertions built in the same second
//! never collide.

use std::fmt;
use std::sync::Arc;

use chrono::Duration;
use jsonwebtoken::{Algorithm, Header, encode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::error::SigningError;
use crate::keys::{KeyFingerprint, SigningKey};

/// Default assertion lifetime (24 hours)
pub const ASSERTION_LIFETIME_SECONDS: u64 = 86_400;

/// Claim set of a JWT-bearer assertion.
///
/// Serializes to exactly these five claims, in this order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionClaims {
    /// Issued at (Unix seconds)
    pub iat: i64,
    /// Expiry (Unix seconds), always greater than `iat`
    pub exp: i64,
    /// Unique assertion id (random UUID v4)
    pub jti: String,
    /// Authorization server identifier
    pub aud: String,
    /// Calling application identity
    pub iss: String,
}

impl AssertionClaims {
    /// Seconds between `iat` and `exp`
    pub fn lifetime_seconds(&self) -> i64 {
        self.exp - self.iat
    }
}

/// A compact, signed JWT ready to present to the token endpoint
#[derive(Clone)]
pub struct SignedAssertion {
    token: String,
    claims: AssertionClaims,
}

impl SignedAssertion {
    /// The compact `header.claims.signature` string
    pub fn as_str(&self) -> &str {
        &self.token
    }

    /// Claims the assertion was built from
    pub fn claims(&self) -> &AssertionClaims {
        &self.claims
    }

    /// Consume the assertion, returning the compact token
    pub fn into_string(self) -> String {
        self.token
    }
}

impl fmt::Debug for SignedAssertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedAssertion")
            .field("token", &"[REDACTED]")
            .field("claims", &self.claims)
            .finish()
    }
}

/// Builds and signs assertions.
///
/// Carries no state besides its clock and lifetime policy, so one builder
/// can be shared across tasks.
///
/// # Example
///
/// ```rust,no_run
/// use bearer_grant::assertion::AssertionBuilder;
/// use bearer_grant::keys::{FingerprintSource, KeyMaterial, PrivateKeySource};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (key, fingerprint) = KeyMaterial::load(
///     &PrivateKeySource::File("private_key.pem".into()),
///     &FingerprintSource::File("public_key.pem".into()),
/// )?;
///
/// let assertion = AssertionBuilder::new().build("1150000000001", "api.coze.cn", &key, &fingerprint)?;
/// println!("jti = {}", assertion.claims().jti);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct AssertionBuilder {
    clock: Arc<dyn Clock>,
    lifetime_seconds: u64,
}

impl Default for AssertionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AssertionBuilder {
    /// Builder using the system clock and the default lifetime
    pub fn new() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            lifetime_seconds: ASSERTION_LIFETIME_SECONDS,
        }
    }

    /// Use a different time source
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Set the assertion lifetime in seconds
    pub fn with_lifetime_seconds(mut self, seconds: u64) -> Self {
        self.lifetime_seconds = seconds;
        self
    }

    /// Configured assertion lifetime in seconds
    pub fn lifetime_seconds(&self) -> u64 {
        self.lifetime_seconds
    }

    /// Build and sign one assertion.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::InvalidClaims`] for an empty identity or
    /// audience or an unusable lifetime, and [`SigningError::InvalidKey`]
    /// when the key cannot produce an RS256 signature.
    pub fn build(
        &self,
        identity: &str,
        audience: &str,
        key: &SigningKey,
        fingerprint: &KeyFingerprint,
    ) -> Result<SignedAssertion, SigningError> {
        let claims = self.claims(identity, audience)?;

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(fingerprint.as_str().to_string());

        let token = encode(&header, &claims, key.encoding_key()).map_err(|e| {
            error!(error = %e, "Failed to sign assertion");
            SigningError::InvalidKey(e.to_string())
        })?;

        debug!(
            iss = %claims.iss,
            aud = %claims.aud,
            jti = %claims.jti,
            exp = claims.exp,
            "Built signed assertion"
        );

        Ok(SignedAssertion { token, claims })
    }

    fn claims(&self, identity: &str, audience: &str) -> Result<AssertionClaims, SigningError> {
        if identity.trim().is_empty() {
            return Err(SigningError::InvalidClaims(
                "issuer (application identity) must not be empty".to_string(),
            ));
        }
        if audience.trim().is_empty() {
            return Err(SigningError::InvalidClaims(
                "audience must not be empty".to_string(),
            ));
        }

        let lifetime = i64::try_from(self.lifetime_seconds)
            .ok()
            .filter(|secs| *secs > 0)
            .and_then(Duration::try_seconds)
            .ok_or_else(|| {
                SigningError::InvalidClaims(format!(
                    "assertion lifetime {}s is out of range",
                    self.lifetime_seconds
                ))
            })?;

        let issued_at = self.clock.now();
        let expires_at = issued_at
            .checked_add_signed(lifetime)
            .ok_or_else(|| {
                SigningError::InvalidClaims("assertion expiry overflows the clock".to_string())
            })?;

        Ok(AssertionClaims {
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
            aud: audience.to_string(),
            iss: identity.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use jsonwebtoken::EncodingKey;

    const PRIVATE_KEY: &str = include_str!("../tests/fixtures/private_key.pem");

    fn fixed_builder() -> AssertionBuilder {
        AssertionBuilder::new().with_clock(FixedClock::from_timestamp(1_700_000_000).unwrap())
    }

    fn material() -> (SigningKey, KeyFingerprint) {
        (
            SigningKey::from_pem(PRIVATE_KEY).unwrap(),
            KeyFingerprint::new("kid-1").unwrap(),
        )
    }

    #[test]
    fn test_claims_use_clock_and_lifetime() {
        let (key, kid) = material();
        let assertion = fixed_builder().build("app", "api.coze.cn", &key, &kid).unwrap();

        let claims = assertion.claims();
        assert_eq!(claims.iat, 1_700_000_000);
        assert_eq!(claims.exp, 1_700_086_400);
        assert_eq!(claims.lifetime_seconds(), 86_400);
        assert_eq!(claims.iss, "app");
        assert_eq!(claims.aud, "api.coze.cn");
        assert_eq!(Uuid::parse_str(&claims.jti).unwrap().get_version_num(), 4);
    }

    #[test]
    fn test_compact_token_has_three_segments() {
        let (key, kid) = material();
        let assertion = fixed_builder().build("app", "aud", &key, &kid).unwrap();
        assert_eq!(assertion.as_str().split('.').count(), 3);
    }

    #[test]
    fn test_custom_lifetime() {
        let (key, kid) = material();
        let assertion = fixed_builder()
            .with_lifetime_seconds(600)
            .build("app", "aud", &key, &kid)
            .unwrap();
        assert_eq!(assertion.claims().lifetime_seconds(), 600);
    }

    #[test]
    fn test_zero_lifetime_rejected() {
        let (key, kid) = material();
        let err = fixed_builder()
            .with_lifetime_seconds(0)
            .build("app", "aud", &key, &kid)
            .unwrap_err();
        assert!(matches!(err, SigningError::InvalidClaims(_)));
    }

    #[test]
    fn test_out_of_range_lifetime_rejected() {
        let (key, kid) = material();
        for lifetime in [10_000_000_000_000_000, u64::MAX] {
            let err = fixed_builder()
                .with_lifetime_seconds(lifetime)
                .build("app", "aud", &key, &kid)
                .unwrap_err();
            assert!(matches!(err, SigningError::InvalidClaims(_)), "{lifetime}");
        }
    }

    #[test]
    fn test_expiry_past_calendar_end_rejected() {
        let (key, kid) = material();
        let err = AssertionBuilder::new()
            .with_clock(FixedClock::new(chrono::DateTime::<chrono::Utc>::MAX_UTC))
            .with_lifetime_seconds(60)
            .build("app", "aud", &key, &kid)
            .unwrap_err();
        assert!(matches!(err, SigningError::InvalidClaims(_)));
    }

    #[test]
    fn test_empty_identity_and_audience_rejected() {
        let (key, kid) = material();
        let builder = fixed_builder();
        assert!(matches!(
            builder.build("", "aud", &key, &kid),
            Err(SigningError::InvalidClaims(_))
        ));
        assert!(matches!(
            builder.build("app", "  ", &key, &kid),
            Err(SigningError::InvalidClaims(_))
        ));
    }

    #[test]
    fn test_non_rsa_key_is_signing_error() {
        let key = SigningKey::from_encoding_key(EncodingKey::from_secret(b"shared-secret"));
        let kid = KeyFingerprint::new("kid-1").unwrap();
        let err = fixed_builder().build("app", "aud", &key, &kid).unwrap_err();
        assert!(matches!(err, SigningError::InvalidKey(_)));
    }

    #[test]
    fn test_debug_redacts_token() {
        let (key, kid) = material();
        let assertion = fixed_builder().build("app", "aud", &key, &kid).unwrap();
        let debug = format!("{assertion:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains(assertion.as_str()));
    }

    #[test]
    fn test_claims_serialize_in_fixed_order() {
        let claims = AssertionClaims {
            iat: 1,
            exp: 2,
            jti: "j".to_string(),
            aud: "a".to_string(),
            iss: "i".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&claims).unwrap(),
            r#"{"iat":1,"exp":2,"jti":"j","aud":"a","iss":"i"}"#
        );
    }
}
