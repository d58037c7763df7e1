//! # bearer-grant - JWT-bearer OAuth2 token client
//!
//! Obtains short-lived access tokens from an OAuth2 authorization server
//! using the JWT-bearer grant (RFC 7523): the application signs an RS256
//! assertion with its private key and exchanges it at the token endpoint.
//!
//! ## Architecture
//!
//! The flow has three stages, each consuming only the previous stage's output:
//!
//! ```text
//! keys (SigningKey, KeyFingerprint)
//!   -> assertion (SignedAssertion)
//!     -> exchange (TokenResponse)
//! ```
//!
//! - [`keys`] - load and validate the PEM private key and the `kid` value
//! - [`assertion`] - build the claim set and sign it
//! - [`exchange`] - POST the assertion to the token endpoint
//! - [`issuer`] - run all three for one configured application
//! - [`config`] - file + environment configuration
//! - [`clock`] - injectable time source
//! - [`error`] - per-stage error types
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bearer_grant::{GrantConfig, TokenIssuer};
//!
//! # async fn example() -> Result<(), bearer_grant::Error> {
//! let config = GrantConfig::load(None)?;
//! let issuer = TokenIssuer::from_config(&config)?;
//!
//! let token = issuer.issue().await?;
//! println!("expires_in = {}", token.expires_in);
//! # Ok(())
//! # }
//! ```
//!
//! ## Standards
//!
//! - **RFC 7519** - JSON Web Token (JWT)
//! - **RFC 7523** - JWT Profile for OAuth 2.0 Authorization Grants

pub mod assertion;
pub mod clock;
pub mod config;
pub mod error;
pub mod exchange;
pub mod issuer;
pub mod keys;

#[doc(inline)]
pub use assertion::{ASSERTION_LIFETIME_SECONDS, AssertionBuilder, AssertionClaims, SignedAssertion};
#[doc(inline)]
pub use clock::{Clock, FixedClock, SystemClock};
#[doc(inline)]
pub use config::{ConfigError, GrantConfig};
#[doc(inline)]
pub use error::{
    Error, ExchangeError, ExchangeErrorKind, KeyKind, KeyLoadError, Result, ServerError,
    SigningError, Stage, TransportError,
};
#[doc(inline)]
pub use exchange::{
    DEFAULT_DURATION_SECONDS, JWT_BEARER_GRANT_TYPE, TokenExchangeClient, TokenRequest,
    TokenResponse,
};
#[doc(inline)]
pub use issuer::TokenIssuer;
#[doc(inline)]
pub use keys::{FingerprintSource, KeyFingerprint, KeyMaterial, PrivateKeySource, SigningKey};

// Re-exported so callers can cancel without depending on tokio-util directly
pub use tokio_util::sync::CancellationToken;
