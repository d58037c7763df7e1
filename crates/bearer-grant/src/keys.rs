//! Key material loading
//!
//! Loads the RSA private signing key and the key fingerprint that goes into
//! the JWT `kid` header. Both are read eagerly and checked for well-formed
//! PEM structure before any assertion is built.
//!
//! # Fingerprint convention
//!
//! The fingerprint is an opaque string. Some authorization servers (Coze
//! among them) match on the full public-key PEM text rather than a computed
//! thumbprint, so a PEM fingerprint is validated as an RSA public key but
//! carried byte-for-byte, trailing newline included.

use std::fmt;
use std::path::{Path, PathBuf};

use jsonwebtoken::{DecodingKey, EncodingKey};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use crate::error::{KeyKind, KeyLoadError};

const PEM_MARKER: &str = "-----BEGIN";

/// Where to read the private signing key from
#[derive(Clone)]
pub enum PrivateKeySource {
    /// PEM file on disk
    File(PathBuf),
    /// PEM text supplied directly (e.g. from an environment variable)
    Inline(SecretString),
}

impl fmt::Debug for PrivateKeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::Inline(_) => f.debug_tuple("Inline").field(&"[REDACTED]").finish(),
        }
    }
}

/// Where to read the key fingerprint from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FingerprintSource {
    /// File whose entire contents are the fingerprint
    File(PathBuf),
    /// Fingerprint supplied directly
    Inline(String),
}

/// RSA private key used for RS256 signatures
///
/// Immutable once loaded. `Debug` never prints key material.
#[derive(Clone)]
pub struct SigningKey {
    key: EncodingKey,
}

impl SigningKey {
    /// Parse an RSA private key from PEM (PKCS#8 or PKCS#1)
    ///
    /// # Errors
    ///
    /// Returns [`KeyLoadError::Empty`] for blank input and
    /// [`KeyLoadError::Malformed`] when the PEM does not parse as an RSA key.
    pub fn from_pem(pem: &str) -> Result<Self, KeyLoadError> {
        let pem = pem.trim();
        if pem.is_empty() {
            return Err(KeyLoadError::Empty {
                kind: KeyKind::PrivateKey,
            });
        }

        let key = EncodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| {
            KeyLoadError::Malformed {
                kind: KeyKind::PrivateKey,
                reason: e.to_string(),
            }
        })?;

        Ok(Self { key })
    }

    #[cfg(test)]
    pub(crate) fn from_encoding_key(key: EncodingKey) -> Self {
        Self { key }
    }

    pub(crate) fn encoding_key(&self) -> &EncodingKey {
        &self.key
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Opaque key identifier carried in the JWT `kid` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFingerprint(String);

impl KeyFingerprint {
    /// Validate and wrap a fingerprint value.
    ///
    /// PEM input must parse as an RSA public key. Anything else is accepted
    /// as an opaque identifier as long as it is not blank. The value is
    /// never trimmed.
    ///
    /// # Errors
    ///
    /// Returns [`KeyLoadError::Empty`] for blank input and
    /// [`KeyLoadError::Malformed`] for PEM that is not an RSA public key.
    pub fn new(value: impl Into<String>) -> Result<Self, KeyLoadError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(KeyLoadError::Empty {
                kind: KeyKind::Fingerprint,
            });
        }

        if value.trim_start().starts_with(PEM_MARKER) {
            DecodingKey::from_rsa_pem(value.trim().as_bytes()).map_err(|e| {
                KeyLoadError::Malformed {
                    kind: KeyKind::Fingerprint,
                    reason: e.to_string(),
                }
            })?;
        }

        Ok(Self(value))
    }

    /// The fingerprint exactly as it goes into the header
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the fingerprint is a PEM public key rather than an opaque id
    pub fn is_pem(&self) -> bool {
        self.0.trim_start().starts_with(PEM_MARKER)
    }
}

impl fmt::Display for KeyFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Loader for the signing key and its fingerprint
#[derive(Debug)]
pub struct KeyMaterial;

impl KeyMaterial {
    /// Load and validate both halves of the key material.
    ///
    /// # Errors
    ///
    /// Returns [`KeyLoadError`] distinguishing a missing source
    /// ([`KeyLoadError::is_not_found`]) from malformed material
    /// ([`KeyLoadError::is_malformed`]).
    pub fn load(
        private_key: &PrivateKeySource,
        fingerprint: &FingerprintSource,
    ) -> Result<(SigningKey, KeyFingerprint), KeyLoadError> {
        let signing_key = Self::load_signing_key(private_key)?;
        let fingerprint = Self::load_fingerprint(fingerprint)?;
        Ok((signing_key, fingerprint))
    }

    /// Load only the private signing key
    ///
    /// # Errors
    ///
    /// See [`KeyMaterial::load`].
    pub fn load_signing_key(source: &PrivateKeySource) -> Result<SigningKey, KeyLoadError> {
        match source {
            PrivateKeySource::File(path) => {
                debug!(path = %path.display(), "Loading private key from file");
                let pem = read_source(path, KeyKind::PrivateKey)?;
                SigningKey::from_pem(&pem).inspect_err(|e| {
                    warn!(path = %path.display(), error = %e, "Private key rejected");
                })
            }
            PrivateKeySource::Inline(pem) => {
                debug!("Loading private key from inline value");
                SigningKey::from_pem(pem.expose_secret())
            }
        }
    }

    /// Load only the key fingerprint
    ///
    /// # Errors
    ///
    /// See [`KeyMaterial::load`].
    pub fn load_fingerprint(source: &FingerprintSource) -> Result<KeyFingerprint, KeyLoadError> {
        match source {
            FingerprintSource::File(path) => {
                debug!(path = %path.display(), "Loading key fingerprint from file");
                let value = read_source(path, KeyKind::Fingerprint)?;
                KeyFingerprint::new(value)
            }
            FingerprintSource::Inline(value) => KeyFingerprint::new(value.clone()),
        }
    }
}

fn read_source(path: &Path, kind: KeyKind) -> Result<String, KeyLoadError> {
    std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            KeyLoadError::NotFound {
                kind,
                path: path.to_path_buf(),
            }
        } else {
            KeyLoadError::Io {
                kind,
                path: path.to_path_buf(),
                source,
            }
        }
    })
}
