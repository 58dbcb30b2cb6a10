//! Asymmetric key material for signing and verifying tokens.
//!
//! Keys are loaded once at bootstrap. A missing or unparseable key is a
//! [`KeyError`], which callers treat as fatal.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyAlgorithm {
    /// Ed25519.
    #[default]
    EdDsa,
    /// RSASSA-PKCS1-v1_5 with SHA-256.
    Rs256,
}

impl KeyAlgorithm {
    pub fn as_jwt(self) -> Algorithm {
        match self {
            Self::EdDsa => Algorithm::EdDSA,
            Self::Rs256 => Algorithm::RS256,
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::EdDsa => "EdDSA",
            Self::Rs256 => "RS256",
        })
    }
}

impl FromStr for KeyAlgorithm {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EDDSA" | "ED25519" => Ok(Self::EdDsa),
            "RS256" => Ok(Self::Rs256),
            other => Err(KeyError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("failed to read {role} key from {path}: {source}")]
    Io {
        role: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {role} key: {reason}")]
    Parse { role: &'static str, reason: String },

    #[error("unsupported key algorithm '{0}' (expected EdDSA or RS256)")]
    UnsupportedAlgorithm(String),
}

/// Verification key plus an optional signing key.
///
/// Verify-only deployments (e.g. a downstream service that only checks
/// tokens) construct this without a private key; issuing then fails.
#[derive(Clone)]
pub struct SigningKeys {
    algorithm: KeyAlgorithm,
    encoding: Option<EncodingKey>,
    decoding: DecodingKey,
}

impl fmt::Debug for SigningKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeys")
            .field("algorithm", &self.algorithm)
            .field("can_sign", &self.encoding.is_some())
            .finish_non_exhaustive()
    }
}

impl SigningKeys {
    pub fn new(algorithm: KeyAlgorithm, encoding: Option<EncodingKey>, decoding: DecodingKey) -> Self {
        Self {
            algorithm,
            encoding,
            decoding,
        }
    }

    /// Parse a PEM key pair (PKCS#8 private key, SPKI public key).
    pub fn from_pem(algorithm: KeyAlgorithm, private_pem: &[u8], public_pem: &[u8]) -> Result<Self, KeyError> {
        let encoding = parse_private(algorithm, private_pem)?;
        let decoding = parse_public(algorithm, public_pem)?;
        Ok(Self::new(algorithm, Some(encoding), decoding))
    }

    /// Public key only.
    pub fn verifier_from_pem(algorithm: KeyAlgorithm, public_pem: &[u8]) -> Result<Self, KeyError> {
        Ok(Self::new(algorithm, None, parse_public(algorithm, public_pem)?))
    }

    pub fn from_pem_files(
        algorithm: KeyAlgorithm,
        private_path: impl AsRef<Path>,
        public_path: impl AsRef<Path>,
    ) -> Result<Self, KeyError> {
        let private_pem = read_key("private", private_path.as_ref())?;
        let public_pem = read_key("public", public_path.as_ref())?;
        let keys = Self::from_pem(algorithm, &private_pem, &public_pem)?;
        tracing::info!(%algorithm, "signing keys loaded");
        Ok(keys)
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    pub fn can_sign(&self) -> bool {
        self.encoding.is_some()
    }

    pub(crate) fn encoding(&self) -> Option<&EncodingKey> {
        self.encoding.as_ref()
    }

    pub(crate) fn decoding(&self) -> &DecodingKey {
        &self.decoding
    }
}

fn read_key(role: &'static str, path: &Path) -> Result<Vec<u8>, KeyError> {
    std::fs::read(path).map_err(|source| KeyError::Io {
        role,
        path: path.to_path_buf(),
        source,
    })
}

fn parse_private(algorithm: KeyAlgorithm, pem: &[u8]) -> Result<EncodingKey, KeyError> {
    let parsed = match algorithm {
        KeyAlgorithm::EdDsa => EncodingKey::from_ed_pem(pem),
        KeyAlgorithm::Rs256 => EncodingKey::from_rsa_pem(pem),
    };
    parsed.map_err(|e| KeyError::Parse {
        role: "private",
        reason: e.to_string(),
    })
}

fn parse_public(algorithm: KeyAlgorithm, pem: &[u8]) -> Result<DecodingKey, KeyError> {
    let parsed = match algorithm {
        KeyAlgorithm::EdDsa => DecodingKey::from_ed_pem(pem),
        KeyAlgorithm::Rs256 => DecodingKey::from_rsa_pem(pem),
    };
    parsed.map_err(|e| KeyError::Parse {
        role: "public",
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_algorithm_names() {
        assert_eq!("EdDSA".parse::<KeyAlgorithm>().unwrap(), KeyAlgorithm::EdDsa);
        assert_eq!("ed25519".parse::<KeyAlgorithm>().unwrap(), KeyAlgorithm::EdDsa);
        assert_eq!("rs256".parse::<KeyAlgorithm>().unwrap(), KeyAlgorithm::Rs256);
        assert!(matches!(
            "HS256".parse::<KeyAlgorithm>(),
            Err(KeyError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn loads_ed25519_pem_pair() {
        let (private, public) = crate::test_support::ed25519_pem(3);

        let keys = SigningKeys::from_pem(KeyAlgorithm::EdDsa, private.as_bytes(), public.as_bytes()).unwrap();
        assert!(keys.can_sign());

        let verifier = SigningKeys::verifier_from_pem(KeyAlgorithm::EdDsa, public.as_bytes()).unwrap();
        assert!(!verifier.can_sign());
    }

    #[test]
    fn garbage_pem_is_a_parse_error() {
        let err = SigningKeys::from_pem(KeyAlgorithm::EdDsa, b"not a key", b"nor this").unwrap_err();
        assert!(matches!(err, KeyError::Parse { role: "private", .. }));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = SigningKeys::from_pem_files(
            KeyAlgorithm::EdDsa,
            "/nonexistent/gatehouse/private.pem",
            "/nonexistent/gatehouse/public.pem",
        )
        .unwrap_err();
        assert!(matches!(err, KeyError::Io { role: "private", .. }));
    }
}
