//! Subresource-integrity style digests (`sha256-<base64>`).
//!
//! Manifests identify each asset by the digest of its payload. The string form
//! is the algorithm name, a dash, and the standard (padded) base64 encoding of
//! the raw digest bytes.

use std::fmt;
use std::str::FromStr;

use base64::prelude::{Engine as _, BASE64_STANDARD};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384, Sha512};
use strum::{AsRefStr, EnumString};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("[ST110] integrity value is empty")]
    Empty,
    #[error("[ST111] integrity value '{0}' is missing the '<algorithm>-' prefix")]
    MissingAlgorithm(String),
    #[error("[ST112] unsupported digest algorithm '{0}'")]
    UnsupportedAlgorithm(String),
    #[error("[ST113] digest for '{value}' is not valid base64: {reason}")]
    InvalidEncoding { value: String, reason: String },
    #[error("[ST114] {algorithm} digest must be {expected} bytes, found {found}")]
    InvalidLength {
        algorithm: DigestAlgorithm,
        expected: usize,
        found: usize,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, AsRefStr, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum DigestAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    #[must_use]
    pub fn digest_len(self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    #[must_use]
    pub fn digest(self, bytes: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha256 => Sha256::digest(bytes).to_vec(),
            Self::Sha384 => Sha384::digest(bytes).to_vec(),
            Self::Sha512 => Sha512::digest(bytes).to_vec(),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// A parsed content digest.
///
/// Two integrities are equal only when both the algorithm and the digest bytes
/// match; the same payload hashed with different algorithms compares unequal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Integrity {
    algorithm: DigestAlgorithm,
    digest: Vec<u8>,
}

impl Integrity {
    /// Hash `bytes` with `algorithm`.
    #[must_use]
    pub fn compute(algorithm: DigestAlgorithm, bytes: &[u8]) -> Self {
        Self {
            algorithm,
            digest: algorithm.digest(bytes),
        }
    }

    #[must_use]
    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    #[must_use]
    pub fn digest(&self) -> &[u8] {
        &self.digest
    }

    /// Returns `true` when `bytes` hash to this digest.
    #[must_use]
    pub fn matches(&self, bytes: &[u8]) -> bool {
        self.algorithm.digest(bytes) == self.digest
    }

    /// Hash `bytes` with this integrity's algorithm and return the result on
    /// mismatch, so callers can report what was actually received.
    pub fn verify(&self, bytes: &[u8]) -> Result<(), Integrity> {
        let actual = Self::compute(self.algorithm, bytes);
        if actual == *self {
            Ok(())
        } else {
            Err(actual)
        }
    }
}

impl FromStr for Integrity {
    type Err = IntegrityError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.is_empty() {
            return Err(IntegrityError::Empty);
        }
        // Rendering must reproduce the published string exactly.
        if value.trim() != value {
            return Err(IntegrityError::InvalidEncoding {
                value: value.to_string(),
                reason: "surrounding whitespace".to_string(),
            });
        }
        let Some((algorithm, encoded)) = value.split_once('-') else {
            return Err(IntegrityError::MissingAlgorithm(value.to_string()));
        };
        let algorithm = DigestAlgorithm::from_str(algorithm)
            .map_err(|_| IntegrityError::UnsupportedAlgorithm(algorithm.to_string()))?;
        let digest =
            BASE64_STANDARD
                .decode(encoded)
                .map_err(|err| IntegrityError::InvalidEncoding {
                    value: value.to_string(),
                    reason: err.to_string(),
                })?;
        if digest.len() != algorithm.digest_len() {
            return Err(IntegrityError::InvalidLength {
                algorithm,
                expected: algorithm.digest_len(),
                found: digest.len(),
            });
        }
        Ok(Self { algorithm, digest })
    }
}

impl TryFrom<String> for Integrity {
    type Error = IntegrityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Integrity> for String {
    fn from(value: Integrity) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Integrity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            self.algorithm,
            BASE64_STANDARD.encode(&self.digest)
        )
    }
}
