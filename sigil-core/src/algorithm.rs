//! JOSE algorithm identifiers.
//!
//! Only algorithms the crate can perform are representable. Any other name
//! (`RS256`, `ES256`, ...) parses to [`Error::UnsupportedAlgorithm`].

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Header value of an unsigned token.
pub const UNSIGNED_ALGORITHM: &str = "none";

/// Signature algorithms (`alg` of a signed token).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureAlgorithm {
    HS256,
    HS384,
    HS512,
    EdDSA,
}

impl SignatureAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HS256 => "HS256",
            Self::HS384 => "HS384",
            Self::HS512 => "HS512",
            Self::EdDSA => "EdDSA",
        }
    }

    /// True for the HMAC family.
    pub fn is_symmetric(self) -> bool {
        matches!(self, Self::HS256 | Self::HS384 | Self::HS512)
    }

    /// Minimum HMAC key length in bytes (the hash output size).
    pub fn min_key_len(self) -> usize {
        match self {
            Self::HS256 => 32,
            Self::HS384 => 48,
            Self::HS512 => 64,
            Self::EdDSA => 32,
        }
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "HS256" => Ok(Self::HS256),
            "HS384" => Ok(Self::HS384),
            "HS512" => Ok(Self::HS512),
            "EdDSA" => Ok(Self::EdDSA),
            other => Err(Error::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key management algorithms (`alg` of an encrypted token).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyManagementAlgorithm {
    /// The shared key is the content encryption key.
    Dir,
    A128GcmKw,
    A256GcmKw,
}

impl KeyManagementAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dir => "dir",
            Self::A128GcmKw => "A128GCMKW",
            Self::A256GcmKw => "A256GCMKW",
        }
    }

    /// Length of the key-encryption key, `None` for `dir`.
    pub fn wrapping_key_len(self) -> Option<usize> {
        match self {
            Self::Dir => None,
            Self::A128GcmKw => Some(16),
            Self::A256GcmKw => Some(32),
        }
    }
}

impl FromStr for KeyManagementAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dir" => Ok(Self::Dir),
            "A128GCMKW" => Ok(Self::A128GcmKw),
            "A256GCMKW" => Ok(Self::A256GcmKw),
            other => Err(Error::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for KeyManagementAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content encryption algorithms (`enc` of an encrypted token).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentEncryptionAlgorithm {
    A128Gcm,
    A256Gcm,
}

impl ContentEncryptionAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::A128Gcm => "A128GCM",
            Self::A256Gcm => "A256GCM",
        }
    }

    /// Content encryption key length in bytes.
    pub fn key_len(self) -> usize {
        match self {
            Self::A128Gcm => 16,
            Self::A256Gcm => 32,
        }
    }
}

impl FromStr for ContentEncryptionAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "A128GCM" => Ok(Self::A128Gcm),
            "A256GCM" => Ok(Self::A256Gcm),
            other => Err(Error::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for ContentEncryptionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
