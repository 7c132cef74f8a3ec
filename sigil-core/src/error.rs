//! Error types for sigil.
//!
//! Every failure maps onto a stable [`ErrorKind`]. Validation failures are
//! carried inside a [`ValidationResult`](crate::pipeline::ValidationResult);
//! construction and issuance return [`Result`] directly.
//!
//! Messages never include key material, raw token text or replay-cache
//! contents.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type alias for sigil operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Canonical failure kinds.
///
/// Code ranges:
/// - 1000-1099: Structure errors
/// - 1100-1199: Signature errors
/// - 1200-1299: Encryption errors
/// - 1300-1399: Lifetime errors
/// - 1400-1499: Trust (issuer, audience, actor) errors
/// - 1500-1599: Replay errors
/// - 1600-1699: Configuration and argument errors
/// - 1700-1799: Injected capability errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorKind {
    // Structure errors (1000-1099)
    MalformedToken = 1000,

    // Signature errors (1100-1199)
    SignatureValidationFailed = 1100,
    UnsupportedAlgorithm = 1101,
    InvalidSigningKey = 1102,

    // Encryption errors (1200-1299)
    DecryptionFailed = 1200,

    // Lifetime errors (1300-1399)
    TokenExpired = 1300,
    TokenNotYetValid = 1301,
    LifetimeNotValidated = 1302,

    // Trust errors (1400-1499)
    IssuerNotValidated = 1400,
    AudienceNotValidated = 1401,
    ActorValidationFailed = 1402,

    // Replay errors (1500-1599)
    TokenReplayDetected = 1500,

    // Configuration errors (1600-1699)
    InvalidConfiguration = 1600,
    InvalidArgument = 1601,

    // Capability errors (1700-1799)
    KeyRetrievalFailed = 1700,
    ReplayCacheFailed = 1701,
}

impl ErrorKind {
    /// Get the numeric code value.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Get machine-readable name (kebab-case).
    pub fn name(self) -> &'static str {
        match self {
            Self::MalformedToken => "malformed-token",
            Self::SignatureValidationFailed => "signature-validation-failed",
            Self::UnsupportedAlgorithm => "unsupported-algorithm",
            Self::InvalidSigningKey => "invalid-signing-key",
            Self::DecryptionFailed => "decryption-failed",
            Self::TokenExpired => "token-expired",
            Self::TokenNotYetValid => "token-not-yet-valid",
            Self::LifetimeNotValidated => "lifetime-not-validated",
            Self::IssuerNotValidated => "issuer-not-validated",
            Self::AudienceNotValidated => "audience-not-validated",
            Self::ActorValidationFailed => "actor-validation-failed",
            Self::TokenReplayDetected => "token-replay-detected",
            Self::InvalidConfiguration => "invalid-configuration",
            Self::InvalidArgument => "invalid-argument",
            Self::KeyRetrievalFailed => "key-retrieval-failed",
            Self::ReplayCacheFailed => "replay-cache-failed",
        }
    }

    /// Get HTTP status code based on error category.
    pub fn http_status(self) -> u16 {
        match self.code() / 100 {
            10 => 400,      // Structure -> Bad Request
            11..=15 => 401, // Authentication failures -> Unauthorized
            16 => 500,      // Misconfiguration is a server-side fault
            17 => 503,      // Injected capability unavailable
            _ => 500,
        }
    }

    /// Get human-readable description.
    pub fn description(self) -> &'static str {
        match self {
            Self::MalformedToken => "Token structure is malformed",
            Self::SignatureValidationFailed => "Token signature could not be validated",
            Self::UnsupportedAlgorithm => "Algorithm is not supported",
            Self::InvalidSigningKey => "Signing key is not trusted",
            Self::DecryptionFailed => "Token could not be decrypted",
            Self::TokenExpired => "Token has expired",
            Self::TokenNotYetValid => "Token is not yet valid",
            Self::LifetimeNotValidated => "Token lifetime could not be validated",
            Self::IssuerNotValidated => "Token issuer is not trusted",
            Self::AudienceNotValidated => "Token audience is not accepted",
            Self::ActorValidationFailed => "Actor token failed validation",
            Self::TokenReplayDetected => "Token has already been used",
            Self::InvalidConfiguration => "Trust policy configuration is invalid",
            Self::InvalidArgument => "Required argument is missing or invalid",
            Self::KeyRetrievalFailed => "Signing key retrieval failed",
            Self::ReplayCacheFailed => "Replay cache operation failed",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors that can occur in sigil operations.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Structure Errors
    // =========================================================================
    /// Token text could not be parsed.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// Token text exceeds the configured size limit.
    #[error("token size {size} bytes exceeds maximum {max} bytes")]
    TokenTooLarge { size: usize, max: usize },

    // =========================================================================
    // Signature & Cryptographic Errors
    // =========================================================================
    /// Algorithm name is unknown or the key cannot perform it.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// No candidate key verified the signature.
    #[error("signature validation failed: {0}")]
    SignatureInvalid(String),

    /// Token declares `alg: none` and the policy does not accept unsigned tokens.
    #[error("unsigned token rejected")]
    UnsignedTokenRejected,

    /// Key resolution produced no candidate keys.
    #[error("no signing keys available for key id {kid:?}")]
    NoSigningKeys { kid: Option<String> },

    /// Signature verified, but the key is not backed by a trusted certificate.
    #[error("signing key not trusted: {0}")]
    SigningKeyNotTrusted(String),

    /// Key material is unusable (wrong length, corrupt encoding).
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// A cryptographic primitive failed.
    #[error("cryptographic error: {0}")]
    CryptoError(String),

    // =========================================================================
    // Encryption Errors
    // =========================================================================
    /// No candidate key could decrypt the token.
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    // =========================================================================
    // Lifetime Errors
    // =========================================================================
    /// Token expired (`exp` reached).
    #[error("token expired at {expired_at} (now {now})")]
    TokenExpired {
        expired_at: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    /// Token `nbf` is still in the future.
    #[error("token not valid before {not_before} (now {now})")]
    TokenNotYetValid {
        not_before: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    /// Token has no `exp` and the policy requires one.
    #[error("token has no expiration time")]
    MissingExpiration,

    /// `nbf` is after `exp`.
    #[error("invalid lifetime: not before {not_before} is after expiry {expires}")]
    InvalidLifetime {
        not_before: DateTime<Utc>,
        expires: DateTime<Utc>,
    },

    /// A custom lifetime validator rejected the token.
    #[error("lifetime rejected by custom validator")]
    LifetimeRejected,

    // =========================================================================
    // Trust Errors
    // =========================================================================
    /// Issuer is absent or not accepted.
    #[error("issuer not validated ({issuer:?}): {reason}")]
    IssuerNotValidated {
        issuer: Option<String>,
        reason: String,
    },

    /// No token audience is accepted.
    #[error("audience not validated ({audiences:?}): {reason}")]
    AudienceNotValidated {
        audiences: Vec<String>,
        reason: String,
    },

    /// The embedded actor token failed validation.
    #[error("actor validation failed: {0}")]
    ActorValidationFailed(Box<Error>),

    // =========================================================================
    // Replay Errors
    // =========================================================================
    /// Token has been seen before.
    #[error("token replay detected")]
    TokenReplayDetected,

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Policy or handler configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A required argument was absent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // =========================================================================
    // Injected Capability Errors
    // =========================================================================
    /// The signing key retriever failed.
    #[error("key retrieval failed: {0}")]
    KeyRetrieval(String),

    /// The replay cache failed.
    #[error("replay cache failed: {0}")]
    ReplayCache(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::MalformedToken(format!("invalid JSON: {}", e))
    }
}

impl From<base64::DecodeError> for Error {
    fn from(e: base64::DecodeError) -> Self {
        Error::MalformedToken(format!("invalid base64url: {}", e))
    }
}

impl From<ed25519_dalek::SignatureError> for Error {
    fn from(e: ed25519_dalek::SignatureError) -> Self {
        Error::CryptoError(e.to_string())
    }
}

impl Error {
    /// Get the canonical failure kind for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MalformedToken(_) | Error::TokenTooLarge { .. } => ErrorKind::MalformedToken,

            Error::UnsupportedAlgorithm(_) => ErrorKind::UnsupportedAlgorithm,
            Error::SignatureInvalid(_)
            | Error::UnsignedTokenRejected
            | Error::NoSigningKeys { .. } => ErrorKind::SignatureValidationFailed,
            Error::SigningKeyNotTrusted(_) | Error::InvalidKey(_) | Error::CryptoError(_) => {
                ErrorKind::InvalidSigningKey
            }

            Error::DecryptionFailed(_) => ErrorKind::DecryptionFailed,

            Error::TokenExpired { .. } => ErrorKind::TokenExpired,
            Error::TokenNotYetValid { .. } => ErrorKind::TokenNotYetValid,
            Error::MissingExpiration | Error::InvalidLifetime { .. } | Error::LifetimeRejected => {
                ErrorKind::LifetimeNotValidated
            }

            Error::IssuerNotValidated { .. } => ErrorKind::IssuerNotValidated,
            Error::AudienceNotValidated { .. } => ErrorKind::AudienceNotValidated,
            Error::ActorValidationFailed(_) => ErrorKind::ActorValidationFailed,

            Error::TokenReplayDetected => ErrorKind::TokenReplayDetected,

            Error::InvalidConfiguration(_) => ErrorKind::InvalidConfiguration,
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,

            Error::KeyRetrieval(_) => ErrorKind::KeyRetrievalFailed,
            Error::ReplayCache(_) => ErrorKind::ReplayCacheFailed,
        }
    }
}
