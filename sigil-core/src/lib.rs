//! # Sigil Core
//!
//! Trust-policy driven validation and issuance of compact signed and
//! encrypted tokens.
//!
//! A [`TrustPolicy`] says which issuers, audiences and keys are trusted and
//! which optional checks run. A [`TokenHandler`] takes token text and a
//! policy and returns a [`ValidationResult`]: either a [`ClaimsIdentity`]
//! or the precise reason the token was refused. The same handler issues
//! tokens from a claim set and signing (and optionally encrypting)
//! credentials.
//!
//! ## Key Concepts
//!
//! - **Trust policy**: immutable configuration, cheap to clone and share
//!   between threads
//! - **Key resolution**: static keys first, then a retriever callback for
//!   rollover
//! - **Claim validators**: lifetime, issuer, audience, actor and replay, in
//!   that order
//! - **Replay cache**: atomic check-and-record keyed by token digest
//!
//! ## Example
//!
//! ```rust,ignore
//! use sigil::{Claims, SignatureAlgorithm, SigningCredentials, SymmetricKey, TokenHandler, TrustPolicy};
//!
//! let key = SymmetricKey::generate(32)?.with_key_id("2024-06").into_shared();
//! let handler = TokenHandler::new();
//!
//! let token = handler.issue(
//!     &Claims::new()
//!         .with_issuer("https://login.example.com")
//!         .with_audience("api://orders")
//!         .with_expiration(handler.now() + chrono::Duration::minutes(10)),
//!     &SigningCredentials::new(key.clone(), SignatureAlgorithm::HS256),
//!     None,
//! )?;
//!
//! let policy = TrustPolicy::new()
//!     .with_valid_issuer("https://login.example.com")
//!     .with_valid_audience("api://orders")
//!     .with_signing_key(key);
//!
//! let identity = handler.validate(&token, &policy).into_result()?;
//! ```

pub mod algorithm;
pub mod audit;
pub mod claims;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod issuance;
pub mod pipeline;
pub mod policy;
pub mod replay;
pub mod resolver;
pub mod token;
pub mod validators;
pub mod wire;

// Re-exports for convenience
pub use algorithm::{
    ContentEncryptionAlgorithm, KeyManagementAlgorithm, SignatureAlgorithm, UNSIGNED_ALGORITHM,
};
pub use audit::{
    AuditEvent, AuditEventType, AuditLogger, MemoryLogger, NoOpLogger, SharedAuditLogger,
    StdoutLogger,
};
pub use claims::Claims;
pub use clock::{Clock, FixedClock, SharedClock, SystemClock};
pub use config::{ConfigError, SigilConfig};
pub use crypto::{
    Ed25519Key, EncryptingCredentials, SecurityKey, SharedKey, SigningCredentials, SymmetricKey,
};
pub use error::{Error, ErrorKind, Result};
pub use identity::{Claim, ClaimValueType, ClaimsIdentity};
pub use issuance::TokenBuilder;
pub use pipeline::{TokenHandler, TokenHandlerBuilder, ValidationResult};
pub use policy::{Hook, Lifetime, TrustPolicy, UnsignedTokenPolicy};
pub use replay::{InMemoryReplayCache, SharedReplayCache, TokenReplayCache};
pub use token::{Header, JsonWebToken};
pub use wire::DEFAULT_MAX_TOKEN_SIZE;
