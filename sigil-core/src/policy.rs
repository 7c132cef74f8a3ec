//! Trust policy: which issuers, audiences and keys are accepted, and which
//! optional checks run.
//!
//! A [`TrustPolicy`] is an immutable value. Builder methods consume `self`
//! and return a new policy; nothing in the pipeline mutates one, and no
//! field is computed lazily. Derived sets ([`TrustPolicy::accepted_issuers`],
//! [`TrustPolicy::accepted_audiences`]) are recomputed on every call.
//!
//! ## Cloning
//!
//! `Clone` is shallow: keys, collections and delegates are shared through
//! `Arc`, scalar fields are copied. Builder methods on a clone replace whole
//! fields, so a branched policy never affects the one it was cloned from.
//!
//! ## Example
//!
//! ```rust,ignore
//! let policy = TrustPolicy::new()
//!     .with_valid_issuer("https://login.example.com")
//!     .with_valid_audiences(["api://orders", "api://billing"])
//!     .with_signing_key(SymmetricKey::new(secret)?.with_key_id("2024-06").into_shared())
//!     .with_token_replay_cache(Arc::new(InMemoryReplayCache::new()));
//! ```

use crate::crypto::SharedKey;
use crate::error::{Error, Result};
use crate::replay::SharedReplayCache;
use crate::token::JsonWebToken;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Default claim type holding the identity name.
pub const DEFAULT_NAME_CLAIM_TYPE: &str = "name";

/// Default claim type holding roles.
pub const DEFAULT_ROLE_CLAIM_TYPE: &str = "role";

/// Largest accepted clock skew, in seconds (one day).
pub const MAX_CLOCK_SKEW_SECS: i64 = 24 * 60 * 60;

/// Dynamic key source, called with the token's key hint.
pub type SigningKeyRetriever = dyn Fn(Option<&str>) -> Result<Vec<SharedKey>> + Send + Sync;

/// Replacement issuer check. Receives the token issuer (if any).
pub type IssuerValidator = dyn Fn(Option<&str>, &JsonWebToken) -> bool + Send + Sync;

/// Replacement audience check. Receives every audience the token carries.
pub type AudienceValidator = dyn Fn(&[String], &JsonWebToken) -> bool + Send + Sync;

/// Replacement lifetime check.
pub type LifetimeValidator = dyn Fn(&Lifetime, &JsonWebToken) -> bool + Send + Sync;

/// Maps `(token, default_claim_type)` to the claim type used by the identity.
pub type ClaimTypeMapper = dyn Fn(&JsonWebToken, &str) -> String + Send + Sync;

/// Raw time claims handed to a custom lifetime validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifetime {
    pub issued_at: Option<DateTime<Utc>>,
    pub not_before: Option<DateTime<Utc>>,
    pub expires: Option<DateTime<Utc>>,
}

/// Built-in behavior or a caller-supplied replacement.
///
/// `Custom` replaces the built-in check entirely; it never runs in addition
/// to it.
pub enum Hook<F: ?Sized> {
    Default,
    Custom(Arc<F>),
}

impl<F: ?Sized> Hook<F> {
    pub fn is_custom(&self) -> bool {
        matches!(self, Hook::Custom(_))
    }

    pub fn custom(&self) -> Option<&F> {
        match self {
            Hook::Default => None,
            Hook::Custom(f) => Some(f.as_ref()),
        }
    }
}

impl<F: ?Sized> Default for Hook<F> {
    fn default() -> Self {
        Hook::Default
    }
}

impl<F: ?Sized> Clone for Hook<F> {
    fn clone(&self) -> Self {
        match self {
            Hook::Default => Hook::Default,
            Hook::Custom(f) => Hook::Custom(Arc::clone(f)),
        }
    }
}

impl<F: ?Sized> fmt::Debug for Hook<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hook::Default => f.write_str("Default"),
            Hook::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Handling of `alg: none` tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnsignedTokenPolicy {
    /// Unsigned tokens fail signature validation.
    #[default]
    Reject,
    /// Unsigned tokens skip signature validation; every acceptance is
    /// emitted as an audit event.
    AcceptAudited,
}

/// Trust configuration consumed by validation.
#[derive(Clone)]
pub struct TrustPolicy {
    // Keys
    signing_key: Option<SharedKey>,
    signing_keys: Arc<Vec<SharedKey>>,
    signing_key_retriever: Option<Arc<SigningKeyRetriever>>,
    token_decryption_key: Option<SharedKey>,
    token_decryption_keys: Arc<Vec<SharedKey>>,

    // Accepted parties
    valid_issuer: Option<String>,
    valid_issuers: Option<Arc<Vec<String>>>,
    valid_audience: Option<String>,
    valid_audiences: Option<Arc<Vec<String>>>,

    // Override predicates
    issuer_validator: Hook<IssuerValidator>,
    audience_validator: Hook<AudienceValidator>,
    lifetime_validator: Hook<LifetimeValidator>,

    // Switches
    validate_issuer: bool,
    validate_audience: bool,
    validate_actor: bool,
    validate_issuer_certificate: bool,
    require_expiration_time: bool,
    save_signin_token: bool,
    unsigned_tokens: UnsignedTokenPolicy,
    clock_skew: Duration,

    token_replay_cache: Option<SharedReplayCache>,

    // Identity materialization
    name_claim_type: Hook<ClaimTypeMapper>,
    role_claim_type: Hook<ClaimTypeMapper>,
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl TrustPolicy {
    /// The default policy: issuer and audience validated, actor not
    /// validated, `exp` required, no clock skew, unsigned tokens rejected.
    pub fn new() -> Self {
        Self {
            signing_key: None,
            signing_keys: Arc::new(Vec::new()),
            signing_key_retriever: None,
            token_decryption_key: None,
            token_decryption_keys: Arc::new(Vec::new()),
            valid_issuer: None,
            valid_issuers: None,
            valid_audience: None,
            valid_audiences: None,
            issuer_validator: Hook::Default,
            audience_validator: Hook::Default,
            lifetime_validator: Hook::Default,
            validate_issuer: true,
            validate_audience: true,
            validate_actor: false,
            validate_issuer_certificate: false,
            require_expiration_time: true,
            save_signin_token: false,
            unsigned_tokens: UnsignedTokenPolicy::Reject,
            clock_skew: Duration::zero(),
            token_replay_cache: None,
            name_claim_type: Hook::Default,
            role_claim_type: Hook::Default,
        }
    }

    /// Copy-construct from an existing policy.
    ///
    /// Same shallow semantics as `Clone`. Fails with `InvalidArgument` when
    /// `other` is absent.
    pub fn from_existing(other: Option<&TrustPolicy>) -> Result<Self> {
        other
            .cloned()
            .ok_or_else(|| Error::InvalidArgument("source trust policy is required".into()))
    }

    // ========================================================================
    // Derived queries
    // ========================================================================

    /// Union of `valid_issuer` and `valid_issuers`.
    pub fn accepted_issuers(&self) -> BTreeSet<String> {
        union(self.valid_issuer.as_ref(), self.valid_issuers.as_deref())
    }

    /// Union of `valid_audience` and `valid_audiences`.
    pub fn accepted_audiences(&self) -> BTreeSet<String> {
        union(self.valid_audience.as_ref(), self.valid_audiences.as_deref())
    }

    /// Report configuration that can never validate a token.
    pub fn validate_configuration(&self) -> Result<()> {
        if self.clock_skew < Duration::zero() {
            return Err(Error::InvalidConfiguration(format!(
                "clock skew must not be negative, got {}s",
                self.clock_skew.num_seconds()
            )));
        }
        if self.clock_skew > Duration::seconds(MAX_CLOCK_SKEW_SECS) {
            return Err(Error::InvalidConfiguration(format!(
                "clock skew must not exceed {}s, got {}s",
                MAX_CLOCK_SKEW_SECS,
                self.clock_skew.num_seconds()
            )));
        }
        Ok(())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn signing_key(&self) -> Option<&SharedKey> {
        self.signing_key.as_ref()
    }

    pub fn signing_keys(&self) -> &[SharedKey] {
        &self.signing_keys
    }

    pub fn signing_key_retriever(&self) -> Option<&SigningKeyRetriever> {
        self.signing_key_retriever.as_deref()
    }

    pub fn token_decryption_key(&self) -> Option<&SharedKey> {
        self.token_decryption_key.as_ref()
    }

    pub fn token_decryption_keys(&self) -> &[SharedKey] {
        &self.token_decryption_keys
    }

    pub fn valid_issuer(&self) -> Option<&str> {
        self.valid_issuer.as_deref()
    }

    pub fn valid_issuers(&self) -> Option<&[String]> {
        self.valid_issuers.as_deref().map(Vec::as_slice)
    }

    pub fn valid_audience(&self) -> Option<&str> {
        self.valid_audience.as_deref()
    }

    pub fn valid_audiences(&self) -> Option<&[String]> {
        self.valid_audiences.as_deref().map(Vec::as_slice)
    }

    pub fn issuer_validator(&self) -> &Hook<IssuerValidator> {
        &self.issuer_validator
    }

    pub fn audience_validator(&self) -> &Hook<AudienceValidator> {
        &self.audience_validator
    }

    pub fn lifetime_validator(&self) -> &Hook<LifetimeValidator> {
        &self.lifetime_validator
    }

    pub fn validate_issuer(&self) -> bool {
        self.validate_issuer
    }

    pub fn validate_audience(&self) -> bool {
        self.validate_audience
    }

    pub fn validate_actor(&self) -> bool {
        self.validate_actor
    }

    pub fn validate_issuer_certificate(&self) -> bool {
        self.validate_issuer_certificate
    }

    pub fn require_expiration_time(&self) -> bool {
        self.require_expiration_time
    }

    pub fn save_signin_token(&self) -> bool {
        self.save_signin_token
    }

    pub fn unsigned_tokens(&self) -> UnsignedTokenPolicy {
        self.unsigned_tokens
    }

    pub fn clock_skew(&self) -> Duration {
        self.clock_skew
    }

    pub fn token_replay_cache(&self) -> Option<&SharedReplayCache> {
        self.token_replay_cache.as_ref()
    }

    pub fn name_claim_type(&self) -> &Hook<ClaimTypeMapper> {
        &self.name_claim_type
    }

    pub fn role_claim_type(&self) -> &Hook<ClaimTypeMapper> {
        &self.role_claim_type
    }

    /// Claim type used for the identity name of `token`.
    pub fn name_claim_type_for(&self, token: &JsonWebToken) -> String {
        match self.name_claim_type.custom() {
            Some(mapper) => mapper(token, DEFAULT_NAME_CLAIM_TYPE),
            None => DEFAULT_NAME_CLAIM_TYPE.to_string(),
        }
    }

    /// Claim type used for roles of `token`.
    pub fn role_claim_type_for(&self, token: &JsonWebToken) -> String {
        match self.role_claim_type.custom() {
            Some(mapper) => mapper(token, DEFAULT_ROLE_CLAIM_TYPE),
            None => DEFAULT_ROLE_CLAIM_TYPE.to_string(),
        }
    }

    // ========================================================================
    // Builders
    // ========================================================================

    pub fn with_signing_key(mut self, key: SharedKey) -> Self {
        self.signing_key = Some(key);
        self
    }

    /// Ordered static keys, tried after `signing_key`.
    pub fn with_signing_keys<I>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = SharedKey>,
    {
        self.signing_keys = Arc::new(keys.into_iter().collect());
        self
    }

    /// Dynamic key source, tried after all static keys.
    pub fn with_signing_key_retriever<F>(mut self, retriever: F) -> Self
    where
        F: Fn(Option<&str>) -> Result<Vec<SharedKey>> + Send + Sync + 'static,
    {
        self.signing_key_retriever = Some(Arc::new(retriever));
        self
    }

    pub fn with_token_decryption_key(mut self, key: SharedKey) -> Self {
        self.token_decryption_key = Some(key);
        self
    }

    pub fn with_token_decryption_keys<I>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = SharedKey>,
    {
        self.token_decryption_keys = Arc::new(keys.into_iter().collect());
        self
    }

    pub fn with_valid_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.valid_issuer = Some(issuer.into());
        self
    }

    pub fn with_valid_issuers<I, S>(mut self, issuers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.valid_issuers = Some(Arc::new(issuers.into_iter().map(Into::into).collect()));
        self
    }

    pub fn with_valid_audience(mut self, audience: impl Into<String>) -> Self {
        self.valid_audience = Some(audience.into());
        self
    }

    pub fn with_valid_audiences<I, S>(mut self, audiences: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.valid_audiences = Some(Arc::new(audiences.into_iter().map(Into::into).collect()));
        self
    }

    pub fn with_issuer_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(Option<&str>, &JsonWebToken) -> bool + Send + Sync + 'static,
    {
        self.issuer_validator = Hook::Custom(Arc::new(validator));
        self
    }

    pub fn with_audience_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&[String], &JsonWebToken) -> bool + Send + Sync + 'static,
    {
        self.audience_validator = Hook::Custom(Arc::new(validator));
        self
    }

    pub fn with_lifetime_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Lifetime, &JsonWebToken) -> bool + Send + Sync + 'static,
    {
        self.lifetime_validator = Hook::Custom(Arc::new(validator));
        self
    }

    pub fn with_validate_issuer(mut self, enabled: bool) -> Self {
        self.validate_issuer = enabled;
        self
    }

    pub fn with_validate_audience(mut self, enabled: bool) -> Self {
        self.validate_audience = enabled;
        self
    }

    pub fn with_validate_actor(mut self, enabled: bool) -> Self {
        self.validate_actor = enabled;
        self
    }

    /// Require the verifying key to report a trusted backing certificate.
    pub fn with_validate_issuer_certificate(mut self, enabled: bool) -> Self {
        self.validate_issuer_certificate = enabled;
        self
    }

    pub fn with_require_expiration_time(mut self, required: bool) -> Self {
        self.require_expiration_time = required;
        self
    }

    /// Keep the raw token on the identity as its bootstrap token.
    pub fn with_save_signin_token(mut self, enabled: bool) -> Self {
        self.save_signin_token = enabled;
        self
    }

    pub fn with_unsigned_tokens(mut self, policy: UnsignedTokenPolicy) -> Self {
        self.unsigned_tokens = policy;
        self
    }

    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }

    pub fn with_token_replay_cache(mut self, cache: SharedReplayCache) -> Self {
        self.token_replay_cache = Some(cache);
        self
    }

    pub fn without_token_replay_cache(mut self) -> Self {
        self.token_replay_cache = None;
        self
    }

    pub fn with_name_claim_type<F>(mut self, mapper: F) -> Self
    where
        F: Fn(&JsonWebToken, &str) -> String + Send + Sync + 'static,
    {
        self.name_claim_type = Hook::Custom(Arc::new(mapper));
        self
    }

    pub fn with_role_claim_type<F>(mut self, mapper: F) -> Self
    where
        F: Fn(&JsonWebToken, &str) -> String + Send + Sync + 'static,
    {
        self.role_claim_type = Hook::Custom(Arc::new(mapper));
        self
    }

    /// Policy used for an embedded actor token: actor validation and replay
    /// detection disabled, everything else shared.
    pub(crate) fn for_actor(&self) -> Self {
        let mut policy = self.clone();
        policy.validate_actor = false;
        policy.token_replay_cache = None;
        policy
    }
}

fn union(single: Option<&String>, many: Option<&Vec<String>>) -> BTreeSet<String> {
    single
        .into_iter()
        .chain(many.into_iter().flatten())
        .cloned()
        .collect()
}

impl fmt::Debug for TrustPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustPolicy")
            .field("signing_key", &self.signing_key.as_ref().map(|k| k.key_id()))
            .field("signing_keys", &self.signing_keys.len())
            .field("signing_key_retriever", &self.signing_key_retriever.is_some())
            .field("token_decryption_keys", &(self.token_decryption_key.is_some() as usize + self.token_decryption_keys.len()))
            .field("accepted_issuers", &self.accepted_issuers())
            .field("accepted_audiences", &self.accepted_audiences())
            .field("issuer_validator", &self.issuer_validator)
            .field("audience_validator", &self.audience_validator)
            .field("lifetime_validator", &self.lifetime_validator)
            .field("validate_issuer", &self.validate_issuer)
            .field("validate_audience", &self.validate_audience)
            .field("validate_actor", &self.validate_actor)
            .field("validate_issuer_certificate", &self.validate_issuer_certificate)
            .field("require_expiration_time", &self.require_expiration_time)
            .field("save_signin_token", &self.save_signin_token)
            .field("unsigned_tokens", &self.unsigned_tokens)
            .field("clock_skew", &self.clock_skew)
            .field("token_replay_cache", &self.token_replay_cache.is_some())
            .field("name_claim_type", &self.name_claim_type)
            .field("role_claim_type", &self.role_claim_type)
            .finish()
    }
}
