//! Validation pipeline.
//!
//! [`TokenHandler::validate`] drives one token through
//!
//! ```text
//! Decoded -> (Decrypted) -> SignatureChecked -> ClaimsChecked -> Done
//! ```
//!
//! Structural and cryptographic failures end the run immediately. Claim
//! validators run in a fixed order and either stop at the first failure or,
//! with `collect_all_failures`, report every failure. Nothing is retried.
//!
//! The handler holds no per-token state and can be shared freely across
//! threads. The only shared mutable state touched during validation is the
//! policy's replay cache.

use crate::audit::{AuditEvent, AuditEventType, NoOpLogger, SharedAuditLogger};
use crate::claims::Claims;
use crate::clock::{SharedClock, SystemClock};
use crate::crypto::{decrypt_content, token_digest, EncryptingCredentials, SigningCredentials};
use crate::error::{Error, ErrorKind, Result};
use crate::identity::ClaimsIdentity;
use crate::issuance;
use crate::policy::{TrustPolicy, UnsignedTokenPolicy};
use crate::resolver::{resolve_decryption_keys, resolve_signing_keys};
use crate::token::JsonWebToken;
use crate::validators::{self, ValidationContext, ValidatorStage};
use crate::wire::{self, CompactToken, EncryptedToken, SignedToken, DEFAULT_MAX_TOKEN_SIZE};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

// ============================================================================
// ValidationResult
// ============================================================================

/// Outcome of validating one token.
///
/// `is_valid()` holds exactly when there is no failure reason and a claims
/// identity is present.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    failures: Vec<Error>,
    claims: Option<ClaimsIdentity>,
    validated_token: Option<Arc<JsonWebToken>>,
}

impl ValidationResult {
    fn valid(identity: ClaimsIdentity, token: Arc<JsonWebToken>) -> Self {
        Self {
            failures: Vec::new(),
            claims: Some(identity),
            validated_token: Some(token),
        }
    }

    fn invalid(failures: Vec<Error>) -> Self {
        Self {
            failures,
            claims: None,
            validated_token: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.failures.is_empty() && self.claims.is_some()
    }

    /// First failure in validator order.
    pub fn failure_reason(&self) -> Option<&Error> {
        self.failures.first()
    }

    pub fn failure_kind(&self) -> Option<ErrorKind> {
        self.failure_reason().map(Error::kind)
    }

    /// Every failure found. Holds more than one entry only when the handler
    /// collects all failures.
    pub fn failures(&self) -> &[Error] {
        &self.failures
    }

    pub fn claims(&self) -> Option<&ClaimsIdentity> {
        self.claims.as_ref()
    }

    pub fn validated_token(&self) -> Option<&Arc<JsonWebToken>> {
        self.validated_token.as_ref()
    }

    /// The identity, or the first failure.
    pub fn into_result(self) -> Result<ClaimsIdentity> {
        match (self.failures.into_iter().next(), self.claims) {
            (None, Some(identity)) => Ok(identity),
            (Some(e), _) => Err(e),
            (None, None) => Err(Error::InvalidArgument(
                "validation produced no identity".into(),
            )),
        }
    }
}

// ============================================================================
// TokenHandler
// ============================================================================

/// Builder for [`TokenHandler`].
#[derive(Debug)]
pub struct TokenHandlerBuilder {
    clock: SharedClock,
    max_token_size: usize,
    collect_all_failures: bool,
    audit: SharedAuditLogger,
}

impl Default for TokenHandlerBuilder {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            max_token_size: DEFAULT_MAX_TOKEN_SIZE,
            collect_all_failures: false,
            audit: Arc::new(NoOpLogger),
        }
    }
}

impl TokenHandlerBuilder {
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn max_token_size(mut self, bytes: usize) -> Self {
        self.max_token_size = bytes;
        self
    }

    /// Run every claim validator and report all failures instead of
    /// stopping at the first.
    pub fn collect_all_failures(mut self, enabled: bool) -> Self {
        self.collect_all_failures = enabled;
        self
    }

    pub fn audit_logger(mut self, logger: SharedAuditLogger) -> Self {
        self.audit = logger;
        self
    }

    pub fn build(self) -> Result<TokenHandler> {
        if self.max_token_size == 0 {
            return Err(Error::InvalidConfiguration(
                "max_token_size must be greater than zero".into(),
            ));
        }
        Ok(TokenHandler {
            clock: self.clock,
            max_token_size: self.max_token_size,
            collect_all_failures: self.collect_all_failures,
            audit: self.audit,
        })
    }
}

/// Validates and issues tokens.
#[derive(Debug, Clone)]
pub struct TokenHandler {
    clock: SharedClock,
    max_token_size: usize,
    collect_all_failures: bool,
    audit: SharedAuditLogger,
}

impl Default for TokenHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Intermediate result of one pipeline run.
struct Evaluation {
    token: Option<Arc<JsonWebToken>>,
    failures: Vec<Error>,
    identity: Option<ClaimsIdentity>,
}

impl Evaluation {
    fn failed(error: Error) -> Self {
        Self {
            token: None,
            failures: vec![error],
            identity: None,
        }
    }
}

impl TokenHandler {
    /// Handler with the system clock, default size limit, short-circuit
    /// validation and no audit sink.
    pub fn new() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            max_token_size: DEFAULT_MAX_TOKEN_SIZE,
            collect_all_failures: false,
            audit: Arc::new(NoOpLogger),
        }
    }

    pub fn builder() -> TokenHandlerBuilder {
        TokenHandlerBuilder::default()
    }

    pub fn max_token_size(&self) -> usize {
        self.max_token_size
    }

    pub fn collects_all_failures(&self) -> bool {
        self.collect_all_failures
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Validate `token` against `policy`.
    ///
    /// Never panics and never returns an error: every failure is carried in
    /// the result.
    pub fn validate(&self, token: &str, policy: &TrustPolicy) -> ValidationResult {
        let now = self.clock.now();
        let evaluation = self.evaluate(token, policy, now, self.collect_all_failures);
        let digest = token_digest(token);

        match evaluation {
            Evaluation {
                token: Some(validated),
                failures,
                identity: Some(identity),
            } if failures.is_empty() => {
                debug!(
                    token = %&digest[..16],
                    iss = validated.issuer().unwrap_or("-"),
                    kid = validated.signing_key_id().unwrap_or("-"),
                    "token validated"
                );
                self.audit.log(
                    AuditEvent::new(AuditEventType::TokenValidated)
                        .at(now)
                        .with_token_digest(&digest)
                        .with_issuer(validated.issuer())
                        .with_subject(validated.subject())
                        .with_key_id(validated.signing_key_id()),
                );
                ValidationResult::valid(identity, validated)
            }
            Evaluation {
                token, failures, ..
            } => {
                let failures = if failures.is_empty() {
                    vec![Error::InvalidArgument("validation produced no identity".into())]
                } else {
                    failures
                };
                let first = &failures[0];
                warn!(
                    token = %&digest[..16],
                    kind = first.kind().name(),
                    failures = failures.len(),
                    error = %first,
                    "token validation failed"
                );
                let event_type = if first.kind() == ErrorKind::TokenReplayDetected {
                    AuditEventType::ReplayDetected
                } else {
                    AuditEventType::ValidationFailed
                };
                let issuer = token.as_deref().and_then(JsonWebToken::issuer);
                self.audit.log(
                    AuditEvent::new(event_type)
                        .at(now)
                        .with_token_digest(&digest)
                        .with_issuer(issuer)
                        .with_error(first),
                );
                ValidationResult::invalid(failures)
            }
        }
    }

    /// Issue a token and record the issuance in the audit log.
    pub fn issue(
        &self,
        claims: &Claims,
        signing: &SigningCredentials,
        encrypting: Option<&EncryptingCredentials>,
    ) -> Result<String> {
        let token = issuance::issue(claims, signing, encrypting)?;
        debug!(
            alg = %signing.algorithm,
            kid = signing.key_id().unwrap_or("-"),
            encrypted = encrypting.is_some(),
            "token issued"
        );
        self.audit.log(
            AuditEvent::new(AuditEventType::TokenIssued)
                .at(self.clock.now())
                .with_token_digest(&token_digest(&token))
                .with_issuer(claims.issuer())
                .with_subject(claims.subject())
                .with_key_id(signing.key_id()),
        );
        Ok(token)
    }

    fn evaluate(&self, raw: &str, policy: &TrustPolicy, now: DateTime<Utc>, collect: bool) -> Evaluation {
        if let Err(e) = policy.validate_configuration() {
            return Evaluation::failed(e);
        }
        let token = match self.authenticate(raw, policy, now) {
            Ok(token) => Arc::new(token),
            Err(e) => return Evaluation::failed(e),
        };

        let ctx = ValidationContext {
            token: &token,
            policy,
            now,
        };
        let mut failures = Vec::new();
        let mut actor = None;
        for stage in ValidatorStage::ORDER {
            let outcome = match stage {
                ValidatorStage::Lifetime => validators::validate_lifetime(&ctx),
                ValidatorStage::Issuer => validators::validate_issuer(&ctx),
                ValidatorStage::Audience => validators::validate_audience(&ctx),
                ValidatorStage::Actor => {
                    validators::validate_actor(&ctx, |actor_raw, actor_policy| {
                        self.validate_nested(actor_raw, actor_policy, now)
                    })
                    .map(|identity| actor = identity)
                }
                ValidatorStage::Replay => validators::validate_replay(&ctx, failures.is_empty()),
            };
            if let Err(e) = outcome {
                debug!(stage = ?stage, kind = e.kind().name(), "claim validation failed");
                failures.push(e);
                if !collect {
                    break;
                }
            }
        }

        if !failures.is_empty() {
            return Evaluation {
                token: Some(token),
                failures,
                identity: None,
            };
        }

        let mut identity = ClaimsIdentity::from_token(
            &token,
            policy.name_claim_type_for(&token),
            policy.role_claim_type_for(&token),
        );
        if let Some(actor) = actor {
            identity = identity.with_actor(actor);
        }
        if policy.save_signin_token() {
            identity = identity.with_bootstrap_token(token.raw_data());
        }
        Evaluation {
            token: Some(token),
            failures,
            identity: Some(identity),
        }
    }

    fn validate_nested(&self, raw: &str, policy: &TrustPolicy, now: DateTime<Utc>) -> Result<ClaimsIdentity> {
        let evaluation = self.evaluate(raw, policy, now, false);
        match (evaluation.failures.into_iter().next(), evaluation.identity) {
            (None, Some(identity)) => Ok(identity),
            (Some(e), _) => Err(e),
            (None, None) => Err(Error::InvalidArgument(
                "actor validation produced no identity".into(),
            )),
        }
    }

    /// Decode, decrypt if needed, and verify the signature.
    fn authenticate(&self, raw: &str, policy: &TrustPolicy, now: DateTime<Utc>) -> Result<JsonWebToken> {
        match wire::decode(raw, self.max_token_size)? {
            CompactToken::Signed(signed) => self.verify_signature(signed, policy, now),
            CompactToken::Encrypted(encrypted) => {
                let plaintext = self.decrypt(&encrypted, policy)?;
                let signed = wire::decode_signed(&plaintext, self.max_token_size)?;
                let token = self.verify_signature(signed, policy, now)?;
                Ok(token.wrapped_in(encrypted.header, raw))
            }
        }
    }

    fn decrypt(&self, encrypted: &EncryptedToken, policy: &TrustPolicy) -> Result<String> {
        let alg = encrypted.header.key_management_algorithm()?;
        let enc = encrypted.header.content_encryption_algorithm()?;
        let candidates = resolve_decryption_keys(encrypted.header.kid.as_deref(), policy);
        if candidates.is_empty() {
            return Err(Error::DecryptionFailed("no decryption keys configured".into()));
        }

        for key in candidates
            .iter()
            .filter(|key| key.supports_key_management(alg, enc))
        {
            let Ok(cek) = key.unwrap_key(alg, enc, &encrypted.wrapped_key) else {
                continue;
            };
            if let Ok(plaintext) = decrypt_content(
                enc,
                &cek,
                &encrypted.iv,
                encrypted.protected.as_bytes(),
                &encrypted.ciphertext,
                &encrypted.tag,
            ) {
                debug!(kid = key.key_id().unwrap_or("-"), %alg, %enc, "token decrypted");
                return String::from_utf8(plaintext)
                    .map_err(|_| Error::MalformedToken("decrypted payload is not UTF-8".into()));
            }
        }
        Err(Error::DecryptionFailed(format!(
            "none of {} candidate keys decrypted the token",
            candidates.len()
        )))
    }

    fn verify_signature(&self, signed: SignedToken, policy: &TrustPolicy, now: DateTime<Utc>) -> Result<JsonWebToken> {
        let kid = signed.header.kid.clone();

        if signed.header.is_unsigned() {
            if policy.unsigned_tokens() == UnsignedTokenPolicy::Reject {
                return Err(Error::UnsignedTokenRejected);
            }
            if !signed.signature.is_empty() {
                return Err(Error::MalformedToken(
                    "unsigned token carries a signature".into(),
                ));
            }
            let digest = token_digest(signed.raw());
            warn!(token = %&digest[..16], "accepting unsigned token");
            self.audit.log(
                AuditEvent::new(AuditEventType::UnsignedTokenAccepted)
                    .at(now)
                    .with_token_digest(&digest)
                    .with_issuer(signed.claims.issuer())
                    .with_subject(signed.claims.subject()),
            );
            let (header, claims, raw) = signed.into_parts();
            return Ok(JsonWebToken::new(header, claims, raw));
        }

        let alg = signed.header.signature_algorithm()?;
        let candidates = resolve_signing_keys(kid.as_deref(), policy)?;
        if candidates.is_empty() {
            return Err(Error::NoSigningKeys { kid });
        }

        let matched = candidates.iter().find(|key| {
            key.supports_signature(alg) && key.verify(alg, signed.signing_input(), &signed.signature)
        });
        let Some(key) = matched else {
            return Err(Error::SignatureInvalid(format!(
                "no candidate key matched ({} tried, kid {:?})",
                candidates.len(),
                kid
            )));
        };

        if policy.validate_issuer_certificate() && key.certificate_trusted() != Some(true) {
            return Err(Error::SigningKeyNotTrusted(
                key.key_id().unwrap_or("<no kid>").to_string(),
            ));
        }

        let key_id = key.key_id().map(str::to_string);
        let (header, claims, raw) = signed.into_parts();
        Ok(JsonWebToken::new(header, claims, raw).verified_by(key_id.as_deref()))
    }
}
