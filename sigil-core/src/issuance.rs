//! Token issuance.
//!
//! [`issue`] signs a claim set and optionally wraps the signed token in an
//! encrypted token. Time claims are never injected: callers set `iat`,
//! `nbf` and `exp` themselves, so for deterministic algorithms identical
//! inputs produce identical signed output. Encrypted output varies only in
//! its random content key and IVs.

use crate::claims::Claims;
use crate::crypto::{encrypt_content, EncryptingCredentials, SigningCredentials};
use crate::error::{Error, Result};
use crate::token::Header;
use crate::wire;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Sign `claims` and, with `encrypting`, encrypt the result.
///
/// Fails with `UnsupportedAlgorithm` when a credential's key cannot perform
/// the credential's algorithm.
pub fn issue(
    claims: &Claims,
    signing: &SigningCredentials,
    encrypting: Option<&EncryptingCredentials>,
) -> Result<String> {
    let signed = sign(claims, signing)?;
    match encrypting {
        Some(credentials) => encrypt(&signed, credentials),
        None => Ok(signed),
    }
}

/// Signed compact token: `header.payload.signature`.
pub fn sign(claims: &Claims, credentials: &SigningCredentials) -> Result<String> {
    let alg = credentials.algorithm;
    if !credentials.key.supports_signature(alg) {
        return Err(Error::UnsupportedAlgorithm(format!(
            "{} is not supported by signing key {:?}",
            alg,
            credentials.key_id()
        )));
    }
    let header = Header::signed(alg, credentials.key_id());
    let input = wire::signing_input(&header, claims)?;
    let signature = credentials.key.sign(alg, input.as_bytes())?;
    Ok(wire::append_signature(&input, &signature))
}

/// Encrypted compact token carrying `signed` as its plaintext.
pub fn encrypt(signed: &str, credentials: &EncryptingCredentials) -> Result<String> {
    let (alg, enc) = (credentials.algorithm, credentials.encryption);
    if !credentials.key.supports_key_management(alg, enc) {
        return Err(Error::UnsupportedAlgorithm(format!(
            "{}/{} is not supported by encrypting key {:?}",
            alg,
            enc,
            credentials.key_id()
        )));
    }

    let (cek, wrapped) = credentials.key.content_encryption_key(alg, enc)?;
    let mut header = Header::encrypted(alg, enc, credentials.key_id());
    header.iv = wrapped.iv.as_deref().map(wire::encode_segment);
    header.tag = wrapped.tag.as_deref().map(wire::encode_segment);

    let protected = wire::encode_header(&header)?;
    let content = encrypt_content(enc, &cek, protected.as_bytes(), signed.as_bytes())?;
    Ok(wire::encode_encrypted(
        &protected,
        &wrapped.encrypted_key,
        &content,
    ))
}

/// Unsigned compact token (`alg: none`). Only a policy with
/// [`UnsignedTokenPolicy::AcceptAudited`](crate::policy::UnsignedTokenPolicy)
/// accepts these.
pub fn issue_unsigned(claims: &Claims) -> Result<String> {
    Ok(format!("{}.", wire::signing_input(&Header::unsigned(), claims)?))
}

/// Fluent issuance.
///
/// ```rust,ignore
/// let token = TokenBuilder::new()
///     .issuer("https://login.example.com")
///     .audience("api://orders")
///     .subject("alice")
///     .issued_at(now)
///     .expires(now + Duration::minutes(10))
///     .signing_credentials(SigningCredentials::new(key, SignatureAlgorithm::HS256))
///     .build()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct TokenBuilder {
    claims: Claims,
    signing: Option<SigningCredentials>,
    encrypting: Option<EncryptingCredentials>,
}

impl TokenBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing claim set.
    pub fn from_claims(claims: Claims) -> Self {
        Self {
            claims,
            ..Self::default()
        }
    }

    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.claims = self.claims.with_issuer(issuer);
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.claims = self.claims.with_subject(subject);
        self
    }

    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.claims = self.claims.with_audience(audience);
        self
    }

    pub fn audiences<I, S>(mut self, audiences: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.claims = self.claims.with_audiences(audiences);
        self
    }

    pub fn issued_at(mut self, at: DateTime<Utc>) -> Self {
        self.claims = self.claims.with_issued_at(at);
        self
    }

    pub fn not_before(mut self, at: DateTime<Utc>) -> Self {
        self.claims = self.claims.with_not_before(at);
        self
    }

    pub fn expires(mut self, at: DateTime<Utc>) -> Self {
        self.claims = self.claims.with_expiration(at);
        self
    }

    pub fn jwt_id(mut self, id: impl Into<String>) -> Self {
        self.claims = self.claims.with_jwt_id(id);
        self
    }

    /// Embed the token of the party acting on the subject's behalf.
    pub fn actor_token(mut self, token: impl Into<String>) -> Self {
        self.claims = self.claims.with_actor_token(token);
        self
    }

    pub fn claim(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.claims = self.claims.with_claim(name, value);
        self
    }

    pub fn signing_credentials(mut self, credentials: SigningCredentials) -> Self {
        self.signing = Some(credentials);
        self
    }

    pub fn encrypting_credentials(mut self, credentials: EncryptingCredentials) -> Self {
        self.encrypting = Some(credentials);
        self
    }

    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    pub fn build(self) -> Result<String> {
        let signing = self
            .signing
            .as_ref()
            .ok_or_else(|| Error::InvalidArgument("signing credentials are required".into()))?;
        issue(&self.claims, signing, self.encrypting.as_ref())
    }
}
