//! Token headers and the validated token handle.

use crate::algorithm::{
    ContentEncryptionAlgorithm, KeyManagementAlgorithm, SignatureAlgorithm, UNSIGNED_ALGORITHM,
};
use crate::claims::Claims;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// `typ` / `cty` value for tokens issued by this crate.
pub const JWT_TYPE: &str = "JWT";

/// JOSE header of a signed or encrypted token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub alg: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Content type; `JWT` for a nested signed token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cty: Option<String>,

    /// Content encryption algorithm (encrypted tokens only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enc: Option<String>,

    /// Key-wrap IV for the GCM key-wrap algorithms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iv: Option<String>,

    /// Key-wrap tag for the GCM key-wrap algorithms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    /// Unrecognized members, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Header {
    pub fn signed(alg: SignatureAlgorithm, kid: Option<&str>) -> Self {
        Self::with_alg(alg.as_str(), kid).with_type(JWT_TYPE)
    }

    pub fn unsigned() -> Self {
        Self::with_alg(UNSIGNED_ALGORITHM, None).with_type(JWT_TYPE)
    }

    /// Header of an encrypted token wrapping a signed token.
    pub fn encrypted(
        alg: KeyManagementAlgorithm,
        enc: ContentEncryptionAlgorithm,
        kid: Option<&str>,
    ) -> Self {
        let mut header = Self::with_alg(alg.as_str(), kid);
        header.enc = Some(enc.as_str().to_string());
        header.cty = Some(JWT_TYPE.to_string());
        header
    }

    fn with_alg(alg: &str, kid: Option<&str>) -> Self {
        Self {
            alg: alg.to_string(),
            typ: None,
            kid: kid.map(str::to_string),
            cty: None,
            enc: None,
            iv: None,
            tag: None,
            extra: Map::new(),
        }
    }

    fn with_type(mut self, typ: &str) -> Self {
        self.typ = Some(typ.to_string());
        self
    }

    pub fn is_unsigned(&self) -> bool {
        self.alg == UNSIGNED_ALGORITHM
    }

    pub fn signature_algorithm(&self) -> Result<SignatureAlgorithm> {
        self.alg.parse()
    }

    pub fn key_management_algorithm(&self) -> Result<KeyManagementAlgorithm> {
        self.alg.parse()
    }

    pub fn content_encryption_algorithm(&self) -> Result<ContentEncryptionAlgorithm> {
        self.enc
            .as_deref()
            .ok_or_else(|| Error::MalformedToken("encrypted token has no 'enc' header".into()))?
            .parse()
    }
}

/// A token that passed signature (and, if encrypted, decryption) checks.
///
/// This is the `validated_token` handle of a
/// [`ValidationResult`](crate::pipeline::ValidationResult).
#[derive(Clone)]
pub struct JsonWebToken {
    header: Header,
    claims: Claims,
    raw: String,
    inner_raw: Option<String>,
    encryption_header: Option<Header>,
    signing_key_id: Option<String>,
}

impl fmt::Debug for JsonWebToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonWebToken")
            .field("header", &self.header)
            .field("claims", &self.claims)
            .field("encrypted", &self.encryption_header.is_some())
            .field("signing_key_id", &self.signing_key_id)
            .field("raw", &"<redacted>")
            .finish()
    }
}

impl JsonWebToken {
    pub(crate) fn new(header: Header, claims: Claims, raw: impl Into<String>) -> Self {
        Self {
            header,
            claims,
            raw: raw.into(),
            inner_raw: None,
            encryption_header: None,
            signing_key_id: None,
        }
    }

    /// Record the outer layer of an encrypted token. `self.raw` becomes the
    /// encrypted text, the signed text moves to `inner_raw`.
    pub(crate) fn wrapped_in(mut self, encryption_header: Header, encrypted_raw: &str) -> Self {
        let signed = std::mem::replace(&mut self.raw, encrypted_raw.to_string());
        self.inner_raw = Some(signed);
        self.encryption_header = Some(encryption_header);
        self
    }

    pub(crate) fn verified_by(mut self, key_id: Option<&str>) -> Self {
        self.signing_key_id = key_id.map(str::to_string);
        self
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    /// The token text exactly as presented to the pipeline.
    pub fn raw_data(&self) -> &str {
        &self.raw
    }

    /// The signed token text (the inner token when encrypted).
    pub fn signed_raw(&self) -> &str {
        self.inner_raw.as_deref().unwrap_or(&self.raw)
    }

    pub fn encryption_header(&self) -> Option<&Header> {
        self.encryption_header.as_ref()
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryption_header.is_some()
    }

    pub fn is_signed(&self) -> bool {
        !self.header.is_unsigned()
    }

    /// Key id hint used for key resolution.
    pub fn key_id(&self) -> Option<&str> {
        self.header.kid.as_deref()
    }

    /// Key id of the key that verified the signature.
    pub fn signing_key_id(&self) -> Option<&str> {
        self.signing_key_id.as_deref()
    }

    pub fn issuer(&self) -> Option<&str> {
        self.claims.issuer()
    }

    pub fn subject(&self) -> Option<&str> {
        self.claims.subject()
    }

    pub fn audiences(&self) -> Vec<String> {
        self.claims.audiences()
    }

    pub fn valid_from(&self) -> Option<DateTime<Utc>> {
        self.claims.not_before()
    }

    pub fn valid_to(&self) -> Option<DateTime<Utc>> {
        self.claims.expires()
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.claims.issued_at()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_serialization_omits_absent_members() {
        let header = Header::signed(SignatureAlgorithm::HS256, Some("k1"));
        let json = serde_json::to_string(&header).unwrap();
        assert_eq!(json, r#"{"alg":"HS256","typ":"JWT","kid":"k1"}"#);
    }

    #[test]
    fn test_header_preserves_unknown_members() {
        let header: Header =
            serde_json::from_str(r#"{"alg":"EdDSA","x5t":"abc","crit":["exp"]}"#).unwrap();
        assert_eq!(header.extra.get("x5t"), Some(&Value::String("abc".into())));
        assert_eq!(header.signature_algorithm().unwrap(), SignatureAlgorithm::EdDSA);
    }

    #[test]
    fn test_header_requires_alg() {
        assert!(serde_json::from_str::<Header>(r#"{"typ":"JWT"}"#).is_err());
    }

    #[test]
    fn test_encrypted_header() {
        let header = Header::encrypted(
            KeyManagementAlgorithm::Dir,
            ContentEncryptionAlgorithm::A256Gcm,
            None,
        );
        assert_eq!(header.key_management_algorithm().unwrap(), KeyManagementAlgorithm::Dir);
        assert_eq!(
            header.content_encryption_algorithm().unwrap(),
            ContentEncryptionAlgorithm::A256Gcm
        );
        assert_eq!(header.cty.as_deref(), Some(JWT_TYPE));
    }

    #[test]
    fn test_debug_redacts_raw() {
        let token = JsonWebToken::new(Header::unsigned(), Claims::new(), "secret.token.text");
        assert!(!format!("{:?}", token).contains("secret.token.text"));
    }

    #[test]
    fn test_wrapped_token_keeps_both_layers() {
        let token = JsonWebToken::new(Header::unsigned(), Claims::new(), "a.b.c").wrapped_in(
            Header::encrypted(
                KeyManagementAlgorithm::Dir,
                ContentEncryptionAlgorithm::A128Gcm,
                None,
            ),
            "v.w.x.y.z",
        );
        assert!(token.is_encrypted());
        assert_eq!(token.raw_data(), "v.w.x.y.z");
        assert_eq!(token.signed_raw(), "a.b.c");
    }
}
