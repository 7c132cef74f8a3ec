//! Compact serialization.
//!
//! Signed tokens are three base64url segments (`header.payload.signature`),
//! encrypted tokens are five (`header.encrypted_key.iv.ciphertext.tag`).
//! All segments use the URL-safe alphabet without padding.
//!
//! ## Security Limits
//!
//! - **Token size**: checked against a caller-supplied limit (default
//!   [`DEFAULT_MAX_TOKEN_SIZE`]) before any decoding.

use crate::claims::Claims;
use crate::crypto::{EncryptedContent, WrappedKey};
use crate::error::{Error, Result};
use crate::token::Header;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Default maximum token size in bytes (250 KB).
pub const DEFAULT_MAX_TOKEN_SIZE: usize = 250 * 1024;

const SIGNED_SEGMENTS: usize = 3;
const ENCRYPTED_SEGMENTS: usize = 5;

/// A decoded token in one of the two compact forms.
#[derive(Debug, Clone)]
pub enum CompactToken {
    Signed(SignedToken),
    Encrypted(EncryptedToken),
}

/// Decoded `header.payload.signature`.
#[derive(Debug, Clone)]
pub struct SignedToken {
    pub header: Header,
    pub claims: Claims,
    pub signature: Vec<u8>,
    raw: String,
    signing_input_len: usize,
}

impl SignedToken {
    /// The ASCII `header.payload` prefix covered by the signature.
    pub fn signing_input(&self) -> &[u8] {
        &self.raw.as_bytes()[..self.signing_input_len]
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn into_parts(self) -> (Header, Claims, String) {
        (self.header, self.claims, self.raw)
    }
}

/// Decoded five-segment encrypted token.
#[derive(Debug, Clone)]
pub struct EncryptedToken {
    pub header: Header,
    /// Encoded protected header; the additional authenticated data.
    pub protected: String,
    pub wrapped_key: WrappedKey,
    pub iv: Vec<u8>,
    pub ciphertext: Vec<u8>,
    pub tag: Vec<u8>,
}

/// Decode either compact form.
pub fn decode(raw: &str, max_size: usize) -> Result<CompactToken> {
    check_size(raw, max_size)?;
    match raw.split('.').count() {
        SIGNED_SEGMENTS => decode_signed_unchecked(raw).map(CompactToken::Signed),
        ENCRYPTED_SEGMENTS => decode_encrypted_unchecked(raw).map(CompactToken::Encrypted),
        n => Err(Error::MalformedToken(format!(
            "expected {} or {} segments, found {}",
            SIGNED_SEGMENTS, ENCRYPTED_SEGMENTS, n
        ))),
    }
}

/// Decode a signed token; encrypted input is malformed here.
pub fn decode_signed(raw: &str, max_size: usize) -> Result<SignedToken> {
    check_size(raw, max_size)?;
    decode_signed_unchecked(raw)
}

fn check_size(raw: &str, max_size: usize) -> Result<()> {
    if raw.len() > max_size {
        return Err(Error::TokenTooLarge {
            size: raw.len(),
            max: max_size,
        });
    }
    if raw.is_empty() {
        return Err(Error::MalformedToken("token is empty".into()));
    }
    Ok(())
}

fn decode_signed_unchecked(raw: &str) -> Result<SignedToken> {
    let segments: Vec<&str> = raw.split('.').collect();
    if segments.len() != SIGNED_SEGMENTS {
        return Err(Error::MalformedToken(format!(
            "signed token must have {} segments, found {}",
            SIGNED_SEGMENTS,
            segments.len()
        )));
    }
    let (header_b64, payload_b64, signature_b64) = (segments[0], segments[1], segments[2]);

    let header: Header = serde_json::from_slice(&decode_segment("header", header_b64)?)?;
    if header.enc.is_some() {
        return Err(Error::MalformedToken(
            "signed token header carries 'enc'".into(),
        ));
    }
    let claims = Claims::from_json(&decode_segment("payload", payload_b64)?)?;
    let signature = if signature_b64.is_empty() {
        Vec::new()
    } else {
        decode_segment("signature", signature_b64)?
    };

    Ok(SignedToken {
        header,
        claims,
        signature,
        raw: raw.to_string(),
        signing_input_len: header_b64.len() + 1 + payload_b64.len(),
    })
}

fn decode_encrypted_unchecked(raw: &str) -> Result<EncryptedToken> {
    let segments: Vec<&str> = raw.split('.').collect();
    if segments.len() != ENCRYPTED_SEGMENTS {
        return Err(Error::MalformedToken(format!(
            "encrypted token must have {} segments, found {}",
            ENCRYPTED_SEGMENTS,
            segments.len()
        )));
    }

    let header: Header = serde_json::from_slice(&decode_segment("header", segments[0])?)?;
    if header.enc.is_none() {
        return Err(Error::MalformedToken(
            "encrypted token header has no 'enc'".into(),
        ));
    }
    let wrapped_key = WrappedKey {
        encrypted_key: if segments[1].is_empty() {
            Vec::new()
        } else {
            decode_segment("encrypted key", segments[1])?
        },
        iv: header
            .iv
            .as_deref()
            .map(|iv| decode_segment("key wrap iv", iv))
            .transpose()?,
        tag: header
            .tag
            .as_deref()
            .map(|tag| decode_segment("key wrap tag", tag))
            .transpose()?,
    };

    Ok(EncryptedToken {
        protected: segments[0].to_string(),
        wrapped_key,
        iv: decode_segment("iv", segments[2])?,
        ciphertext: decode_segment("ciphertext", segments[3])?,
        tag: decode_segment("tag", segments[4])?,
        header,
    })
}

fn decode_segment(name: &str, segment: &str) -> Result<Vec<u8>> {
    if segment.is_empty() {
        return Err(Error::MalformedToken(format!("{} segment is empty", name)));
    }
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| Error::MalformedToken(format!("{} segment: {}", name, e)))
}

/// base64url without padding.
pub fn encode_segment(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn encode_header(header: &Header) -> Result<String> {
    Ok(encode_segment(&serde_json::to_vec(header)?))
}

/// `header.payload`, the input to the signature.
pub fn signing_input(header: &Header, claims: &Claims) -> Result<String> {
    Ok(format!(
        "{}.{}",
        encode_header(header)?,
        encode_segment(&claims.to_json()?)
    ))
}

/// Append the signature segment. Unsigned tokens get an empty segment.
pub fn append_signature(signing_input: &str, signature: &[u8]) -> String {
    format!("{}.{}", signing_input, encode_segment(signature))
}

/// Join the five encrypted-token segments.
pub fn encode_encrypted(protected: &str, encrypted_key: &[u8], content: &EncryptedContent) -> String {
    format!(
        "{}.{}.{}.{}.{}",
        protected,
        encode_segment(encrypted_key),
        encode_segment(&content.iv),
        encode_segment(&content.ciphertext),
        encode_segment(&content.tag)
    )
}
