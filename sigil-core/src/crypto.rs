//! Key material and cryptographic primitives.
//!
//! The validation pipeline only sees keys through the [`SecurityKey`]
//! capability. Two concrete implementations ship with the crate:
//!
//! - [`SymmetricKey`]: HMAC-SHA2 signatures (`HS256`, `HS384`, `HS512`) and
//!   AES-GCM key management (`dir`, `A128GCMKW`, `A256GCMKW`).
//! - [`Ed25519Key`]: `EdDSA` signatures.
//!
//! ## Security Properties
//!
//! 1. **Secret hygiene**: private material lives in `secrecy::Secret` and is
//!    zeroized on drop. `Debug` output is redacted.
//!
//! 2. **Constant-time comparison**: HMAC tags are checked with
//!    `Mac::verify_slice`.

use crate::algorithm::{ContentEncryptionAlgorithm, KeyManagementAlgorithm, SignatureAlgorithm};
use crate::error::{Error, Result};
use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey as Ed25519SigningKey, VerifyingKey};
use pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey, LineEnding};
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{CloneableSecret, ExposeSecret, Secret, SecretVec, Zeroize};
use hmac::{Mac, SimpleHmac};
use sha2::digest::core_api::BlockSizeUser;
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::fmt;
use std::sync::Arc;
use zeroize::Zeroizing;

/// AES-GCM nonce length in bytes.
pub const GCM_IV_LEN: usize = 12;

/// AES-GCM authentication tag length in bytes.
pub const GCM_TAG_LEN: usize = 16;

/// Shortest HMAC secret accepted at construction (128 bits).
pub const MIN_SYMMETRIC_KEY_LEN: usize = 16;

/// A key shared between policies, credentials and concurrent validations.
pub type SharedKey = Arc<dyn SecurityKey>;

/// Opaque key capability consumed by the resolver and pipeline.
///
/// Implementations must be safe to share across threads and must never
/// mutate observable state from `verify` or `unwrap_key`.
pub trait SecurityKey: Send + Sync + fmt::Debug {
    /// Identifier matched against the token's `kid` header.
    fn key_id(&self) -> Option<&str>;

    /// Whether this key can verify (and, with private material, produce)
    /// signatures for `alg`.
    fn supports_signature(&self, alg: SignatureAlgorithm) -> bool;

    /// Sign `input` (the ASCII `header.payload` signing input).
    fn sign(&self, alg: SignatureAlgorithm, input: &[u8]) -> Result<Vec<u8>>;

    /// Verify `signature` over `input`. Never errors; a mismatch is `false`.
    fn verify(&self, alg: SignatureAlgorithm, input: &[u8], signature: &[u8]) -> bool;

    /// Whether this key can wrap/unwrap content keys for the pair.
    fn supports_key_management(
        &self,
        _alg: KeyManagementAlgorithm,
        _enc: ContentEncryptionAlgorithm,
    ) -> bool {
        false
    }

    /// Produce a content encryption key and its wrapped form.
    fn content_encryption_key(
        &self,
        alg: KeyManagementAlgorithm,
        _enc: ContentEncryptionAlgorithm,
    ) -> Result<(Zeroizing<Vec<u8>>, WrappedKey)> {
        Err(Error::UnsupportedAlgorithm(alg.to_string()))
    }

    /// Recover the content encryption key from its wrapped form.
    fn unwrap_key(
        &self,
        alg: KeyManagementAlgorithm,
        _enc: ContentEncryptionAlgorithm,
        _wrapped: &WrappedKey,
    ) -> Result<Zeroizing<Vec<u8>>> {
        Err(Error::UnsupportedAlgorithm(alg.to_string()))
    }

    /// Trust status of a backing certificate, `None` if the key has none.
    fn certificate_trusted(&self) -> Option<bool> {
        None
    }
}

/// A content encryption key as carried in an encrypted token.
///
/// `iv` and `tag` are only present for the GCM key-wrap algorithms, where
/// they travel in the protected header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WrappedKey {
    pub encrypted_key: Vec<u8>,
    pub iv: Option<Vec<u8>>,
    pub tag: Option<Vec<u8>>,
}

/// Output of content encryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedContent {
    pub iv: Vec<u8>,
    pub ciphertext: Vec<u8>,
    pub tag: Vec<u8>,
}

// ============================================================================
// Symmetric keys
// ============================================================================

/// Shared-secret key for HMAC signatures and AES-GCM key management.
pub struct SymmetricKey {
    key_id: Option<String>,
    secret: SecretVec<u8>,
    certificate_trusted: Option<bool>,
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("key_id", &self.key_id)
            .field("len", &self.secret.expose_secret().len())
            .field("secret", &"***SECRET***")
            .finish()
    }
}

impl SymmetricKey {
    /// Wrap existing secret bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.len() < MIN_SYMMETRIC_KEY_LEN {
            return Err(Error::InvalidKey(format!(
                "symmetric key must be at least {} bytes, got {}",
                MIN_SYMMETRIC_KEY_LEN,
                bytes.len()
            )));
        }
        Ok(Self {
            key_id: None,
            secret: Secret::new(bytes),
            certificate_trusted: None,
        })
    }

    /// Generate `len` random bytes.
    pub fn generate(len: usize) -> Result<Self> {
        let mut bytes = vec![0u8; len];
        OsRng.fill_bytes(&mut bytes);
        Self::new(bytes)
    }

    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    /// Record the trust status of the certificate this secret was provisioned from.
    pub fn with_certificate_trust(mut self, trusted: bool) -> Self {
        self.certificate_trusted = Some(trusted);
        self
    }

    pub fn len(&self) -> usize {
        self.secret.expose_secret().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short SHA-256 fingerprint, safe for logs.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.secret.expose_secret());
        hex::encode(&digest[..8])
    }

    pub fn into_shared(self) -> SharedKey {
        Arc::new(self)
    }
}

impl SecurityKey for SymmetricKey {
    fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    fn supports_signature(&self, alg: SignatureAlgorithm) -> bool {
        alg.is_symmetric() && self.len() >= alg.min_key_len()
    }

    fn sign(&self, alg: SignatureAlgorithm, input: &[u8]) -> Result<Vec<u8>> {
        if !self.supports_signature(alg) {
            return Err(Error::UnsupportedAlgorithm(alg.to_string()));
        }
        hmac_sign(alg, self.secret.expose_secret(), input)
    }

    fn verify(&self, alg: SignatureAlgorithm, input: &[u8], signature: &[u8]) -> bool {
        self.supports_signature(alg) && hmac_verify(alg, self.secret.expose_secret(), input, signature)
    }

    fn supports_key_management(
        &self,
        alg: KeyManagementAlgorithm,
        enc: ContentEncryptionAlgorithm,
    ) -> bool {
        match alg.wrapping_key_len() {
            None => self.len() == enc.key_len(),
            Some(len) => self.len() == len,
        }
    }

    fn content_encryption_key(
        &self,
        alg: KeyManagementAlgorithm,
        enc: ContentEncryptionAlgorithm,
    ) -> Result<(Zeroizing<Vec<u8>>, WrappedKey)> {
        if !self.supports_key_management(alg, enc) {
            return Err(Error::UnsupportedAlgorithm(format!("{}/{}", alg, enc)));
        }
        if alg == KeyManagementAlgorithm::Dir {
            let cek = Zeroizing::new(self.secret.expose_secret().clone());
            return Ok((cek, WrappedKey::default()));
        }

        let mut cek = Zeroizing::new(vec![0u8; enc.key_len()]);
        OsRng.fill_bytes(cek.as_mut_slice());
        let sealed = aes_gcm_seal(self.secret.expose_secret(), &random_iv(), b"", &cek)?;
        let wrapped = WrappedKey {
            encrypted_key: sealed.ciphertext,
            iv: Some(sealed.iv),
            tag: Some(sealed.tag),
        };
        Ok((cek, wrapped))
    }

    fn unwrap_key(
        &self,
        alg: KeyManagementAlgorithm,
        enc: ContentEncryptionAlgorithm,
        wrapped: &WrappedKey,
    ) -> Result<Zeroizing<Vec<u8>>> {
        if !self.supports_key_management(alg, enc) {
            return Err(Error::UnsupportedAlgorithm(format!("{}/{}", alg, enc)));
        }
        if alg == KeyManagementAlgorithm::Dir {
            if !wrapped.encrypted_key.is_empty() {
                return Err(Error::DecryptionFailed(
                    "encrypted key must be empty for dir".into(),
                ));
            }
            return Ok(Zeroizing::new(self.secret.expose_secret().clone()));
        }

        let (iv, tag) = match (&wrapped.iv, &wrapped.tag) {
            (Some(iv), Some(tag)) => (iv, tag),
            _ => {
                return Err(Error::DecryptionFailed(
                    "key wrap requires iv and tag header parameters".into(),
                ))
            }
        };
        let cek = Zeroizing::new(aes_gcm_open(
            self.secret.expose_secret(),
            iv,
            b"",
            &wrapped.encrypted_key,
            tag,
        )?);
        if cek.len() != enc.key_len() {
            return Err(Error::DecryptionFailed(format!(
                "unwrapped key has {} bytes, {} requires {}",
                cek.len(),
                enc,
                enc.key_len()
            )));
        }
        Ok(cek)
    }

    fn certificate_trusted(&self) -> Option<bool> {
        self.certificate_trusted
    }
}

fn hmac_sign(alg: SignatureAlgorithm, key: &[u8], input: &[u8]) -> Result<Vec<u8>> {
    match alg {
        SignatureAlgorithm::HS256 => hmac_tag::<Sha256>(key, input),
        SignatureAlgorithm::HS384 => hmac_tag::<Sha384>(key, input),
        SignatureAlgorithm::HS512 => hmac_tag::<Sha512>(key, input),
        SignatureAlgorithm::EdDSA => Err(Error::UnsupportedAlgorithm(alg.to_string())),
    }
}

fn hmac_verify(alg: SignatureAlgorithm, key: &[u8], input: &[u8], signature: &[u8]) -> bool {
    match alg {
        SignatureAlgorithm::HS256 => hmac_matches::<Sha256>(key, input, signature),
        SignatureAlgorithm::HS384 => hmac_matches::<Sha384>(key, input, signature),
        SignatureAlgorithm::HS512 => hmac_matches::<Sha512>(key, input, signature),
        SignatureAlgorithm::EdDSA => false,
    }
}

fn keyed_mac<D: Digest + BlockSizeUser>(key: &[u8], input: &[u8]) -> Result<SimpleHmac<D>> {
    let mut mac = <SimpleHmac<D> as Mac>::new_from_slice(key)
        .map_err(|e| Error::InvalidKey(e.to_string()))?;
    mac.update(input);
    Ok(mac)
}

fn hmac_tag<D: Digest + BlockSizeUser>(key: &[u8], input: &[u8]) -> Result<Vec<u8>> {
    Ok(keyed_mac::<D>(key, input)?.finalize().into_bytes().to_vec())
}

/// Constant-time comparison against `signature`.
fn hmac_matches<D: Digest + BlockSizeUser>(key: &[u8], input: &[u8], signature: &[u8]) -> bool {
    keyed_mac::<D>(key, input)
        .map(|mac| mac.verify_slice(signature).is_ok())
        .unwrap_or(false)
}

// ============================================================================
// Ed25519 keys
// ============================================================================

/// Ed25519 key pair (or public half only) for `EdDSA`.
#[derive(Clone)]
pub struct Ed25519Key {
    key_id: Option<String>,
    signing_key: Option<Secret<Ed25519SigningKeyWrapper>>,
    verifying_key: VerifyingKey,
    certificate_trusted: Option<bool>,
}

// ed25519-dalek 2.x SigningKey implements ZeroizeOnDrop, so the secrecy
// wrapper only needs a no-op Zeroize.
struct Ed25519SigningKeyWrapper(Ed25519SigningKey);

impl Clone for Ed25519SigningKeyWrapper {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl Zeroize for Ed25519SigningKeyWrapper {
    fn zeroize(&mut self) {}
}

impl CloneableSecret for Ed25519SigningKeyWrapper {}

impl fmt::Debug for Ed25519Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ed25519Key")
            .field("key_id", &self.key_id)
            .field("public_key", &self.fingerprint())
            .field(
                "signing_key",
                &self.signing_key.as_ref().map(|_| "***SECRET***"),
            )
            .finish()
    }
}

impl Ed25519Key {
    /// Generate a new random key pair.
    pub fn generate() -> Self {
        Self::from_signing_key(Ed25519SigningKey::generate(&mut OsRng))
    }

    /// Create a key pair from secret key bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self::from_signing_key(Ed25519SigningKey::from_bytes(bytes))
    }

    /// Create a key pair from a PKCS#8 PEM private key.
    pub fn from_pkcs8_pem(pem: &str) -> Result<Self> {
        let signing_key = Ed25519SigningKey::from_pkcs8_pem(pem)
            .map_err(|e| Error::InvalidKey(format!("invalid PEM: {}", e)))?;
        Ok(Self::from_signing_key(signing_key))
    }

    /// Create a verification-only key from public key bytes.
    pub fn from_public_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let verifying_key =
            VerifyingKey::from_bytes(bytes).map_err(|e| Error::InvalidKey(e.to_string()))?;
        Ok(Self::from_verifying_key(verifying_key))
    }

    /// Create a verification-only key from an SPKI PEM public key.
    pub fn from_public_key_pem(pem: &str) -> Result<Self> {
        let verifying_key = VerifyingKey::from_public_key_pem(pem)
            .map_err(|e| Error::InvalidKey(format!("invalid PEM: {}", e)))?;
        Ok(Self::from_verifying_key(verifying_key))
    }

    fn from_signing_key(signing_key: Ed25519SigningKey) -> Self {
        let verifying_key = signing_key.verifying_key();
        Self {
            key_id: None,
            signing_key: Some(Secret::new(Ed25519SigningKeyWrapper(signing_key))),
            verifying_key,
            certificate_trusted: None,
        }
    }

    fn from_verifying_key(verifying_key: VerifyingKey) -> Self {
        Self {
            key_id: None,
            signing_key: None,
            verifying_key,
            certificate_trusted: None,
        }
    }

    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    pub fn with_certificate_trust(mut self, trusted: bool) -> Self {
        self.certificate_trusted = Some(trusted);
        self
    }

    /// The verification-only half, keeping key id and trust status.
    pub fn to_public(&self) -> Self {
        Self {
            key_id: self.key_id.clone(),
            signing_key: None,
            verifying_key: self.verifying_key,
            certificate_trusted: self.certificate_trusted,
        }
    }

    pub fn can_sign(&self) -> bool {
        self.signing_key.is_some()
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// First 16 hex chars of the public key.
    pub fn fingerprint(&self) -> String {
        hex::encode(&self.public_key_bytes()[..8])
    }

    /// Convert the public key to an SPKI PEM string.
    pub fn public_key_pem(&self) -> Result<String> {
        self.verifying_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| Error::CryptoError(format!("PEM encoding failed: {}", e)))
    }

    pub fn into_shared(self) -> SharedKey {
        Arc::new(self)
    }
}

impl SecurityKey for Ed25519Key {
    fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    fn supports_signature(&self, alg: SignatureAlgorithm) -> bool {
        alg == SignatureAlgorithm::EdDSA
    }

    fn sign(&self, alg: SignatureAlgorithm, input: &[u8]) -> Result<Vec<u8>> {
        if alg != SignatureAlgorithm::EdDSA {
            return Err(Error::UnsupportedAlgorithm(alg.to_string()));
        }
        let signing_key = self
            .signing_key
            .as_ref()
            .ok_or_else(|| Error::InvalidKey("public-only key cannot sign".into()))?;
        Ok(signing_key.expose_secret().0.sign(input).to_bytes().to_vec())
    }

    fn verify(&self, alg: SignatureAlgorithm, input: &[u8], signature: &[u8]) -> bool {
        if alg != SignatureAlgorithm::EdDSA {
            return false;
        }
        match DalekSignature::from_slice(signature) {
            Ok(sig) => self.verifying_key.verify_strict(input, &sig).is_ok(),
            Err(_) => false,
        }
    }

    fn certificate_trusted(&self) -> Option<bool> {
        self.certificate_trusted
    }
}

// ============================================================================
// Credentials
// ============================================================================

/// Key plus signature algorithm used at issuance.
#[derive(Debug, Clone)]
pub struct SigningCredentials {
    pub key: SharedKey,
    pub algorithm: SignatureAlgorithm,
}

impl SigningCredentials {
    pub fn new(key: SharedKey, algorithm: SignatureAlgorithm) -> Self {
        Self { key, algorithm }
    }

    pub fn key_id(&self) -> Option<&str> {
        self.key.key_id()
    }
}

/// Key plus key-management and content-encryption algorithms used at issuance.
#[derive(Debug, Clone)]
pub struct EncryptingCredentials {
    pub key: SharedKey,
    pub algorithm: KeyManagementAlgorithm,
    pub encryption: ContentEncryptionAlgorithm,
}

impl EncryptingCredentials {
    pub fn new(
        key: SharedKey,
        algorithm: KeyManagementAlgorithm,
        encryption: ContentEncryptionAlgorithm,
    ) -> Self {
        Self {
            key,
            algorithm,
            encryption,
        }
    }

    pub fn key_id(&self) -> Option<&str> {
        self.key.key_id()
    }
}

// ============================================================================
// Content encryption
// ============================================================================

/// Encrypt `plaintext` under `cek` with a fresh random IV.
pub fn encrypt_content(
    enc: ContentEncryptionAlgorithm,
    cek: &[u8],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<EncryptedContent> {
    if cek.len() != enc.key_len() {
        return Err(Error::InvalidKey(format!(
            "{} requires a {} byte key",
            enc,
            enc.key_len()
        )));
    }
    aes_gcm_seal(cek, &random_iv(), aad, plaintext)
}

/// Decrypt and authenticate content. Any failure is `DecryptionFailed`.
pub fn decrypt_content(
    enc: ContentEncryptionAlgorithm,
    cek: &[u8],
    iv: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
) -> Result<Vec<u8>> {
    if cek.len() != enc.key_len() {
        return Err(Error::DecryptionFailed(format!(
            "{} requires a {} byte key",
            enc,
            enc.key_len()
        )));
    }
    aes_gcm_open(cek, iv, aad, ciphertext, tag)
}

fn random_iv() -> [u8; GCM_IV_LEN] {
    let mut iv = [0u8; GCM_IV_LEN];
    OsRng.fill_bytes(&mut iv);
    iv
}

fn aes_gcm_seal(key: &[u8], iv: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<EncryptedContent> {
    use aes_gcm::aead::{generic_array::GenericArray, Aead, KeyInit, Payload};
    use aes_gcm::{Aes128Gcm, Aes256Gcm};

    if iv.len() != GCM_IV_LEN {
        return Err(Error::CryptoError("AES-GCM nonce must be 12 bytes".into()));
    }
    let nonce = GenericArray::from_slice(iv);
    let payload = Payload {
        msg: plaintext,
        aad,
    };
    let sealed = match key.len() {
        16 => Aes128Gcm::new_from_slice(key)
            .map_err(|e| Error::InvalidKey(e.to_string()))?
            .encrypt(nonce, payload),
        32 => Aes256Gcm::new_from_slice(key)
            .map_err(|e| Error::InvalidKey(e.to_string()))?
            .encrypt(nonce, payload),
        n => {
            return Err(Error::InvalidKey(format!(
                "AES-GCM key must be 16 or 32 bytes, got {}",
                n
            )))
        }
    }
    .map_err(|_| Error::CryptoError("AES-GCM encryption failed".into()))?;

    let (ciphertext, tag) = sealed.split_at(sealed.len() - GCM_TAG_LEN);
    Ok(EncryptedContent {
        iv: iv.to_vec(),
        ciphertext: ciphertext.to_vec(),
        tag: tag.to_vec(),
    })
}

fn aes_gcm_open(key: &[u8], iv: &[u8], aad: &[u8], ciphertext: &[u8], tag: &[u8]) -> Result<Vec<u8>> {
    use aes_gcm::aead::{generic_array::GenericArray, Aead, KeyInit, Payload};
    use aes_gcm::{Aes128Gcm, Aes256Gcm};

    if iv.len() != GCM_IV_LEN || tag.len() != GCM_TAG_LEN {
        return Err(Error::DecryptionFailed("invalid AES-GCM nonce or tag length".into()));
    }
    let nonce = GenericArray::from_slice(iv);
    let mut sealed = Vec::with_capacity(ciphertext.len() + tag.len());
    sealed.extend_from_slice(ciphertext);
    sealed.extend_from_slice(tag);
    let payload = Payload {
        msg: sealed.as_slice(),
        aad,
    };
    match key.len() {
        16 => Aes128Gcm::new_from_slice(key)
            .map_err(|_| Error::DecryptionFailed("invalid key length".into()))?
            .decrypt(nonce, payload)
            .map_err(|_| Error::DecryptionFailed("authentication failed".into())),
        32 => Aes256Gcm::new_from_slice(key)
            .map_err(|_| Error::DecryptionFailed("invalid key length".into()))?
            .decrypt(nonce, payload)
            .map_err(|_| Error::DecryptionFailed("authentication failed".into())),
        _ => Err(Error::DecryptionFailed("invalid key length".into())),
    }
}

/// Hex SHA-256 of token text. Used as the replay-cache key and, truncated,
/// in log fields.
pub fn token_digest(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key32() -> SymmetricKey {
        SymmetricKey::new([7u8; 32].to_vec()).unwrap()
    }

    #[test]
    fn test_hmac_sign_and_verify() {
        let key = key32();
        let sig = key.sign(SignatureAlgorithm::HS256, b"header.payload").unwrap();
        assert_eq!(sig.len(), 32);
        assert!(key.verify(SignatureAlgorithm::HS256, b"header.payload", &sig));
        assert!(!key.verify(SignatureAlgorithm::HS256, b"header.payloaD", &sig));
    }

    #[test]
    fn test_hmac_is_deterministic() {
        let key = key32();
        let a = key.sign(SignatureAlgorithm::HS256, b"abc").unwrap();
        let b = key.sign(SignatureAlgorithm::HS256, b"abc").unwrap();
        assert_eq!(a, b);
    }

    // RFC 4231, test case 2.
    #[test]
    fn test_hmac_known_answers() {
        let (key, data) = (b"Jefe", b"what do ya want for nothing?");
        let vectors = [
            (
                SignatureAlgorithm::HS256,
                "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843",
            ),
            (
                SignatureAlgorithm::HS384,
                "af45d2e376484031617f78d2b58a6b1b9c7ef464f5a01b47e42ec3736322445e8e2240ca5e69e2c78b3239ecfab21649",
            ),
            (
                SignatureAlgorithm::HS512,
                "164b7a7bfcf819e2e395fbe73b56e0a387bd64222e831fd610270cd7ea2505549758bf75c05a994a6d034f65f8f0e6fdcaeab1a34d4a6b4b636e070a38bce737",
            ),
        ];
        for (alg, expected) in vectors {
            let tag = hmac_sign(alg, key, data).unwrap();
            assert_eq!(hex::encode(&tag), expected, "{}", alg);
            assert!(hmac_verify(alg, key, data, &tag));
            assert!(!hmac_verify(alg, key, data, &tag[..tag.len() - 1]));
        }
        assert!(hmac_sign(SignatureAlgorithm::EdDSA, key, data).is_err());
        assert!(!hmac_verify(SignatureAlgorithm::EdDSA, key, data, &[]));
    }

    #[test]
    fn test_hmac_key_too_short_for_algorithm() {
        let key = key32();
        assert!(!key.supports_signature(SignatureAlgorithm::HS512));
        let err = key.sign(SignatureAlgorithm::HS512, b"abc").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::UnsupportedAlgorithm);

        let long = SymmetricKey::new(vec![1u8; 64]).unwrap();
        assert!(long.supports_signature(SignatureAlgorithm::HS512));
        assert_eq!(long.sign(SignatureAlgorithm::HS512, b"abc").unwrap().len(), 64);
    }

    #[test]
    fn test_symmetric_key_rejects_short_secret() {
        assert!(SymmetricKey::new(vec![0u8; 8]).is_err());
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = key32().with_key_id("k1");
        let debug = format!("{:?}", key);
        assert!(debug.contains("***SECRET***"));
        assert!(!debug.contains("7, 7"));

        let ed = Ed25519Key::from_bytes(&[9u8; 32]);
        assert!(format!("{:?}", ed).contains("***SECRET***"));
    }

    #[test]
    fn test_ed25519_sign_and_verify() {
        let key = Ed25519Key::generate().with_key_id("ed-1");
        let sig = key.sign(SignatureAlgorithm::EdDSA, b"message").unwrap();
        assert_eq!(sig.len(), 64);

        let public = key.to_public();
        assert!(!public.can_sign());
        assert_eq!(public.key_id(), Some("ed-1"));
        assert!(public.verify(SignatureAlgorithm::EdDSA, b"message", &sig));
        assert!(!public.verify(SignatureAlgorithm::EdDSA, b"other", &sig));
        assert!(!public.verify(SignatureAlgorithm::HS256, b"message", &sig));
        assert!(public.sign(SignatureAlgorithm::EdDSA, b"message").is_err());
    }

    #[test]
    fn test_ed25519_pem_roundtrip() {
        let key = Ed25519Key::generate();
        let pem = key.public_key_pem().unwrap();
        let restored = Ed25519Key::from_public_key_pem(&pem).unwrap();
        assert_eq!(key.public_key_bytes(), restored.public_key_bytes());
    }

    #[test]
    fn test_ed25519_rejects_garbage_signature() {
        let key = Ed25519Key::generate();
        assert!(!key.verify(SignatureAlgorithm::EdDSA, b"m", &[0u8; 10]));
    }

    #[test]
    fn test_content_encryption() {
        let cek = [3u8; 32];
        let sealed =
            encrypt_content(ContentEncryptionAlgorithm::A256Gcm, &cek, b"aad", b"secret").unwrap();
        assert_eq!(sealed.iv.len(), GCM_IV_LEN);
        assert_eq!(sealed.tag.len(), GCM_TAG_LEN);
        let opened = decrypt_content(
            ContentEncryptionAlgorithm::A256Gcm,
            &cek,
            &sealed.iv,
            b"aad",
            &sealed.ciphertext,
            &sealed.tag,
        )
        .unwrap();
        assert_eq!(opened, b"secret");

        let tampered_aad = decrypt_content(
            ContentEncryptionAlgorithm::A256Gcm,
            &cek,
            &sealed.iv,
            b"other",
            &sealed.ciphertext,
            &sealed.tag,
        );
        assert!(matches!(tampered_aad, Err(Error::DecryptionFailed(_))));
    }

    #[test]
    fn test_gcm_key_wrap() {
        let kek = SymmetricKey::new(vec![5u8; 16]).unwrap();
        let (alg, enc) = (
            KeyManagementAlgorithm::A128GcmKw,
            ContentEncryptionAlgorithm::A256Gcm,
        );
        assert!(kek.supports_key_management(alg, enc));
        let (cek, wrapped) = kek.content_encryption_key(alg, enc).unwrap();
        assert_eq!(cek.len(), 32);
        assert_ne!(wrapped.encrypted_key, *cek);

        let unwrapped = kek.unwrap_key(alg, enc, &wrapped).unwrap();
        assert_eq!(*unwrapped, *cek);

        let other = SymmetricKey::new(vec![6u8; 16]).unwrap();
        assert!(other.unwrap_key(alg, enc, &wrapped).is_err());
    }

    #[test]
    fn test_dir_key_management() {
        let key = SymmetricKey::new(vec![8u8; 16]).unwrap();
        let (alg, enc) = (KeyManagementAlgorithm::Dir, ContentEncryptionAlgorithm::A128Gcm);
        assert!(key.supports_key_management(alg, enc));
        assert!(!key.supports_key_management(alg, ContentEncryptionAlgorithm::A256Gcm));

        let (cek, wrapped) = key.content_encryption_key(alg, enc).unwrap();
        assert!(wrapped.encrypted_key.is_empty());
        assert_eq!(*key.unwrap_key(alg, enc, &wrapped).unwrap(), *cek);
    }

    #[test]
    fn test_ed25519_has_no_key_management() {
        let key = Ed25519Key::generate();
        assert!(!key.supports_key_management(
            KeyManagementAlgorithm::Dir,
            ContentEncryptionAlgorithm::A256Gcm
        ));
        assert!(key
            .content_encryption_key(KeyManagementAlgorithm::Dir, ContentEncryptionAlgorithm::A256Gcm)
            .is_err());
    }

    #[test]
    fn test_token_digest_is_stable() {
        assert_eq!(token_digest("abc"), token_digest("abc"));
        assert_ne!(token_digest("abc"), token_digest("abd"));
        assert_eq!(token_digest("abc").len(), 64);
    }
}
