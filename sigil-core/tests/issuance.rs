//! Issuance paths: signing algorithms, encryption, and what validation
//! makes of the result.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use sigil::{
    AuditEventType, Claims, ContentEncryptionAlgorithm, Ed25519Key, EncryptingCredentials,
    ErrorKind, FixedClock, KeyManagementAlgorithm, MemoryLogger, SharedKey, SignatureAlgorithm,
    SigningCredentials, SymmetricKey, TokenBuilder, TokenHandler, TrustPolicy,
};
use std::sync::Arc;

const NOW: i64 = 1_700_000_000;

fn now() -> DateTime<Utc> {
    DateTime::from_timestamp(NOW, 0).unwrap()
}

fn handler() -> TokenHandler {
    TokenHandler::builder()
        .clock(Arc::new(FixedClock::at_unix(NOW)))
        .build()
        .unwrap()
}

fn claims() -> Claims {
    Claims::new()
        .with_issuer("https://issuer")
        .with_audience("api")
        .with_subject("alice")
        .with_expiration(now() + Duration::minutes(5))
}

fn policy() -> TrustPolicy {
    TrustPolicy::new()
        .with_valid_issuer("https://issuer")
        .with_valid_audience("api")
}

#[test]
fn hmac_variants_round_trip() {
    for (alg, len) in [
        (SignatureAlgorithm::HS256, 32),
        (SignatureAlgorithm::HS384, 48),
        (SignatureAlgorithm::HS512, 64),
    ] {
        let key = SymmetricKey::generate(len).unwrap().into_shared();
        let token = handler()
            .issue(&claims(), &SigningCredentials::new(key.clone(), alg), None)
            .unwrap();

        let result = handler().validate(&token, &policy().with_signing_key(key));
        assert!(result.is_valid(), "{}: {:?}", alg, result.failure_reason());
        assert_eq!(result.validated_token().unwrap().header().alg, alg.as_str());
    }
}

#[test]
fn short_hmac_key_cannot_sign() {
    let key = SymmetricKey::new(vec![1u8; 32]).unwrap().into_shared();
    let err = handler()
        .issue(
            &claims(),
            &SigningCredentials::new(key, SignatureAlgorithm::HS512),
            None,
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedAlgorithm);
}

#[test]
fn eddsa_round_trip_with_public_key() {
    let signer = Ed25519Key::generate().with_key_id("ed-1");
    let verifier = signer.to_public().into_shared();
    assert!(!signer.to_public().can_sign());

    let token = handler()
        .issue(
            &claims(),
            &SigningCredentials::new(signer.into_shared(), SignatureAlgorithm::EdDSA),
            None,
        )
        .unwrap();

    let result = handler().validate(&token, &policy().with_signing_key(verifier));
    assert!(result.is_valid(), "{:?}", result.failure_reason());
    assert_eq!(
        result.validated_token().unwrap().signing_key_id(),
        Some("ed-1")
    );
}

#[test]
fn public_key_cannot_issue() {
    let public = Ed25519Key::generate().to_public().into_shared();
    let err = handler()
        .issue(
            &claims(),
            &SigningCredentials::new(public, SignatureAlgorithm::EdDSA),
            None,
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidSigningKey);
}

#[test]
fn encrypted_round_trip() {
    let signing = SymmetricKey::generate(32).unwrap().into_shared();
    for (alg, enc, len) in [
        (
            KeyManagementAlgorithm::Dir,
            ContentEncryptionAlgorithm::A256Gcm,
            32,
        ),
        (
            KeyManagementAlgorithm::Dir,
            ContentEncryptionAlgorithm::A128Gcm,
            16,
        ),
        (
            KeyManagementAlgorithm::A256GcmKw,
            ContentEncryptionAlgorithm::A256Gcm,
            32,
        ),
        (
            KeyManagementAlgorithm::A128GcmKw,
            ContentEncryptionAlgorithm::A128Gcm,
            16,
        ),
    ] {
        let encryption = SymmetricKey::generate(len)
            .unwrap()
            .with_key_id("enc")
            .into_shared();
        let token = handler()
            .issue(
                &claims(),
                &SigningCredentials::new(signing.clone(), SignatureAlgorithm::HS256),
                Some(&EncryptingCredentials::new(encryption.clone(), alg, enc)),
            )
            .unwrap();
        assert_eq!(token.split('.').count(), 5);

        let policy = policy()
            .with_signing_key(signing.clone())
            .with_token_decryption_key(encryption);
        let result = handler().validate(&token, &policy);
        assert!(result.is_valid(), "{}/{}: {:?}", alg, enc, result.failure_reason());

        let validated = result.validated_token().unwrap();
        assert!(validated.is_encrypted());
        assert_eq!(validated.raw_data(), token);
        assert_eq!(validated.signed_raw().split('.').count(), 3);
        assert!(result.claims().unwrap().has_claim("sub", "alice"));
    }
}

#[test]
fn validated_claims_match_issued_claims() {
    let claims = Claims::new()
        .with_issuer("https://issuer")
        .with_audiences(["api", "api://other"])
        .with_subject("alice")
        .with_issued_at(now())
        .with_expiration(now() + Duration::minutes(5))
        .with_claim("tenant", serde_json::json!({ "id": 42, "region": "eu", "tags": ["a", "b"] }))
        .with_claim("weight", 0.25)
        .with_claim("attempts", 3);

    let signing = SymmetricKey::generate(32).unwrap().into_shared();
    let credentials = SigningCredentials::new(signing.clone(), SignatureAlgorithm::HS256);
    let dir = SymmetricKey::generate(32).unwrap().into_shared();
    let wrap = SymmetricKey::generate(32).unwrap().into_shared();
    let policy = policy()
        .with_signing_key(signing)
        .with_token_decryption_keys([dir.clone(), wrap.clone()]);

    let encrypting = [
        None,
        Some(EncryptingCredentials::new(
            dir,
            KeyManagementAlgorithm::Dir,
            ContentEncryptionAlgorithm::A256Gcm,
        )),
        Some(EncryptingCredentials::new(
            wrap,
            KeyManagementAlgorithm::A256GcmKw,
            ContentEncryptionAlgorithm::A256Gcm,
        )),
    ];
    for encrypting in &encrypting {
        let token = handler()
            .issue(&claims, &credentials, encrypting.as_ref())
            .unwrap();
        let result = handler().validate(&token, &policy);
        assert!(result.is_valid(), "{:?}", result.failure_reason());

        let validated = result.validated_token().unwrap();
        assert_eq!(validated.is_encrypted(), encrypting.is_some());
        assert_eq!(validated.claims(), &claims);
    }
}

#[test]
fn encrypted_token_needs_decryption_key() {
    let signing = SymmetricKey::generate(32).unwrap().into_shared();
    let encryption: SharedKey = SymmetricKey::generate(32).unwrap().into_shared();
    let token = handler()
        .issue(
            &claims(),
            &SigningCredentials::new(signing.clone(), SignatureAlgorithm::HS256),
            Some(&EncryptingCredentials::new(
                encryption,
                KeyManagementAlgorithm::Dir,
                ContentEncryptionAlgorithm::A256Gcm,
            )),
        )
        .unwrap();

    let no_keys = policy().with_signing_key(signing.clone());
    assert_eq!(
        handler().validate(&token, &no_keys).failure_kind(),
        Some(ErrorKind::DecryptionFailed)
    );

    let wrong = policy()
        .with_signing_key(signing)
        .with_token_decryption_key(SymmetricKey::generate(32).unwrap().into_shared());
    assert_eq!(
        handler().validate(&token, &wrong).failure_kind(),
        Some(ErrorKind::DecryptionFailed)
    );
}

#[test]
fn tampered_ciphertext_fails_decryption() {
    let signing = SymmetricKey::generate(32).unwrap().into_shared();
    let encryption = SymmetricKey::generate(32).unwrap().into_shared();
    let token = handler()
        .issue(
            &claims(),
            &SigningCredentials::new(signing.clone(), SignatureAlgorithm::HS256),
            Some(&EncryptingCredentials::new(
                encryption.clone(),
                KeyManagementAlgorithm::A256GcmKw,
                ContentEncryptionAlgorithm::A256Gcm,
            )),
        )
        .unwrap();

    let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
    let mut ciphertext = URL_SAFE_NO_PAD.decode(&parts[3]).unwrap();
    ciphertext[0] ^= 0x01;
    parts[3] = sigil::wire::encode_segment(&ciphertext);
    let tampered = parts.join(".");

    let policy = policy()
        .with_signing_key(signing)
        .with_token_decryption_key(encryption);
    assert_eq!(
        handler().validate(&tampered, &policy).failure_kind(),
        Some(ErrorKind::DecryptionFailed)
    );
}

#[test]
fn builder_issues_through_the_same_path() {
    let key = SymmetricKey::generate(32).unwrap().into_shared();
    let token = TokenBuilder::new()
        .issuer("https://issuer")
        .audiences(["api", "api://other"])
        .subject("alice")
        .jwt_id("4c2b")
        .claim("scope", "orders:read")
        .issued_at(now())
        .not_before(now())
        .expires(now() + Duration::minutes(5))
        .signing_credentials(SigningCredentials::new(key.clone(), SignatureAlgorithm::HS256))
        .build()
        .unwrap();

    let identity = handler()
        .validate(&token, &policy().with_signing_key(key))
        .into_result()
        .unwrap();
    assert!(identity.has_claim("scope", "orders:read"));
    assert!(identity.has_claim("jti", "4c2b"));
    assert_eq!(identity.find_all("aud").count(), 2);
}

#[test]
fn issuance_is_audited() {
    let logger = Arc::new(MemoryLogger::new());
    let handler = TokenHandler::builder()
        .clock(Arc::new(FixedClock::at_unix(NOW)))
        .audit_logger(logger.clone())
        .build()
        .unwrap();
    let key = SymmetricKey::generate(32)
        .unwrap()
        .with_key_id("k9")
        .into_shared();

    handler
        .issue(
            &claims(),
            &SigningCredentials::new(key, SignatureAlgorithm::HS256),
            None,
        )
        .unwrap();

    let events = logger.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, AuditEventType::TokenIssued);
    assert_eq!(events[0].key_id.as_deref(), Some("k9"));
    assert_eq!(events[0].issuer.as_deref(), Some("https://issuer"));
    assert_eq!(events[0].timestamp, now());
}
