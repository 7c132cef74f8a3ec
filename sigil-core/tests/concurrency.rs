//! One policy and one handler shared by many threads.

use chrono::{DateTime, Duration};
use sigil::{
    Claims, ContentEncryptionAlgorithm, Ed25519Key, EncryptingCredentials, ErrorKind, FixedClock,
    InMemoryReplayCache, KeyManagementAlgorithm, SignatureAlgorithm, SigningCredentials,
    SymmetricKey, TokenHandler, TrustPolicy,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

const NOW: i64 = 1_700_000_000;
const THREADS: usize = 200;
const CALLERS: usize = 1000;

fn handler() -> TokenHandler {
    TokenHandler::builder()
        .clock(Arc::new(FixedClock::at_unix(NOW)))
        .build()
        .unwrap()
}

fn claims(subject: &str) -> Claims {
    let now = DateTime::from_timestamp(NOW, 0).unwrap();
    Claims::new()
        .with_issuer("https://issuer")
        .with_audience("api")
        .with_subject(subject)
        .with_jwt_id(subject)
        .with_expiration(now + Duration::minutes(5))
}

#[test]
fn shared_policy_issue_and_validate() {
    let key = SymmetricKey::generate(32).unwrap().into_shared();
    let policy = TrustPolicy::new()
        .with_valid_issuer("https://issuer")
        .with_valid_audience("api")
        .with_signing_key(key.clone())
        .with_token_replay_cache(Arc::new(InMemoryReplayCache::new()));
    let handler = handler();
    let credentials = SigningCredentials::new(key, SignatureAlgorithm::HS256);

    thread::scope(|scope| {
        for i in 0..THREADS {
            let (handler, policy, credentials) = (&handler, &policy, &credentials);
            scope.spawn(move || {
                let subject = format!("user-{}", i);
                let token = handler.issue(&claims(&subject), credentials, None).unwrap();

                let first = handler.validate(&token, policy);
                assert!(first.is_valid(), "{:?}", first.failure_reason());
                assert!(first.claims().unwrap().has_claim("sub", &subject));

                let second = handler.validate(&token, policy);
                assert_eq!(second.failure_kind(), Some(ErrorKind::TokenReplayDetected));
            });
        }
    });
}

#[test]
fn replayed_token_is_accepted_exactly_once() {
    let key = SymmetricKey::generate(32).unwrap().into_shared();
    let policy = TrustPolicy::new()
        .with_valid_issuer("https://issuer")
        .with_valid_audience("api")
        .with_signing_key(key.clone())
        .with_token_replay_cache(Arc::new(InMemoryReplayCache::new()));
    let handler = handler();
    let token = handler
        .issue(
            &claims("shared"),
            &SigningCredentials::new(key, SignatureAlgorithm::HS256),
            None,
        )
        .unwrap();

    let accepted = AtomicUsize::new(0);
    let replayed = AtomicUsize::new(0);
    thread::scope(|scope| {
        for _ in 0..THREADS {
            scope.spawn(|| {
                let result = handler.validate(&token, &policy);
                if result.is_valid() {
                    accepted.fetch_add(1, Ordering::SeqCst);
                } else if result.failure_kind() == Some(ErrorKind::TokenReplayDetected) {
                    replayed.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
    });

    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    assert_eq!(replayed.load(Ordering::SeqCst), THREADS - 1);
}

#[test]
fn branched_policies_do_not_interfere() {
    let key = SymmetricKey::generate(32).unwrap().into_shared();
    let base = TrustPolicy::new()
        .with_valid_issuer("https://issuer")
        .with_signing_key(key.clone());
    let handler = handler();
    let credentials = SigningCredentials::new(key, SignatureAlgorithm::HS256);

    thread::scope(|scope| {
        for i in 0..THREADS {
            let (base, handler, credentials) = (&base, &handler, &credentials);
            scope.spawn(move || {
                let audience = format!("api-{}", i);
                let policy = base.clone().with_valid_audience(audience.clone());
                let token = handler
                    .issue(
                        &claims("alice").with_audience(audience),
                        credentials,
                        None,
                    )
                    .unwrap();
                assert!(handler.validate(&token, &policy).is_valid());
                assert!(!handler.validate(&token, base).is_valid());
            });
        }
    });

    assert!(base.valid_audience().is_none());
}

#[test]
fn mixed_signed_and_encrypted_callers() {
    let signer = Ed25519Key::generate().with_key_id("ed");
    let dir = SymmetricKey::generate(32).unwrap().with_key_id("dir").into_shared();
    let wrap = SymmetricKey::generate(32).unwrap().with_key_id("kw").into_shared();
    let policy = TrustPolicy::new()
        .with_valid_issuer("https://issuer")
        .with_valid_audience("api")
        .with_signing_key(signer.to_public().into_shared())
        .with_token_decryption_keys([dir.clone(), wrap.clone()])
        .with_token_replay_cache(Arc::new(InMemoryReplayCache::new()));
    let handler = handler();
    let credentials = SigningCredentials::new(signer.into_shared(), SignatureAlgorithm::EdDSA);
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

    let accepted = AtomicUsize::new(0);
    thread::scope(|scope| {
        for i in 0..CALLERS {
            let (handler, policy, credentials) = (&handler, &policy, &credentials);
            let (encrypting, accepted) = (&encrypting[i % encrypting.len()], &accepted);
            scope.spawn(move || {
                let subject = format!("caller-{}", i);
                let token = handler
                    .issue(&claims(&subject), credentials, encrypting.as_ref())
                    .unwrap();

                let result = handler.validate(&token, policy);
                assert!(result.is_valid(), "{}: {:?}", subject, result.failure_reason());
                let validated = result.validated_token().unwrap();
                assert_eq!(validated.is_encrypted(), encrypting.is_some());
                assert_eq!(validated.signing_key_id(), Some("ed"));
                assert!(result.claims().unwrap().has_claim("sub", &subject));
                accepted.fetch_add(1, Ordering::SeqCst);

                assert_eq!(
                    handler.validate(&token, policy).failure_kind(),
                    Some(ErrorKind::TokenReplayDetected)
                );
            });
        }
    });

    assert_eq!(accepted.load(Ordering::SeqCst), CALLERS);
}
