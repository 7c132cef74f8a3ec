//! Candidate key resolution.
//!
//! Signing keys come from three sources, concatenated in a fixed order:
//!
//! 1. `signing_key`
//! 2. `signing_keys`, in the order given
//! 3. whatever `signing_key_retriever(key_hint)` returns
//!
//! Static keys come first; the retriever is a fallback for rollover. The key
//! hint is passed to the retriever but never used to filter or reorder
//! static keys, so a token with a stale `kid` still verifies against a
//! rotated static key. An empty list is not an error here.

use crate::crypto::SharedKey;
use crate::error::{Error, Result};
use crate::policy::TrustPolicy;
use tracing::debug;

/// Ordered signature-verification candidates for `key_hint`.
///
/// Retriever failures propagate as `KeyRetrieval`; they are never reported
/// as an empty list.
pub fn resolve_signing_keys(key_hint: Option<&str>, policy: &TrustPolicy) -> Result<Vec<SharedKey>> {
    let mut keys: Vec<SharedKey> = policy
        .signing_key()
        .into_iter()
        .chain(policy.signing_keys())
        .cloned()
        .collect();

    if let Some(retriever) = policy.signing_key_retriever() {
        let retrieved = retriever(key_hint).map_err(|e| match e {
            Error::KeyRetrieval(_) => e,
            other => Error::KeyRetrieval(other.to_string()),
        })?;
        debug!(
            kid = key_hint.unwrap_or("-"),
            static_keys = keys.len(),
            retrieved = retrieved.len(),
            "resolved signing keys"
        );
        keys.extend(retrieved);
    }

    Ok(keys)
}

/// Ordered decryption candidates: `token_decryption_key`, then
/// `token_decryption_keys`.
pub fn resolve_decryption_keys(_key_hint: Option<&str>, policy: &TrustPolicy) -> Vec<SharedKey> {
    policy
        .token_decryption_key()
        .into_iter()
        .chain(policy.token_decryption_keys())
        .cloned()
        .collect()
}
