//! Claim validators.
//!
//! Each validator is a pure function of the token, the policy and the
//! current time, except replay detection, which records first use in the
//! policy's replay cache. They run in the order of [`ValidatorStage::ORDER`].

use crate::error::{Error, Result};
use crate::identity::ClaimsIdentity;
use crate::policy::{Lifetime, TrustPolicy};
use crate::token::JsonWebToken;
use chrono::{DateTime, Utc};

/// Inputs shared by every validator.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    pub token: &'a JsonWebToken,
    pub policy: &'a TrustPolicy,
    pub now: DateTime<Utc>,
}

/// A claim validation stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidatorStage {
    Lifetime,
    Issuer,
    Audience,
    Actor,
    Replay,
}

impl ValidatorStage {
    /// Execution order.
    pub const ORDER: [ValidatorStage; 5] = [
        ValidatorStage::Lifetime,
        ValidatorStage::Issuer,
        ValidatorStage::Audience,
        ValidatorStage::Actor,
        ValidatorStage::Replay,
    ];
}

/// `exp` / `nbf` against the current time, widened by the clock skew.
///
/// A custom lifetime validator replaces this check.
pub fn validate_lifetime(ctx: &ValidationContext<'_>) -> Result<()> {
    let claims = ctx.token.claims();
    let lifetime = Lifetime {
        issued_at: claims.issued_at(),
        not_before: claims.not_before(),
        expires: claims.expires(),
    };

    if let Some(custom) = ctx.policy.lifetime_validator().custom() {
        return if custom(&lifetime, ctx.token) {
            Ok(())
        } else {
            Err(Error::LifetimeRejected)
        };
    }

    let skew = ctx.policy.clock_skew();
    let skew_overflow = || {
        Error::InvalidConfiguration(format!(
            "clock skew of {}s overflows the current time",
            skew.num_seconds()
        ))
    };
    if lifetime.expires.is_none() && ctx.policy.require_expiration_time() {
        return Err(Error::MissingExpiration);
    }
    if let (Some(not_before), Some(expires)) = (lifetime.not_before, lifetime.expires) {
        if not_before > expires {
            return Err(Error::InvalidLifetime {
                not_before,
                expires,
            });
        }
    }
    if let Some(expires) = lifetime.expires {
        let latest = ctx.now.checked_sub_signed(skew).ok_or_else(skew_overflow)?;
        if latest >= expires {
            return Err(Error::TokenExpired {
                expired_at: expires,
                now: ctx.now,
            });
        }
    }
    if let Some(not_before) = lifetime.not_before {
        let earliest = ctx.now.checked_add_signed(skew).ok_or_else(skew_overflow)?;
        if earliest < not_before {
            return Err(Error::TokenNotYetValid {
                not_before,
                now: ctx.now,
            });
        }
    }
    Ok(())
}

/// Token issuer against the accepted set, or the custom issuer validator.
///
/// Skipped entirely (custom validator included) when `validate_issuer` is
/// off. An empty accepted set with no custom validator never passes.
pub fn validate_issuer(ctx: &ValidationContext<'_>) -> Result<()> {
    if !ctx.policy.validate_issuer() {
        return Ok(());
    }
    let issuer = ctx.token.issuer();
    let rejected = |reason: &str| Error::IssuerNotValidated {
        issuer: issuer.map(str::to_string),
        reason: reason.to_string(),
    };

    if let Some(custom) = ctx.policy.issuer_validator().custom() {
        return if custom(issuer, ctx.token) {
            Ok(())
        } else {
            Err(rejected("rejected by custom issuer validator"))
        };
    }

    let accepted = ctx.policy.accepted_issuers();
    if accepted.is_empty() {
        return Err(rejected("no valid issuers configured"));
    }
    match issuer {
        None => Err(rejected("token has no issuer")),
        Some(iss) if accepted.contains(iss) => Ok(()),
        Some(_) => Err(rejected("issuer is not accepted")),
    }
}

/// Token audiences against the accepted set, or the custom audience
/// validator. Passes when at least one token audience is accepted.
///
/// Gated by `validate_audience` the same way issuer validation is.
pub fn validate_audience(ctx: &ValidationContext<'_>) -> Result<()> {
    if !ctx.policy.validate_audience() {
        return Ok(());
    }
    let audiences = ctx.token.audiences();

    if let Some(custom) = ctx.policy.audience_validator().custom() {
        return if custom(&audiences, ctx.token) {
            Ok(())
        } else {
            Err(Error::AudienceNotValidated {
                audiences,
                reason: "rejected by custom audience validator".into(),
            })
        };
    }

    let accepted = ctx.policy.accepted_audiences();
    let reason = if accepted.is_empty() {
        "no valid audiences configured"
    } else if audiences.is_empty() {
        "token has no audience"
    } else if audiences.iter().any(|aud| accepted.contains(aud)) {
        return Ok(());
    } else {
        "no audience is accepted"
    };
    Err(Error::AudienceNotValidated {
        audiences,
        reason: reason.into(),
    })
}

/// Validate the embedded actor token, one level deep.
///
/// `validate_nested` runs the full pipeline on the actor token text with the
/// policy it is given. That policy has actor validation and replay
/// detection disabled, so nesting stops here.
pub fn validate_actor<F>(ctx: &ValidationContext<'_>, validate_nested: F) -> Result<Option<ClaimsIdentity>>
where
    F: FnOnce(&str, &TrustPolicy) -> Result<ClaimsIdentity>,
{
    if !ctx.policy.validate_actor() {
        return Ok(None);
    }
    let Some(actor_token) = ctx.token.claims().actor_token() else {
        return Ok(None);
    };
    let actor_policy = ctx.policy.for_actor();
    validate_nested(actor_token, &actor_policy)
        .map(Some)
        .map_err(|e| Error::ActorValidationFailed(Box::new(e)))
}

/// Reject tokens already seen by the replay cache.
///
/// With `record` set the token is atomically checked and recorded; without
/// it the cache is only queried. Callers pass `record = false` when an
/// earlier check failed, so rejected tokens are never marked as used.
pub fn validate_replay(ctx: &ValidationContext<'_>, record: bool) -> Result<()> {
    let Some(cache) = ctx.policy.token_replay_cache() else {
        return Ok(());
    };
    let raw = ctx.token.raw_data();
    let first_use = if record {
        cache
            .check_and_record(raw, ctx.token.valid_to())
            .map_err(replay_cache_error)?
    } else {
        !cache.has_been_used(raw).map_err(replay_cache_error)?
    };
    if first_use {
        Ok(())
    } else {
        Err(Error::TokenReplayDetected)
    }
}

fn replay_cache_error(e: Error) -> Error {
    match e {
        Error::ReplayCache(_) => e,
        other => Error::ReplayCache(other.to_string()),
    }
}
