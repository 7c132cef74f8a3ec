//! YAML configuration.
//!
//! Loads the handler settings and a key-less [`TrustPolicy`] skeleton.
//! Keys, custom validators and claim-type mappers are attached in code:
//!
//! ```yaml
//! handler:
//!   max_token_size: 262144
//!   collect_all_failures: false
//!   audit: stdout
//!
//! policy:
//!   valid_issuers:
//!     - "https://login.example.com"
//!   valid_audiences:
//!     - "api://orders"
//!   validate_actor: true
//!   clock_skew_secs: 30
//!   replay_cache:
//!     enabled: true
//!     max_entries: 100000
//! ```
//!
//! ```ignore
//! let config = SigilConfig::from_file("sigil.yaml")?;
//! config.validate()?;
//! let handler = config.build_handler()?;
//! let policy = config.policy().with_signing_key(key);
//! ```

use crate::audit::{NoOpLogger, SharedAuditLogger, StdoutLogger};
use crate::clock::SharedClock;
use crate::pipeline::TokenHandler;
use crate::policy::{TrustPolicy, UnsignedTokenPolicy, MAX_CLOCK_SKEW_SECS};
use crate::replay::{InMemoryReplayCache, DEFAULT_GRACE_PERIOD, DEFAULT_MAX_ENTRIES};
use crate::wire::DEFAULT_MAX_TOKEN_SIZE;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SigilConfig {
    #[serde(default)]
    pub handler: HandlerSettings,
    #[serde(default)]
    pub policy: PolicySettings,
}

/// Where audit events go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSink {
    Stdout,
    #[default]
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandlerSettings {
    /// Upper bound on raw token length, in bytes
    #[serde(default = "default_max_token_size")]
    pub max_token_size: usize,
    #[serde(default)]
    pub collect_all_failures: bool,
    #[serde(default)]
    pub audit: AuditSink,
}

fn default_max_token_size() -> usize {
    DEFAULT_MAX_TOKEN_SIZE
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self {
            max_token_size: default_max_token_size(),
            collect_all_failures: false,
            audit: AuditSink::None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicySettings {
    #[serde(default)]
    pub valid_issuers: Vec<String>,
    #[serde(default)]
    pub valid_audiences: Vec<String>,
    #[serde(default = "default_true")]
    pub validate_issuer: bool,
    #[serde(default = "default_true")]
    pub validate_audience: bool,
    #[serde(default)]
    pub validate_actor: bool,
    #[serde(default)]
    pub validate_issuer_certificate: bool,
    #[serde(default = "default_true")]
    pub require_expiration_time: bool,
    #[serde(default)]
    pub save_signin_token: bool,
    /// Accept `alg: none` tokens (every acceptance is audited)
    #[serde(default)]
    pub accept_unsigned_tokens: bool,
    #[serde(default)]
    pub clock_skew_secs: i64,
    #[serde(default)]
    pub replay_cache: ReplayCacheSettings,
}

fn default_true() -> bool {
    true
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            valid_issuers: Vec::new(),
            valid_audiences: Vec::new(),
            validate_issuer: true,
            validate_audience: true,
            validate_actor: false,
            validate_issuer_certificate: false,
            require_expiration_time: true,
            save_signin_token: false,
            accept_unsigned_tokens: false,
            clock_skew_secs: 0,
            replay_cache: ReplayCacheSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplayCacheSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
    /// Extra retention past `exp`, in seconds
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,
}

fn default_max_entries() -> u64 {
    DEFAULT_MAX_ENTRIES
}

fn default_grace_period_secs() -> u64 {
    DEFAULT_GRACE_PERIOD.as_secs()
}

impl Default for ReplayCacheSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            max_entries: default_max_entries(),
            grace_period_secs: default_grace_period_secs(),
        }
    }
}

/// A single problem found by [`SigilConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigValidationError {
    pub location: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),
    #[error("failed to read {0}: {1}")]
    FileRead(String, #[source] std::io::Error),
    #[error("invalid configuration: {}", format_problems(.0))]
    Invalid(Vec<ConfigValidationError>),
}

fn format_problems(problems: &[ConfigValidationError]) -> String {
    problems
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl SigilConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(path.as_ref().display().to_string(), e))?;
        Self::from_yaml(&content)
    }

    /// Check every setting and report all problems at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();
        let mut problem = |location: &str, message: &str| {
            problems.push(ConfigValidationError {
                location: location.into(),
                message: message.into(),
            })
        };

        if self.handler.max_token_size == 0 {
            problem("handler.max_token_size", "must be greater than zero");
        }

        let policy = &self.policy;
        if policy.clock_skew_secs < 0 {
            problem("policy.clock_skew_secs", "must not be negative");
        }
        if policy.clock_skew_secs > MAX_CLOCK_SKEW_SECS {
            problem("policy.clock_skew_secs", "must not exceed one day");
        }
        if policy.validate_issuer && policy.valid_issuers.is_empty() {
            problem(
                "policy.valid_issuers",
                "issuer validation is enabled but no issuers are listed",
            );
        }
        if policy.validate_audience && policy.valid_audiences.is_empty() {
            problem(
                "policy.valid_audiences",
                "audience validation is enabled but no audiences are listed",
            );
        }
        for (i, issuer) in policy.valid_issuers.iter().enumerate() {
            if issuer.trim().is_empty() {
                problem(&format!("policy.valid_issuers[{}]", i), "must not be blank");
            }
        }
        for (i, audience) in policy.valid_audiences.iter().enumerate() {
            if audience.trim().is_empty() {
                problem(&format!("policy.valid_audiences[{}]", i), "must not be blank");
            }
        }
        if policy.replay_cache.enabled && policy.replay_cache.max_entries == 0 {
            problem("policy.replay_cache.max_entries", "must be greater than zero");
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }

    /// Build a handler with the system clock.
    pub fn build_handler(&self) -> crate::Result<TokenHandler> {
        let audit: SharedAuditLogger = match self.handler.audit {
            AuditSink::Stdout => Arc::new(StdoutLogger::new()),
            AuditSink::None => Arc::new(NoOpLogger),
        };
        TokenHandler::builder()
            .max_token_size(self.handler.max_token_size)
            .collect_all_failures(self.handler.collect_all_failures)
            .audit_logger(audit)
            .build()
    }

    /// Policy skeleton: everything but keys and custom hooks.
    pub fn policy(&self) -> TrustPolicy {
        self.build_policy(None)
    }

    /// Like [`policy`](Self::policy), with the replay cache driven by `clock`.
    pub fn policy_with_clock(&self, clock: SharedClock) -> TrustPolicy {
        self.build_policy(Some(clock))
    }

    fn build_policy(&self, clock: Option<SharedClock>) -> TrustPolicy {
        let settings = &self.policy;
        let unsigned = if settings.accept_unsigned_tokens {
            UnsignedTokenPolicy::AcceptAudited
        } else {
            UnsignedTokenPolicy::Reject
        };

        let mut policy = TrustPolicy::new()
            .with_validate_issuer(settings.validate_issuer)
            .with_validate_audience(settings.validate_audience)
            .with_validate_actor(settings.validate_actor)
            .with_validate_issuer_certificate(settings.validate_issuer_certificate)
            .with_require_expiration_time(settings.require_expiration_time)
            .with_save_signin_token(settings.save_signin_token)
            .with_unsigned_tokens(unsigned)
            .with_clock_skew(
                // Out-of-range values saturate; the policy reports them at validation.
                chrono::Duration::try_seconds(settings.clock_skew_secs)
                    .unwrap_or(chrono::Duration::MAX),
            );

        if !settings.valid_issuers.is_empty() {
            policy = policy.with_valid_issuers(settings.valid_issuers.iter().cloned());
        }
        if !settings.valid_audiences.is_empty() {
            policy = policy.with_valid_audiences(settings.valid_audiences.iter().cloned());
        }

        let replay = &settings.replay_cache;
        if replay.enabled {
            let mut cache = InMemoryReplayCache::with_capacity(replay.max_entries)
                .with_grace_period(Duration::from_secs(replay.grace_period_secs));
            if let Some(clock) = clock {
                cache = cache.with_clock(clock);
            }
            policy = policy.with_token_replay_cache(Arc::new(cache));
        }

        policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const FULL: &str = r#"
handler:
  max_token_size: 4096
  collect_all_failures: true
  audit: stdout
policy:
  valid_issuers: ["https://issuer-a", "https://issuer-b"]
  valid_audiences: ["api"]
  validate_actor: true
  save_signin_token: true
  clock_skew_secs: 30
  replay_cache:
    enabled: true
    max_entries: 10
"#;

    #[test]
    fn test_parse_full() {
        let config = SigilConfig::from_yaml(FULL).unwrap();
        assert_eq!(config.handler.max_token_size, 4096);
        assert!(config.handler.collect_all_failures);
        assert_eq!(config.handler.audit, AuditSink::Stdout);
        assert_eq!(config.policy.valid_issuers.len(), 2);
        assert!(config.policy.validate_issuer);
        assert!(config.policy.require_expiration_time);
        assert_eq!(config.policy.replay_cache.grace_period_secs, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults() {
        let config = SigilConfig::from_yaml("{}").unwrap();
        assert_eq!(config.handler.max_token_size, DEFAULT_MAX_TOKEN_SIZE);
        assert_eq!(config.handler.audit, AuditSink::None);
        assert!(!config.policy.replay_cache.enabled);
        assert!(!config.policy.accept_unsigned_tokens);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = SigilConfig::from_yaml("policy:\n  valid_issuer: x\n").unwrap_err();
        assert!(matches!(err, ConfigError::YamlParse(_)));
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let yaml = r#"
handler:
  max_token_size: 0
policy:
  valid_issuers: [" "]
  clock_skew_secs: -5
  replay_cache:
    enabled: true
    max_entries: 0
"#;
        let config = SigilConfig::from_yaml(yaml).unwrap();
        match config.validate().unwrap_err() {
            ConfigError::Invalid(problems) => {
                let locations: Vec<&str> = problems.iter().map(|p| p.location.as_str()).collect();
                assert_eq!(
                    locations,
                    vec![
                        "handler.max_token_size",
                        "policy.clock_skew_secs",
                        "policy.valid_audiences",
                        "policy.valid_issuers[0]",
                        "policy.replay_cache.max_entries",
                    ]
                );
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_clock_skew_out_of_range() {
        let yaml = "policy:\n  validate_issuer: false\n  validate_audience: false\n  clock_skew_secs: 9223372036854775807\n";
        let config = SigilConfig::from_yaml(yaml).unwrap();
        match config.validate().unwrap_err() {
            ConfigError::Invalid(problems) => {
                assert_eq!(problems.len(), 1);
                assert_eq!(problems[0].location, "policy.clock_skew_secs");
            }
            other => panic!("unexpected error: {}", other),
        }

        let err = config.policy().validate_configuration().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);

        let mut day = config.clone();
        day.policy.clock_skew_secs = crate::policy::MAX_CLOCK_SKEW_SECS;
        assert!(day.validate().is_ok());
        assert!(day.policy().validate_configuration().is_ok());
    }

    #[test]
    fn test_policy_skeleton() {
        let config = SigilConfig::from_yaml(FULL).unwrap();
        let policy = config.policy();
        assert_eq!(policy.accepted_issuers().len(), 2);
        assert!(policy.accepted_audiences().contains("api"));
        assert!(policy.validate_actor());
        assert!(policy.save_signin_token());
        assert_eq!(policy.clock_skew(), chrono::Duration::seconds(30));
        assert!(policy.token_replay_cache().is_some());
        assert!(policy.signing_key().is_none());
        assert_eq!(policy.unsigned_tokens(), UnsignedTokenPolicy::Reject);
    }

    #[test]
    fn test_build_handler() {
        let config = SigilConfig::from_yaml(FULL).unwrap();
        let handler = config.build_handler().unwrap();
        assert_eq!(handler.max_token_size(), 4096);
        assert!(handler.collects_all_failures());

        let mut zero = config.clone();
        zero.handler.max_token_size = 0;
        let err = zero.build_handler().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
    }

    #[test]
    fn test_missing_file() {
        let err = SigilConfig::from_file("/nonexistent/sigil.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::FileRead(..)));
    }
}
