//! Token replay detection.
//!
//! The replay cache is the only component with mutable state shared across
//! validations. The pipeline adds no locking around it: implementations
//! must make [`TokenReplayCache::check_and_record`] atomic.

use crate::clock::{SharedClock, SystemClock};
use crate::crypto::token_digest;
use crate::error::Result;
use chrono::{DateTime, Utc};
use moka::sync::Cache;
use moka::Expiry;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Retention for tokens that carry no `exp`.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(60 * 60);

/// Extra time an entry is kept past the token's expiry, covering clock skew.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5 * 60);

/// Default maximum number of remembered tokens.
pub const DEFAULT_MAX_ENTRIES: u64 = 1_000_000;

/// Replay-cache capability.
pub trait TokenReplayCache: Send + Sync + fmt::Debug {
    /// Whether `token` has been recorded and not yet expired.
    fn has_been_used(&self, token: &str) -> Result<bool>;

    /// Remember `token` until `expires` (plus any implementation grace).
    fn record_use(&self, token: &str, expires: Option<DateTime<Utc>>) -> Result<()>;

    /// Record `token` unless it was already recorded. Returns `true` on
    /// first use.
    ///
    /// The provided implementation is a plain check followed by a record
    /// and is not atomic. Caches shared between threads must override it.
    fn check_and_record(&self, token: &str, expires: Option<DateTime<Utc>>) -> Result<bool> {
        if self.has_been_used(token)? {
            return Ok(false);
        }
        self.record_use(token, expires)?;
        Ok(true)
    }
}

pub type SharedReplayCache = Arc<dyn TokenReplayCache>;

#[derive(Debug, Clone, Copy)]
struct ReplayEntry {
    retain_for: Duration,
}

struct ReplayExpiry;

impl Expiry<String, ReplayEntry> for ReplayExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &ReplayEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.retain_for)
    }
}

/// In-process replay cache backed by a concurrent moka cache.
///
/// Tokens are keyed by SHA-256 digest, so raw token text is never retained.
/// Entries live until the token's expiry plus a grace period.
///
/// Eviction under `max_entries` pressure forgets tokens early; size the
/// cache for the expected number of live tokens.
#[derive(Clone)]
pub struct InMemoryReplayCache {
    entries: Cache<String, ReplayEntry>,
    clock: SharedClock,
    grace_period: Duration,
    default_retention: Duration,
}

impl fmt::Debug for InMemoryReplayCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryReplayCache")
            .field("entries", &self.entries.entry_count())
            .field("grace_period", &self.grace_period)
            .field("default_retention", &self.default_retention)
            .finish()
    }
}

impl Default for InMemoryReplayCache {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryReplayCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity(max_entries: u64) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(max_entries)
                .expire_after(ReplayExpiry)
                .build(),
            clock: Arc::new(SystemClock),
            grace_period: DEFAULT_GRACE_PERIOD,
            default_retention: DEFAULT_RETENTION,
        }
    }

    /// Use `clock` to compute retention from `exp`.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn with_default_retention(mut self, retention: Duration) -> Self {
        self.default_retention = retention;
        self
    }

    /// Approximate number of live entries.
    pub fn len(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry_for(&self, expires: Option<DateTime<Utc>>) -> ReplayEntry {
        let retain_for = match expires {
            Some(exp) => {
                let remaining = (exp - self.clock.now()).to_std().unwrap_or(Duration::ZERO);
                remaining + self.grace_period
            }
            None => self.default_retention,
        };
        ReplayEntry { retain_for }
    }
}

impl TokenReplayCache for InMemoryReplayCache {
    fn has_been_used(&self, token: &str) -> Result<bool> {
        Ok(self.entries.get(&token_digest(token)).is_some())
    }

    fn record_use(&self, token: &str, expires: Option<DateTime<Utc>>) -> Result<()> {
        self.entries.insert(token_digest(token), self.entry_for(expires));
        Ok(())
    }

    fn check_and_record(&self, token: &str, expires: Option<DateTime<Utc>>) -> Result<bool> {
        let entry = self
            .entries
            .entry(token_digest(token))
            .or_insert_with(|| self.entry_for(expires));
        Ok(entry.is_fresh())
    }
}
