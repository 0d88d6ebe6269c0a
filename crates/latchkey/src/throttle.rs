//! Minimum-interval rate limiting on top of a lock store.
//!
//! Each throttle key is an entry holding the decimal unix time of the
//! last allowed hit. A check takes the entry with `try_lock`: if another
//! request is checking the same key right now, this one is limited
//! without waiting. A garbage collection pass checking the key with
//! `is_locked` counts as such a check for that instant.

use std::sync::Arc;

use latchkey_protocol::{Clock, SystemClock, decode_timestamp, encode_timestamp};
use latchkey_store::{EntryLock, LockStore};

use crate::LatchkeyError;

/// Result of a throttle check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// Go ahead. The hit has been recorded.
    Allowed,

    /// Too soon; try again after this many seconds.
    Limited { retry_after: u64 },
}

impl ThrottleDecision {
    /// `true` if the hit may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Per-key rate limiter.
pub struct Throttle<S: LockStore> {
    store: S,
    clock: Arc<dyn Clock>,
}

impl<S: LockStore> Throttle<S> {
    /// Creates a throttle over `store` using the system clock.
    pub fn new(store: S) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the time source.
    pub fn with_clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Allows one hit on `key` per `min_interval` seconds.
    pub fn check(
        &self,
        key: &str,
        min_interval: u64,
    ) -> Result<ThrottleDecision, LatchkeyError> {
        let Some(mut lock) = self.store.try_lock(key)? else {
            tracing::debug!(key, "throttle key busy");
            return Ok(ThrottleDecision::Limited {
                retry_after: min_interval,
            });
        };

        let now = self.clock.now();
        let raw = lock.read()?;
        let last = if raw.is_empty() {
            None
        } else {
            match decode_timestamp(&raw) {
                Ok(t) => Some(t),
                Err(e) => {
                    tracing::warn!(key, error = %e, "resetting corrupt throttle entry");
                    None
                }
            }
        };

        let elapsed = last.map(|t| u64::try_from(now.saturating_sub(t)).unwrap_or(0));
        let decision = match elapsed {
            Some(elapsed) if elapsed < min_interval => ThrottleDecision::Limited {
                retry_after: min_interval - elapsed,
            },
            _ => {
                lock.overwrite(&encode_timestamp(now))?;
                ThrottleDecision::Allowed
            }
        };
        lock.close()?;

        if !decision.is_allowed() {
            tracing::debug!(key, ?decision, "throttled");
        }
        Ok(decision)
    }
}
