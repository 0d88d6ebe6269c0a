//! The sweeps themselves.

use std::collections::BTreeMap;
use std::sync::Arc;

use latchkey_protocol::{
    Clock, Codec, JsonCodec, Session, SystemClock, UnixTime, decode_timestamp,
};
use latchkey_store::LockStore;
use tracing::{debug, info, warn};

use crate::{GcConfig, GcError, GcTrigger};

/// Outcome of sweeping one container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Keys examined.
    pub scanned: usize,

    /// Entries removed.
    pub deleted: usize,

    /// Entries left alone because someone held their lock.
    pub skipped_locked: usize,
}

/// Outcome of a full pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcReport {
    pub sessions: SweepReport,

    /// Per timestamp container, by name.
    pub timestamps: BTreeMap<String, SweepReport>,
}

impl GcReport {
    /// Entries removed across every container.
    pub fn total_deleted(&self) -> usize {
        self.sessions.deleted
            + self.timestamps.values().map(|r| r.deleted).sum::<usize>()
    }
}

/// Reclaims stale entries from one session container and any number of
/// timestamp containers.
///
/// ```ignore
/// let gc = GarbageCollector::new(sessions, config.gc.clone())
///     .with_timestamp_container("remember", remember_store)
///     .with_timestamp_container("throttle", throttle_store);
///
/// if let Some(report) = gc.maybe_collect()? {
///     tracing::info!(deleted = report.total_deleted(), "gc pass");
/// }
/// ```
pub struct GarbageCollector<S: LockStore> {
    sessions: S,
    timestamps: Vec<(String, S)>,
    config: GcConfig,
    trigger: GcTrigger,
    clock: Arc<dyn Clock>,
    codec: JsonCodec,
}

impl<S: LockStore> GarbageCollector<S> {
    /// Creates a collector for `sessions`, repairing `config` first.
    pub fn new(sessions: S, config: GcConfig) -> Self {
        let config = config.validated();
        let trigger = GcTrigger::new(&config);
        Self {
            sessions,
            timestamps: Vec::new(),
            config,
            trigger,
            clock: Arc::new(SystemClock),
            codec: JsonCodec,
        }
    }

    /// Adds a container of timestamp entries to every pass.
    pub fn with_timestamp_container(
        mut self,
        name: impl Into<String>,
        store: S,
    ) -> Self {
        self.timestamps.push((name.into(), store));
        self
    }

    /// Replaces the time source.
    pub fn with_clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// The validated configuration.
    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    /// Runs a pass if this request wins the trigger roll.
    pub fn maybe_collect(&self) -> Result<Option<GcReport>, GcError> {
        if !self.trigger.should_run() {
            return Ok(None);
        }
        self.collect().map(Some)
    }

    /// Sweeps every container.
    pub fn collect(&self) -> Result<GcReport, GcError> {
        let now = self.clock.now();
        let mut report = GcReport {
            sessions: self.sweep_sessions_at(now)?,
            timestamps: BTreeMap::new(),
        };
        for (name, store) in &self.timestamps {
            let sweep = self.sweep_timestamps_at(name, store, now)?;
            report.timestamps.insert(name.clone(), sweep);
        }

        info!(
            deleted = report.total_deleted(),
            sessions_scanned = report.sessions.scanned,
            "gc pass complete"
        );
        Ok(report)
    }

    /// Sweeps the session container.
    pub fn sweep_sessions(&self) -> Result<SweepReport, GcError> {
        self.sweep_sessions_at(self.clock.now())
    }

    fn sweep_sessions_at(&self, now: UnixTime) -> Result<SweepReport, GcError> {
        let mut report = SweepReport::default();

        for key in self.sessions.list_all_keys()? {
            report.scanned += 1;
            let Some(raw) = self.sessions.read_unsafe(&key)? else {
                continue;
            };
            // An empty entry under lock is a token being minted.
            if raw.is_empty() && self.sessions.is_locked(&key)? {
                report.skipped_locked += 1;
                continue;
            }

            let reclaim = match self.codec.decode::<Session>(&raw) {
                Ok(session) => session.is_reclaimable(now),
                Err(e) => {
                    warn!(%key, error = %e, "reclaiming unreadable session entry");
                    true
                }
            };
            if reclaim && self.sessions.delete_unsafe_by_key(&key)? {
                debug!(%key, "session entry reclaimed");
                report.deleted += 1;
            }
        }
        Ok(report)
    }

    fn sweep_timestamps_at(
        &self,
        container: &str,
        store: &S,
        now: UnixTime,
    ) -> Result<SweepReport, GcError> {
        let max_age = i64::try_from(self.config.timestamp_max_age)
            .unwrap_or(i64::MAX);
        let mut report = SweepReport::default();

        for key in store.list_all_keys()? {
            report.scanned += 1;
            if store.is_locked(&key)? {
                report.skipped_locked += 1;
                continue;
            }
            let Some(raw) = store.read_unsafe(&key)? else {
                continue;
            };
            // Created by a lock holder that never wrote its stamp.
            if raw.is_empty() {
                if store.delete_unsafe_by_key(&key)? {
                    debug!(container, %key, "abandoned timestamp entry reclaimed");
                    report.deleted += 1;
                }
                continue;
            }

            let stamped = decode_timestamp(&raw).map_err(|source| {
                GcError::CorruptTimestamp {
                    container: container.to_string(),
                    key: key.clone(),
                    source,
                }
            })?;
            if now.saturating_sub(stamped) > max_age
                && store.delete_unsafe_by_key(&key)?
            {
                debug!(container, %key, "timestamp entry reclaimed");
                report.deleted += 1;
            }
        }
        Ok(report)
    }
}
