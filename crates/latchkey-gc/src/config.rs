//! Garbage collector configuration.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// How often, and how aggressively, stale entries are reclaimed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcConfig {
    /// Master switch for per-request passes.
    pub enabled: bool,

    /// Numerator of the per-request pass chance.
    pub probability: u32,

    /// Denominator of the per-request pass chance. Default: 100 (1%).
    pub divisor: u32,

    /// Age in seconds after which an unlocked timestamp entry is deleted.
    /// Default: 30 days.
    pub timestamp_max_age: u64,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            probability: 1,
            divisor: 100,
            timestamp_max_age: 30 * 24 * 60 * 60,
        }
    }
}

impl GcConfig {
    /// Clamp and fix any out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`GarbageCollector::new`](crate::GarbageCollector::new).
    /// Rules:
    /// - `divisor` of 0 becomes 1.
    /// - `probability` capped to `divisor` (a pass on every request).
    pub fn validated(mut self) -> Self {
        if self.divisor == 0 {
            warn!("gc divisor is 0; using 1");
            self.divisor = 1;
        }
        if self.probability > self.divisor {
            warn!(
                probability = self.probability,
                divisor = self.divisor,
                "gc probability exceeds divisor; clamping"
            );
            self.probability = self.divisor;
        }
        self
    }
}
