//! Session configuration.

use latchkey_protocol::Lifetimes;
use serde::{Deserialize, Serialize};

/// Configuration for session behavior.
///
/// Deserializes from a flat table:
///
/// ```toml
/// valid_for = 900
/// liminal_time = 30
/// allowed_inactivity = 604800
/// ```
///
/// Missing keys fall back to [`Lifetimes::default`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Windows stamped onto every newly issued token.
    #[serde(flatten)]
    pub lifetimes: Lifetimes,
}

impl SessionConfig {
    /// Creates a config with explicit windows, all in seconds.
    pub fn new(valid_for: u64, liminal_time: u64, allowed_inactivity: u64) -> Self {
        Self {
            lifetimes: Lifetimes {
                valid_for,
                liminal_time,
                allowed_inactivity,
            },
        }
    }
}
