//! Identity and lifetime types shared by every session layer.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::time::{UnixTime, add_secs};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// The authenticated principal a session belongs to.
///
/// Newtype over the account's database id. `#[serde(transparent)]` keeps
/// it a plain integer in the stored JSON (`"account_id": 42`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub i64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A-{}", self.0)
    }
}

/// A raw session token: the key of the session's store entry.
///
/// This is the server-side form. Clients only ever see the sealed form
/// produced by a token signer.
///
/// `Display` prints a short prefix so tokens can be logged without
/// handing out a usable credential.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    /// Number of characters kept by `Display`.
    const SHOWN: usize = 8;

    /// Wraps a raw token string.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The full token, e.g. for use as a store key.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Unwraps the full token.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown: String = self.0.chars().take(Self::SHOWN).collect();
        write!(f, "tok-{shown}")
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({self})")
    }
}

// ---------------------------------------------------------------------------
// Lifetimes
// ---------------------------------------------------------------------------

/// The three windows that govern a token, in seconds.
///
/// ```text
/// issued_at ──valid_for──▶ expired
///                            │ re-issued at t: forwards until t + liminal_time
///                            │ never re-issued: renewable while
///                            │   now - last_used <= allowed_inactivity
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Lifetimes {
    /// Token TTL counted from `issued_at`.
    pub valid_for: u64,

    /// How long a superseded token keeps forwarding to its successor.
    pub liminal_time: u64,

    /// How long after `last_used` an expired token may still be re-issued.
    pub allowed_inactivity: u64,
}

impl Default for Lifetimes {
    fn default() -> Self {
        Self {
            valid_for: 15 * 60,
            liminal_time: 30,
            allowed_inactivity: 7 * 24 * 60 * 60,
        }
    }
}

impl Lifetimes {
    /// When a token issued at `issued_at` stops being active.
    pub fn expires_at(&self, issued_at: UnixTime) -> UnixTime {
        add_secs(issued_at, self.valid_for)
    }

    /// When a token superseded at `reissued_at` stops forwarding.
    pub fn liminal_until(&self, reissued_at: UnixTime) -> UnixTime {
        add_secs(reissued_at, self.liminal_time)
    }

    /// The last moment a token used at `last_used` may be re-issued.
    pub fn renewable_until(&self, last_used: UnixTime) -> UnixTime {
        add_secs(last_used, self.allowed_inactivity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_id_serializes_as_plain_number() {
        let json = serde_json::to_string(&AccountId(42)).unwrap();
        assert_eq!(json, "42");
    }

    #[test]
    fn test_account_id_display() {
        assert_eq!(AccountId(7).to_string(), "A-7");
    }

    #[test]
    fn test_token_serializes_as_plain_string() {
        let json = serde_json::to_string(&Token::new("abc")).unwrap();
        assert_eq!(json, "\"abc\"");
    }

    #[test]
    fn test_token_display_redacts_tail() {
        let token = Token::new("0123456789abcdef");
        assert_eq!(token.to_string(), "tok-01234567");
        assert_eq!(format!("{token:?}"), "Token(tok-01234567)");
        assert_eq!(token.as_str(), "0123456789abcdef");
    }

    #[test]
    fn test_lifetimes_windows() {
        let lifetimes = Lifetimes {
            valid_for: 60,
            liminal_time: 5,
            allowed_inactivity: 300,
        };
        assert_eq!(lifetimes.expires_at(100), 160);
        assert_eq!(lifetimes.liminal_until(100), 105);
        assert_eq!(lifetimes.renewable_until(100), 400);
    }

    #[test]
    fn test_lifetimes_saturate_instead_of_overflowing() {
        let lifetimes = Lifetimes {
            valid_for: u64::MAX,
            ..Lifetimes::default()
        };
        assert_eq!(lifetimes.expires_at(10), i64::MAX);
    }
}
