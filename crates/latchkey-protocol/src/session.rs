//! The session record: one session entry's payload.
//!
//! A [`Session`] is pure data. It knows how to classify itself at a given
//! instant ([`Session::status`]) and whether the garbage collector may
//! reclaim it ([`Session::is_reclaimable`]), but it never touches the
//! store. The session layer owns locking and persistence.

use serde::{Deserialize, Serialize};

use crate::time::UnixTime;
use crate::types::{AccountId, Lifetimes, Token};

/// Open-ended session storage: string keys, arbitrary JSON values.
pub type DataMap = serde_json::Map<String, serde_json::Value>;

/// A pointer from a superseded token to its successor.
///
/// The stored format has two nullable fields (`reissued_at`,
/// `updated_token`). In memory they live in one `Option<Forwarding>`, so
/// a timestamp without a target (or the reverse) cannot be represented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Forwarding {
    /// When the token was superseded.
    pub reissued_at: UnixTime,

    /// The token that replaced it.
    pub updated_token: Token,
}

/// What a stored session means at a given instant.
///
/// ```text
///            superseded? ──yes──▶ now < reissued_at + liminal ? Forwarding : Invalid
///                 │no
///   now < issued_at + valid_for ? ──yes──▶ Active
///                 │no
///   now - last_used <= allowed_inactivity ? Reissuable : Invalid
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// The token is valid as-is.
    Active,

    /// The token was superseded and still forwards to this successor.
    Forwarding(Token),

    /// The token expired but may be silently replaced.
    Reissuable,

    /// The token resolves to nothing.
    Invalid,
}

/// One session's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SessionRecord", into = "SessionRecord")]
pub struct Session {
    /// Authenticated principal, `None` while anonymous.
    pub account_id: Option<AccountId>,

    /// Roles snapshot taken at issuance or upgrade.
    pub account_roles: Vec<String>,

    /// When this token was created.
    pub issued_at: UnixTime,

    /// When a request last finished with this token.
    pub last_used: UnixTime,

    /// The windows this token was issued with.
    pub lifetimes: Lifetimes,

    /// Set once the token has been superseded.
    pub forwarding: Option<Forwarding>,

    /// Anti-forgery value.
    pub csrf: String,

    /// One-shot values for the next request.
    pub flash_data: DataMap,

    /// General session storage.
    pub data: DataMap,
}

impl Session {
    /// Creates a fresh session issued at `now`.
    pub fn new(
        account_id: Option<AccountId>,
        account_roles: Vec<String>,
        now: UnixTime,
        lifetimes: Lifetimes,
    ) -> Self {
        Self {
            account_id,
            account_roles,
            issued_at: now,
            last_used: now,
            lifetimes,
            forwarding: None,
            csrf: new_csrf(),
            flash_data: DataMap::new(),
            data: DataMap::new(),
        }
    }

    /// Builds the record that replaces this one on re-issue.
    ///
    /// Identity, data, flash data and the CSRF value carry over; times
    /// restart at `now` with the given lifetimes.
    pub fn successor(&self, now: UnixTime, lifetimes: Lifetimes) -> Self {
        Self {
            account_id: self.account_id,
            account_roles: self.account_roles.clone(),
            issued_at: now,
            last_used: now,
            lifetimes,
            forwarding: None,
            csrf: self.csrf.clone(),
            flash_data: self.flash_data.clone(),
            data: self.data.clone(),
        }
    }

    /// Records that `updated_token` superseded this session at `now`.
    pub fn mark_superseded(&mut self, now: UnixTime, updated_token: Token) {
        self.forwarding = Some(Forwarding {
            reissued_at: now,
            updated_token,
        });
    }

    /// Takes the stored flash data, leaving it empty.
    pub fn harvest_flash(&mut self) -> DataMap {
        std::mem::take(&mut self.flash_data)
    }

    /// Replaces the CSRF value.
    pub fn rotate_csrf(&mut self) {
        self.csrf = new_csrf();
    }

    /// Classifies this session at `now`.
    pub fn status(&self, now: UnixTime) -> SessionStatus {
        if let Some(forwarding) = &self.forwarding {
            return if now < self.lifetimes.liminal_until(forwarding.reissued_at)
            {
                SessionStatus::Forwarding(forwarding.updated_token.clone())
            } else {
                SessionStatus::Invalid
            };
        }

        if now < self.lifetimes.expires_at(self.issued_at) {
            SessionStatus::Active
        } else if now <= self.lifetimes.renewable_until(self.last_used) {
            SessionStatus::Reissuable
        } else {
            SessionStatus::Invalid
        }
    }

    /// Returns `true` once nothing can resolve this session any more.
    ///
    /// Either its forwarding window closed, or it sat unused for the whole
    /// inactivity allowance.
    pub fn is_reclaimable(&self, now: UnixTime) -> bool {
        let forwarding_closed = self.forwarding.as_ref().is_some_and(|f| {
            now > self.lifetimes.liminal_until(f.reissued_at)
        });
        forwarding_closed || now >= self.lifetimes.renewable_until(self.last_used)
    }
}

fn new_csrf() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ---------------------------------------------------------------------------
// Stored format
// ---------------------------------------------------------------------------

/// The exact JSON shape of a session entry.
#[derive(Serialize, Deserialize)]
struct SessionRecord {
    account_id: Option<AccountId>,
    #[serde(default)]
    account_roles: Vec<String>,
    issued_at: UnixTime,
    last_used: UnixTime,
    valid_for: u64,
    liminal_time: u64,
    allowed_inactivity: u64,
    reissued_at: Option<UnixTime>,
    updated_token: Option<Token>,
    csrf: String,
    #[serde(default)]
    flash_data: DataMap,
    #[serde(default)]
    data: DataMap,
}

impl TryFrom<SessionRecord> for Session {
    type Error = String;

    fn try_from(record: SessionRecord) -> Result<Self, Self::Error> {
        let forwarding = match (record.reissued_at, record.updated_token) {
            (Some(reissued_at), Some(updated_token)) => Some(Forwarding {
                reissued_at,
                updated_token,
            }),
            (None, None) => None,
            _ => {
                return Err(
                    "reissued_at and updated_token must be set together"
                        .to_string(),
                );
            }
        };

        Ok(Self {
            account_id: record.account_id,
            account_roles: record.account_roles,
            issued_at: record.issued_at,
            last_used: record.last_used,
            lifetimes: Lifetimes {
                valid_for: record.valid_for,
                liminal_time: record.liminal_time,
                allowed_inactivity: record.allowed_inactivity,
            },
            forwarding,
            csrf: record.csrf,
            flash_data: record.flash_data,
            data: record.data,
        })
    }
}

impl From<Session> for SessionRecord {
    fn from(session: Session) -> Self {
        let (reissued_at, updated_token) = match session.forwarding {
            Some(f) => (Some(f.reissued_at), Some(f.updated_token)),
            None => (None, None),
        };

        Self {
            account_id: session.account_id,
            account_roles: session.account_roles,
            issued_at: session.issued_at,
            last_used: session.last_used,
            valid_for: session.lifetimes.valid_for,
            liminal_time: session.lifetimes.liminal_time,
            allowed_inactivity: session.lifetimes.allowed_inactivity,
            reissued_at,
            updated_token,
            csrf: session.csrf,
            flash_data: session.flash_data,
            data: session.data,
        }
    }
}
