//! Remember-me ids.
//!
//! A remember-me id is a long-lived, single-use credential. Its entry
//! holds the unix time it was issued; redeeming it deletes the entry, so
//! a stolen id stops working the moment either party uses it. Mapping
//! ids to accounts is the host's business: Latchkey only vouches that an
//! id is genuine and fresh, and the host then calls
//! [`RequestSession::upgrade`](latchkey_session::RequestSession::upgrade)
//! (see [`Latchkey::reauthenticate`](crate::Latchkey::reauthenticate)).

use std::sync::Arc;

use latchkey_protocol::{Clock, SystemClock, decode_timestamp, encode_timestamp};
use latchkey_store::{EntryLock, LockStore, validate_key};
use rand::Rng;

use crate::LatchkeyError;

/// Issues and redeems remember-me ids.
pub struct RememberMe<S: LockStore> {
    store: S,
    valid_for: u64,
    clock: Arc<dyn Clock>,
}

impl<S: LockStore> RememberMe<S> {
    /// Ids stay redeemable for `valid_for` seconds.
    pub fn new(store: S, valid_for: u64) -> Self {
        Self {
            store,
            valid_for,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the time source.
    pub fn with_clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Creates a new id.
    pub fn issue(&self) -> Result<String, LatchkeyError> {
        let bytes: [u8; 24] = rand::rng().random();
        let id: String = bytes.iter().map(|b| format!("{b:02x}")).collect();

        let stamp = encode_timestamp(self.clock.now());
        self.store.with_lock(&id, |lock| lock.overwrite(&stamp))?;
        tracing::debug!(id = %&id[..8], "remember-me id issued");
        Ok(id)
    }

    /// Redeems `id`, returning `true` if it was genuine and unexpired.
    ///
    /// The id is used up either way.
    pub fn consume(&self, id: &str) -> Result<bool, LatchkeyError> {
        if validate_key(id).is_err() {
            return Ok(false);
        }
        let Some(mut lock) = self.store.open_lock_if_exists(id)? else {
            return Ok(false);
        };

        let raw = lock.read()?;
        self.store.delete_unsafe(lock)?;

        let issued_at = match decode_timestamp(&raw) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(error = %e, "discarded corrupt remember-me entry");
                return Ok(false);
            }
        };
        let age = self.clock.now().saturating_sub(issued_at);
        let fresh = u64::try_from(age).is_ok_and(|age| age <= self.valid_for);
        if !fresh {
            tracing::debug!(age, "remember-me id expired");
        }
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use latchkey_protocol::ManualClock;
    use latchkey_store::FileLockStore;

    use super::*;

    fn remember(dir: &std::path::Path, clock: &ManualClock) -> RememberMe<FileLockStore> {
        RememberMe::new(FileLockStore::open(dir).unwrap(), 100).with_clock(clock.clone())
    }

    #[test]
    fn test_issue_then_consume_once() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(1_000);
        let r = remember(dir.path(), &clock);

        let id = r.issue().unwrap();

        assert_eq!(id.len(), 48);
        assert!(r.consume(&id).unwrap());
        assert!(!r.consume(&id).unwrap(), "ids are single-use");
    }

    #[test]
    fn test_consume_expired_id_fails_and_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(1_000);
        let r = remember(dir.path(), &clock);
        let id = r.issue().unwrap();

        clock.advance(101);

        assert!(!r.consume(&id).unwrap());
        assert!(!r.store.exists_unsafe(&id).unwrap());
    }

    #[test]
    fn test_consume_unknown_or_malformed_id_fails() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(1_000);
        let r = remember(dir.path(), &clock);

        assert!(!r.consume("deadbeef").unwrap());
        assert!(!r.consume("../../etc/passwd").unwrap());
        assert!(!r.consume("").unwrap());
    }

    #[test]
    fn test_consume_from_the_future_fails() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(1_000);
        let r = remember(dir.path(), &clock);
        r.store.overwrite_unsafe("skewed", &encode_timestamp(5_000)).unwrap();

        assert!(!r.consume("skewed").unwrap());
    }
}
