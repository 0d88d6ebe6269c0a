//! Lockable key-value containers for Latchkey.
//!
//! Provides the [`LockStore`] and [`EntryLock`] traits that abstract over
//! storage backends. A container holds byte-string entries, each of which
//! can be locked independently by key.
//!
//! # Safe and unsafe operations
//!
//! Reads and writes through an [`EntryLock`] happen while the entry's
//! mutex is held. The `*_unsafe` methods on [`LockStore`] bypass the
//! mutex entirely: they never block, and apart from the momentary check in
//! [`LockStore::is_locked`] they never acquire anything. Callers
//! must already know nobody else can be racing on that key, either
//! because they hold the lock themselves or because the protocol they
//! implement rules it out.
//!
//! # Backends
//!
//! - [`FileLockStore`]: one directory per container, one file per key,
//!   exclusive access via advisory `flock`.

mod error;
mod file;

pub use error::StoreError;
pub use file::{FileLock, FileLockStore};

/// Longest key accepted by [`validate_key`].
pub const MAX_KEY_LEN: usize = 255;

/// A named container of independently lockable entries.
pub trait LockStore: Send + Sync + 'static {
    /// The owning handle produced when a lock is acquired.
    type Lock: EntryLock;

    /// Blocks until the entry's lock is held, creating the entry if absent.
    fn open_lock(&self, key: &str) -> Result<Self::Lock, StoreError>;

    /// Blocks until the entry's lock is held.
    ///
    /// Returns `Ok(None)` immediately if the entry does not exist. Never
    /// creates an entry.
    fn open_lock_if_exists(
        &self,
        key: &str,
    ) -> Result<Option<Self::Lock>, StoreError>;

    /// Acquires the lock without blocking.
    ///
    /// Returns `Ok(None)` if another handle currently holds it. An absent
    /// entry with no contention is created and locked; existence policy
    /// belongs to the caller.
    fn try_lock(&self, key: &str) -> Result<Option<Self::Lock>, StoreError>;

    /// Reads an entry's payload without taking its lock.
    ///
    /// Returns `Ok(None)` if the entry does not exist.
    fn read_unsafe(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Replaces an entry's payload without taking its lock, creating the
    /// entry if absent.
    fn overwrite_unsafe(&self, key: &str, data: &[u8])
    -> Result<(), StoreError>;

    /// Deletes the entry behind a held lock, then releases the lock.
    fn delete_unsafe(&self, lock: Self::Lock) -> Result<(), StoreError>;

    /// Deletes an entry without taking its lock.
    ///
    /// Returns `Ok(false)` if the entry was already gone.
    fn delete_unsafe_by_key(&self, key: &str) -> Result<bool, StoreError>;

    /// Returns `true` if the entry exists.
    fn exists_unsafe(&self, key: &str) -> Result<bool, StoreError>;

    /// Returns `true` if some handle currently holds the entry's lock.
    ///
    /// A missing entry is never locked. The file backend answers by taking
    /// the lock without blocking and dropping it straight away, so a
    /// [`try_lock`](Self::try_lock) on the same key at that instant can
    /// report busy.
    fn is_locked(&self, key: &str) -> Result<bool, StoreError>;

    /// Lists every key in the container, sorted.
    fn list_all_keys(&self) -> Result<Vec<String>, StoreError>;

    /// Runs `f` while holding the entry's lock, releasing it afterwards.
    ///
    /// This is the plain mutex use of the store: jobs and throttles that
    /// only need a critical section, not a protocol.
    fn with_lock<R>(
        &self,
        key: &str,
        f: impl FnOnce(&mut Self::Lock) -> Result<R, StoreError>,
    ) -> Result<R, StoreError>
    where
        Self: Sized,
    {
        let mut lock = self.open_lock(key)?;
        let result = f(&mut lock);
        lock.close()?;
        result
    }
}

/// An exclusively held entry.
///
/// Dropping a live handle releases the lock, so every exit path
/// (including unwinding) gives the entry back.
pub trait EntryLock: Send + 'static {
    /// The key of the locked entry.
    fn key(&self) -> &str;

    /// Reads the whole payload.
    fn read(&mut self) -> Result<Vec<u8>, StoreError>;

    /// Replaces the payload.
    fn overwrite(&mut self, data: &[u8]) -> Result<(), StoreError>;

    /// Extends the payload.
    fn append(&mut self, data: &[u8]) -> Result<(), StoreError>;

    /// Releases the lock.
    fn close(self) -> Result<(), StoreError>;

    /// Moves the live lock into a new handle.
    ///
    /// The source is consumed and releases nothing when it goes away.
    #[must_use]
    fn transfer_ownership(self) -> Self
    where
        Self: Sized;
}

/// Checks that `key` can name an entry.
///
/// Keys are non-empty, at most [`MAX_KEY_LEN`] bytes, made of ASCII
/// alphanumerics plus `-`, `_` and `.`, and never start with `.`.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    let valid = !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && !key.starts_with('.')
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}
