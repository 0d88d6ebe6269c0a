//! File-backed store: a directory per container, a file per entry.
//!
//! Entry locks are advisory `flock` locks taken through `fs2`. They are
//! tied to the open file description, so two handles in the same process
//! contend exactly like two processes do.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::{EntryLock, LockStore, StoreError, validate_key};

/// A [`LockStore`] over one directory.
///
/// Cloning is cheap and every clone addresses the same container.
#[derive(Debug, Clone)]
pub struct FileLockStore {
    dir: PathBuf,
    sync_writes: bool,
}

impl FileLockStore {
    /// Opens the container at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Container {
            path: dir.clone(),
            source,
        })?;
        tracing::debug!(dir = %dir.display(), "lock store container ready");
        Ok(Self {
            dir,
            sync_writes: false,
        })
    }

    /// Makes locked writes `fsync` their data before returning.
    pub fn with_sync_writes(mut self, enabled: bool) -> Self {
        self.sync_writes = enabled;
        self
    }

    /// The container directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.dir.join(key))
    }

    fn locked(&self, key: &str, file: File) -> FileLock {
        tracing::trace!(key, "lock acquired");
        FileLock {
            key: key.to_string(),
            file: Some(file),
            sync_writes: self.sync_writes,
        }
    }
}

impl LockStore for FileLockStore {
    type Lock = FileLock;

    fn open_lock(&self, key: &str) -> Result<FileLock, StoreError> {
        let path = self.entry_path(key)?;
        loop {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)
                .map_err(|source| acquire_error(key, source))?;
            FileExt::lock_exclusive(&file)
                .map_err(|source| acquire_error(key, source))?;

            if is_still_linked(&file, &path)
                .map_err(|source| acquire_error(key, source))?
            {
                return Ok(self.locked(key, file));
            }
            // Deleted while we waited: the flock guards an orphaned inode.
            tracing::debug!(key, "entry unlinked while waiting, retrying");
        }
    }

    fn open_lock_if_exists(
        &self,
        key: &str,
    ) -> Result<Option<FileLock>, StoreError> {
        let path = self.entry_path(key)?;
        let file = match OpenOptions::new().read(true).write(true).open(&path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(acquire_error(key, source)),
        };
        FileExt::lock_exclusive(&file)
            .map_err(|source| acquire_error(key, source))?;

        if is_still_linked(&file, &path)
            .map_err(|source| acquire_error(key, source))?
        {
            Ok(Some(self.locked(key, file)))
        } else {
            tracing::debug!(key, "entry unlinked while waiting");
            Ok(None)
        }
    }

    fn try_lock(&self, key: &str) -> Result<Option<FileLock>, StoreError> {
        let path = self.entry_path(key)?;
        loop {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)
                .map_err(|source| acquire_error(key, source))?;
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => {}
                Err(e) if is_contended(&e) => {
                    tracing::trace!(key, "lock busy");
                    return Ok(None);
                }
                Err(source) => return Err(acquire_error(key, source)),
            }

            if is_still_linked(&file, &path)
                .map_err(|source| acquire_error(key, source))?
            {
                return Ok(Some(self.locked(key, file)));
            }
        }
    }

    fn read_unsafe(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.entry_path(key)?;
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Read {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn overwrite_unsafe(
        &self,
        key: &str,
        data: &[u8],
    ) -> Result<(), StoreError> {
        let path = self.entry_path(key)?;
        // In place, never via rename: locks are held on the inode.
        fs::write(&path, data).map_err(|source| StoreError::Write {
            key: key.to_string(),
            source,
        })
    }

    fn delete_unsafe(&self, lock: FileLock) -> Result<(), StoreError> {
        let path = self.entry_path(&lock.key)?;
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(StoreError::Delete {
                    key: lock.key.clone(),
                    source,
                });
            }
        }
        tracing::debug!(key = %lock.key, "entry deleted under lock");
        lock.close()
    }

    fn delete_unsafe_by_key(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.entry_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(key, "entry deleted");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::Delete {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn exists_unsafe(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.entry_path(key)?;
        match fs::metadata(&path) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::Read {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn is_locked(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.entry_path(key)?;
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(source) => return Err(acquire_error(key, source)),
        };
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                FileExt::unlock(&file).map_err(|source| StoreError::Unlock {
                    key: key.to_string(),
                    source,
                })?;
                Ok(false)
            }
            Err(e) if is_contended(&e) => Ok(true),
            Err(source) => Err(acquire_error(key, source)),
        }
    }

    fn list_all_keys(&self) -> Result<Vec<String>, StoreError> {
        let list_error = |source| StoreError::List {
            path: self.dir.clone(),
            source,
        };

        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(list_error)? {
            let entry = entry.map_err(list_error)?;
            if !entry.file_type().map_err(list_error)?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string)
            else {
                continue;
            };
            if validate_key(&name).is_ok() {
                keys.push(name);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

// ---------------------------------------------------------------------------
// FileLock
// ---------------------------------------------------------------------------

/// An exclusively locked entry of a [`FileLockStore`].
#[derive(Debug)]
pub struct FileLock {
    key: String,
    file: Option<File>,
    sync_writes: bool,
}

impl FileLock {
    fn parts(&mut self) -> Result<(&str, &mut File), StoreError> {
        let Self { key, file, .. } = self;
        match file.as_mut() {
            Some(file) => Ok((key.as_str(), file)),
            None => Err(StoreError::Released(key.clone())),
        }
    }

    fn finish_write(&mut self) -> Result<(), StoreError> {
        if !self.sync_writes {
            return Ok(());
        }
        let (key, file) = self.parts()?;
        file.sync_data().map_err(|source| write_error(key, source))
    }
}

impl EntryLock for FileLock {
    fn key(&self) -> &str {
        &self.key
    }

    fn read(&mut self) -> Result<Vec<u8>, StoreError> {
        let (key, file) = self.parts()?;
        let read_error = |source| StoreError::Read {
            key: key.to_string(),
            source,
        };
        file.seek(SeekFrom::Start(0)).map_err(read_error)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data).map_err(read_error)?;
        Ok(data)
    }

    fn overwrite(&mut self, data: &[u8]) -> Result<(), StoreError> {
        let (key, file) = self.parts()?;
        file.set_len(0).map_err(|source| write_error(key, source))?;
        file.seek(SeekFrom::Start(0))
            .map_err(|source| write_error(key, source))?;
        file.write_all(data)
            .map_err(|source| write_error(key, source))?;
        self.finish_write()
    }

    fn append(&mut self, data: &[u8]) -> Result<(), StoreError> {
        let (key, file) = self.parts()?;
        file.seek(SeekFrom::End(0))
            .map_err(|source| write_error(key, source))?;
        file.write_all(data)
            .map_err(|source| write_error(key, source))?;
        self.finish_write()
    }

    fn close(mut self) -> Result<(), StoreError> {
        let Some(file) = self.file.take() else {
            return Err(StoreError::Released(self.key.clone()));
        };
        FileExt::unlock(&file).map_err(|source| StoreError::Unlock {
            key: self.key.clone(),
            source,
        })?;
        tracing::trace!(key = %self.key, "lock released");
        Ok(())
    }

    fn transfer_ownership(mut self) -> Self {
        tracing::trace!(key = %self.key, "lock ownership transferred");
        Self {
            key: std::mem::take(&mut self.key),
            file: self.file.take(),
            sync_writes: self.sync_writes,
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            match FileExt::unlock(&file) {
                Ok(()) => {
                    tracing::debug!(key = %self.key, "lock released on drop");
                }
                Err(e) => {
                    tracing::warn!(
                        key = %self.key,
                        error = %e,
                        "failed to release lock on drop"
                    );
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn acquire_error(key: &str, source: io::Error) -> StoreError {
    StoreError::Acquire {
        key: key.to_string(),
        source,
    }
}

fn write_error(key: &str, source: io::Error) -> StoreError {
    StoreError::Write {
        key: key.to_string(),
        source,
    }
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Returns `true` if `path` still names the inode behind `file`.
#[cfg(unix)]
fn is_still_linked(file: &File, path: &Path) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let held = file.metadata()?;
    match fs::metadata(path) {
        Ok(current) => {
            Ok(held.dev() == current.dev() && held.ino() == current.ino())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(not(unix))]
fn is_still_linked(_file: &File, path: &Path) -> io::Result<bool> {
    path.try_exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, FileLockStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileLockStore::open(dir.path().join("entries"))
            .expect("store should open");
        (dir, store)
    }

    #[test]
    fn test_open_creates_container_directory() {
        let (_dir, store) = store();
        assert!(store.dir().is_dir());
    }

    #[test]
    fn test_open_lock_creates_empty_entry() {
        let (_dir, store) = store();
        let mut lock = store.open_lock("fresh").unwrap();

        assert!(lock.read().unwrap().is_empty());
        assert!(store.exists_unsafe("fresh").unwrap());
        lock.close().unwrap();
    }

    #[test]
    fn test_overwrite_replaces_longer_payload() {
        let (_dir, store) = store();
        let mut lock = store.open_lock("k").unwrap();
        lock.overwrite(b"a much longer payload").unwrap();
        lock.overwrite(b"short").unwrap();

        assert_eq!(lock.read().unwrap(), b"short");
        lock.close().unwrap();
        assert_eq!(store.read_unsafe("k").unwrap().unwrap(), b"short");
    }

    #[test]
    fn test_append_extends_payload() {
        let (_dir, store) = store();
        let mut lock = store.open_lock("k").unwrap();
        lock.overwrite(b"12").unwrap();
        lock.append(b"34").unwrap();

        assert_eq!(lock.read().unwrap(), b"1234");
    }

    #[test]
    fn test_sync_writes_still_persist() {
        let (_dir, store) = store();
        let store = store.with_sync_writes(true);
        let mut lock = store.open_lock("k").unwrap();
        lock.overwrite(b"durable").unwrap();
        lock.close().unwrap();

        assert_eq!(store.read_unsafe("k").unwrap().unwrap(), b"durable");
    }

    #[test]
    fn test_transfer_ownership_keeps_lock_held() {
        let (_dir, store) = store();
        let lock = store.open_lock("k").unwrap();

        let mut moved = lock.transfer_ownership();

        assert_eq!(moved.key(), "k");
        assert!(store.is_locked("k").unwrap());
        moved.overwrite(b"still mine").unwrap();
        moved.close().unwrap();
        assert!(!store.is_locked("k").unwrap());
    }

    #[test]
    fn test_drop_releases_lock() {
        let (_dir, store) = store();
        {
            let _lock = store.open_lock("k").unwrap();
            assert!(store.is_locked("k").unwrap());
        }
        assert!(!store.is_locked("k").unwrap());
    }

    #[test]
    fn test_invalid_key_is_rejected_before_touching_disk() {
        let (_dir, store) = store();

        let result = store.open_lock("../escape");

        assert!(matches!(result, Err(StoreError::InvalidKey(_))));
        assert!(store.list_all_keys().unwrap().is_empty());
    }

    #[test]
    fn test_list_all_keys_skips_directories_and_hidden_files() {
        let (_dir, store) = store();
        store.overwrite_unsafe("b", b"2").unwrap();
        store.overwrite_unsafe("a", b"1").unwrap();
        fs::create_dir(store.dir().join("nested")).unwrap();
        fs::write(store.dir().join(".hidden"), b"x").unwrap();

        assert_eq!(store.list_all_keys().unwrap(), vec!["a", "b"]);
    }
}
