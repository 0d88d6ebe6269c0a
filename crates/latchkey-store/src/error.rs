use std::path::PathBuf;

/// Errors that can occur in the store layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The key cannot name an entry.
    #[error("invalid entry key {0:?}")]
    InvalidKey(String),

    /// The container directory could not be created or opened.
    #[error("failed to open container {}: {source}", path.display())]
    Container {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Opening the entry or taking its lock failed.
    #[error("failed to acquire lock on {key}: {source}")]
    Acquire {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// The OS refused to release a held lock.
    #[error("failed to release lock on {key}: {source}")]
    Unlock {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// The handle no longer owns its lock.
    #[error("lock handle for {0} was already released")]
    Released(String),

    /// Reading a payload failed.
    #[error("failed to read entry {key}: {source}")]
    Read {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// Writing a payload failed.
    #[error("failed to write entry {key}: {source}")]
    Write {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// Removing an entry failed.
    #[error("failed to delete entry {key}: {source}")]
    Delete {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// Enumerating the container failed.
    #[error("failed to list container {}: {source}", path.display())]
    List {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
