//! Error types for garbage collection.

use latchkey_protocol::ProtocolError;
use latchkey_store::StoreError;

/// Errors that abort a garbage collection pass.
#[derive(Debug, thiserror::Error)]
pub enum GcError {
    /// Listing, reading or deleting entries failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A timestamp entry holds something other than a unix time.
    #[error("corrupt timestamp entry {key:?} in container {container:?}")]
    CorruptTimestamp {
        container: String,
        key: String,
        #[source]
        source: ProtocolError,
    },

    /// The scheduler task is gone.
    #[error("gc scheduler is not running")]
    SchedulerStopped,

    /// A pass on the blocking pool panicked or was cancelled.
    #[error("gc pass did not complete: {0}")]
    Join(#[from] tokio::task::JoinError),
}
