//! Unified error type for Latchkey.

use latchkey_gc::GcError;
use latchkey_protocol::ProtocolError;
use latchkey_session::SessionError;
use latchkey_store::StoreError;

use crate::config::ConfigError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `latchkey` meta-crate, you deal with this single
/// error type instead of importing errors from each sub-crate.
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum LatchkeyError {
    /// A store-level error (container, lock, read, write).
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A payload could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (upgrade misuse, broken forwarding).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A garbage collection pass failed.
    #[error(transparent)]
    Gc(#[from] GcError),

    /// The configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_store_error() {
        let err = StoreError::InvalidKey("../x".into());
        let latchkey_err: LatchkeyError = err.into();
        assert!(matches!(latchkey_err, LatchkeyError::Store(_)));
        assert!(latchkey_err.to_string().contains("../x"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidTimestamp("soon".into());
        let latchkey_err: LatchkeyError = err.into();
        assert!(matches!(latchkey_err, LatchkeyError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::UpgradeOutsideBlocking;
        let latchkey_err: LatchkeyError = err.into();
        assert!(matches!(latchkey_err, LatchkeyError::Session(_)));
    }

    #[test]
    fn test_from_gc_error() {
        let err = GcError::SchedulerStopped;
        let latchkey_err: LatchkeyError = err.into();
        assert!(matches!(latchkey_err, LatchkeyError::Gc(_)));
    }
}
