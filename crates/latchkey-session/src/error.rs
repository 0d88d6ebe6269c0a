//! Error types for the session layer.

use latchkey_protocol::ProtocolError;
use latchkey_store::StoreError;

/// Errors that can occur during session management.
///
/// A missing, expired or forged token is NOT an error: the manager falls
/// back to an anonymous session. What remains are I/O failures on the
/// store, encoding failures, and protocol misuse by the caller.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Reading, writing or releasing a session entry failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A session record could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// [`upgrade`](crate::RequestSession::upgrade) was called on a
    /// non-blocking request.
    #[error("session upgrade requires a blocking request")]
    UpgradeOutsideBlocking,

    /// The signer kept producing tokens that already name an entry.
    #[error("no unused session token after {0} attempts")]
    TokenCollision(u32),
}
