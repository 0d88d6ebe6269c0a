//! The session manager: resolves tokens to live, locked sessions.
//!
//! This is the central piece of the session layer. It's responsible for:
//! - Validating presented tokens and locking their entries
//! - Following forward pointers left behind by re-issued tokens
//! - Re-issuing expired tokens that are still within their inactivity
//!   allowance
//! - Minting fresh entries for new sessions
//!
//! Request-scoped state (flash data, lazy session start, termination)
//! lives in [`RequestSession`].
//!
//! # Concurrency note
//!
//! `SessionManager` holds no mutable state of its own. All coordination
//! happens through the store's per-entry locks, so one manager can be
//! shared by every request thread (and separate processes can run their
//! own managers over the same container).
//!
//! ## Resolution
//!
//! ```text
//!           open_lock_if_exists(token)
//!                     │
//!      ┌──────────────┼───────────────┬──────────────────┐
//!      ▼              ▼               ▼                  ▼
//!   Active       Forwarding(next)  Reissuable         Invalid / missing
//!   hold lock    release, retry    mint successor,    release, anonymous
//!                with `next`       point old → new,
//!                                  hold new lock
//! ```

use std::sync::Arc;

use latchkey_protocol::{
    Clock, Codec, JsonCodec, Session, SessionStatus, SystemClock, Token,
    UnixTime,
};
use latchkey_store::{EntryLock, LockStore, StoreError};

use crate::request::{RequestSession, SessionRequest};
use crate::{SessionConfig, SessionError, TokenSigner};

/// How many forward pointers a single load will follow.
pub const MAX_FORWARD_HOPS: usize = 4;

/// Attempts at minting a token that doesn't already name an entry.
const MAX_MINT_ATTEMPTS: u32 = 3;

/// A session whose entry lock is held.
pub(crate) struct Held<L> {
    pub(crate) token: Token,
    pub(crate) session: Session,
    pub(crate) lock: L,
}

/// Outcome of resolving a presented token.
pub(crate) struct Resolved<L> {
    pub(crate) held: Held<L>,

    /// `true` if a new token was minted along the way.
    pub(crate) reissued: bool,
}

/// Resolves tokens and mints sessions over one session container.
///
/// Build one per process and share it; see [`load_session`](Self::load_session)
/// for the per-request entry point.
pub struct SessionManager<S: LockStore, T: TokenSigner> {
    store: S,
    signer: T,
    config: SessionConfig,
    clock: Arc<dyn Clock>,
    codec: JsonCodec,
}

impl<S: LockStore, T: TokenSigner> SessionManager<S, T> {
    /// Creates a manager over `store` using the system clock.
    pub fn new(store: S, signer: T, config: SessionConfig) -> Self {
        Self {
            store,
            signer,
            config,
            clock: Arc::new(SystemClock),
            codec: JsonCodec,
        }
    }

    /// Replaces the time source.
    pub fn with_clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// The session container.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The token signer.
    pub fn signer(&self) -> &T {
        &self.signer
    }

    /// The active configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The current time according to this manager's clock.
    pub fn now(&self) -> UnixTime {
        self.clock.now()
    }

    /// Loads the session for one request.
    ///
    /// A missing, forged, expired or unreadable token yields an anonymous
    /// session, as does a forward pointer whose successor was destroyed.
    /// Errors are reserved for store I/O after a lock was obtained and
    /// encoding failures.
    ///
    /// On non-blocking requests the session is terminated before this
    /// returns; on blocking requests its entry stays locked until
    /// [`RequestSession::finish`] (or drop).
    pub fn load_session(
        &self,
        request: &SessionRequest<'_>,
    ) -> Result<RequestSession<'_, S, T>, SessionError> {
        let mut scope = RequestSession::new(self, request.blocking);

        let Some(sealed) = request.token else {
            return Ok(scope);
        };
        let Some(raw) = self.signer.decrypt_and_verify(sealed) else {
            tracing::debug!("presented token failed verification");
            return Ok(scope);
        };

        match self.resolve(Token::new(raw))? {
            Some(resolved) => scope.adopt(resolved)?,
            None => tracing::debug!("presented token resolved to nothing"),
        }
        Ok(scope)
    }

    /// Resolves `token` to a held, active session.
    ///
    /// Returns `Ok(None)` for every "not found" outcome, including lock
    /// acquisition failures, corrupt records and forward pointers whose
    /// successor no longer exists (logged out while the predecessor was
    /// still forwarding).
    pub(crate) fn resolve(
        &self,
        token: Token,
    ) -> Result<Option<Resolved<S::Lock>>, SessionError> {
        let mut token = token;
        let mut previous: Option<Token> = None;

        for _ in 0..=MAX_FORWARD_HOPS {
            let mut lock = match self.store.open_lock_if_exists(token.as_str())
            {
                Ok(Some(lock)) => lock,
                Ok(None) => {
                    if let Some(from) = previous {
                        tracing::warn!(%from, to = %token, "forward pointer names a missing session");
                    }
                    return Ok(None);
                }
                Err(StoreError::InvalidKey(_)) => return Ok(None),
                Err(e) => {
                    tracing::warn!(%token, error = %e, "session lock unobtainable");
                    return Ok(None);
                }
            };

            let mut session = match self.read_session(&mut lock) {
                Ok(session) => session,
                Err(SessionError::Protocol(e)) => {
                    tracing::warn!(%token, error = %e, "corrupt session record");
                    lock.close()?;
                    return Ok(None);
                }
                Err(e) => return Err(e),
            };

            let now = self.now();
            match session.status(now) {
                SessionStatus::Active => {
                    return Ok(Some(Resolved {
                        held: Held {
                            token,
                            session,
                            lock,
                        },
                        reissued: false,
                    }));
                }
                SessionStatus::Forwarding(next) => {
                    lock.close()?;
                    tracing::debug!(from = %token, to = %next, "following forward pointer");
                    previous = Some(std::mem::replace(&mut token, next));
                }
                SessionStatus::Reissuable => {
                    let successor =
                        session.successor(now, self.config.lifetimes);
                    let held = self.reissue(
                        &token,
                        &mut session,
                        lock,
                        successor,
                        now,
                    )?;
                    return Ok(Some(Resolved {
                        held,
                        reissued: true,
                    }));
                }
                SessionStatus::Invalid => {
                    lock.close()?;
                    tracing::debug!(%token, "session expired");
                    return Ok(None);
                }
            }
        }

        tracing::warn!(%token, "forwarding chain too long");
        Ok(None)
    }

    /// Replaces `old` (whose lock is `old_lock`) with `successor`.
    ///
    /// The successor's entry is created and locked before the forward
    /// pointer is published, so anyone following the pointer finds a
    /// complete record (or waits for its lock).
    pub(crate) fn reissue(
        &self,
        old_token: &Token,
        old: &mut Session,
        mut old_lock: S::Lock,
        successor: Session,
        now: UnixTime,
    ) -> Result<Held<S::Lock>, SessionError> {
        let held = self.mint(successor)?;

        old.mark_superseded(now, held.token.clone());
        self.write_session(&mut old_lock, old)?;
        old_lock.close()?;

        tracing::info!(
            from = %old_token,
            to = %held.token,
            account = ?held.session.account_id,
            "session re-issued"
        );
        Ok(held)
    }

    /// Stores `session` under a freshly generated token and keeps it locked.
    pub(crate) fn mint(
        &self,
        session: Session,
    ) -> Result<Held<S::Lock>, SessionError> {
        for _ in 0..MAX_MINT_ATTEMPTS {
            let token = Token::new(self.signer.generate_token());
            let mut lock = self.store.open_lock(token.as_str())?;

            // A brand-new entry is empty; anything else is a collision.
            if !lock.read()?.is_empty() {
                lock.close()?;
                tracing::warn!(%token, "generated token already in use");
                continue;
            }

            self.write_session(&mut lock, &session)?;
            tracing::debug!(%token, "session entry created");
            return Ok(Held {
                token,
                session,
                lock,
            });
        }
        Err(SessionError::TokenCollision(MAX_MINT_ATTEMPTS))
    }

    pub(crate) fn read_session(
        &self,
        lock: &mut S::Lock,
    ) -> Result<Session, SessionError> {
        let raw = lock.read()?;
        Ok(self.codec.decode(&raw)?)
    }

    pub(crate) fn write_session(
        &self,
        lock: &mut S::Lock,
        session: &Session,
    ) -> Result<(), SessionError> {
        let raw = self.codec.encode(session)?;
        lock.overwrite(&raw)?;
        Ok(())
    }
}

// =========================================================================
// Tests
// =========================================================================
