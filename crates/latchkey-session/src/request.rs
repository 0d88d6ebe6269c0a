//! Request-scoped session state.
//!
//! A [`RequestSession`] is what a request handler actually talks to. It
//! owns the entry lock (when one is held), the flash data harvested at
//! load, and the [`TokenDirective`] the transport must act on once the
//! request is done.
//!
//! ## Lifecycle
//!
//! ```text
//! load_session() ──→ [Held] ──terminate()──→ [Released] ──write──→ re-lock,
//!      │               │                         ▲          apply, release
//!      │               └── finish() / drop ──────┘
//!      ▼
//!  [Anonymous] ──first write / csrf_token()──→ [Held]
//! ```
//!
//! Non-blocking requests start out released: the session is loaded,
//! terminated straight away, and every later write is write-through.

use latchkey_protocol::{AccountId, DataMap, ProtocolError, Session, Token, UnixTime};
use latchkey_store::{EntryLock, LockStore};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::manager::{Held, Resolved};
use crate::{SessionError, SessionManager, TokenSigner};

// ---------------------------------------------------------------------------
// Inputs and outputs
// ---------------------------------------------------------------------------

/// What the host knows about an incoming request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionRequest<'r> {
    /// The sealed token the client presented, if any.
    pub token: Option<&'r str>,

    /// `true` for state-changing routes that hold the lock for the whole
    /// request.
    pub blocking: bool,
}

impl<'r> SessionRequest<'r> {
    /// A request whose session lock is held until it finishes.
    pub fn blocking(token: Option<&'r str>) -> Self {
        Self {
            token,
            blocking: true,
        }
    }

    /// A request that releases the session lock right after loading.
    pub fn non_blocking(token: Option<&'r str>) -> Self {
        Self {
            token,
            blocking: false,
        }
    }
}

/// What the transport must do with the client's token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenDirective {
    /// Leave the client's token alone.
    Unchanged,

    /// Send a new token.
    Set {
        /// The token in transport form.
        sealed: String,

        /// When the client should forget it.
        expires_at: UnixTime,
    },

    /// Remove the client's token.
    Clear,
}

// ---------------------------------------------------------------------------
// RequestSession
// ---------------------------------------------------------------------------

/// The session currently bound to this request.
struct Current<L> {
    token: Token,
    session: Session,

    /// `None` once the entry has been released.
    lock: Option<L>,
}

/// One request's view of its session.
///
/// Created by [`SessionManager::load_session`]. Call
/// [`finish`](Self::finish) at the end of the request to persist, release
/// and collect the [`TokenDirective`]; dropping it instead still persists
/// and releases, but the directive is lost.
pub struct RequestSession<'m, S: LockStore, T: TokenSigner> {
    manager: &'m SessionManager<S, T>,
    blocking: bool,

    /// Once set, every write re-locks, applies, persists and releases.
    write_through: bool,
    current: Option<Current<S::Lock>>,

    /// Flash data delivered to this request.
    flash: DataMap,
    directive: TokenDirective,
}

impl<'m, S: LockStore, T: TokenSigner> RequestSession<'m, S, T> {
    pub(crate) fn new(manager: &'m SessionManager<S, T>, blocking: bool) -> Self {
        Self {
            manager,
            blocking,
            write_through: !blocking,
            current: None,
            flash: DataMap::new(),
            directive: TokenDirective::Unchanged,
        }
    }

    /// Binds a freshly resolved session to this request.
    pub(crate) fn adopt(
        &mut self,
        resolved: Resolved<S::Lock>,
    ) -> Result<(), SessionError> {
        let Held {
            token,
            mut session,
            lock,
        } = resolved.held;

        self.flash = session.harvest_flash();
        if resolved.reissued {
            self.announce(&token);
        }
        self.current = Some(Current {
            token,
            session,
            lock: Some(lock.transfer_ownership()),
        });

        if self.write_through {
            self.release()?;
        }
        Ok(())
    }

    // -- Identity ----------------------------------------------------------

    /// `true` for blocking requests.
    pub fn is_blocking(&self) -> bool {
        self.blocking
    }

    /// `true` if a session with an account is bound to this request.
    pub fn is_authenticated(&self) -> bool {
        self.account_id().is_some()
    }

    /// The account bound to this session, if any.
    pub fn account_id(&self) -> Option<AccountId> {
        self.session().and_then(|s| s.account_id)
    }

    /// The account's roles; empty for anonymous sessions.
    pub fn account_roles(&self) -> &[String] {
        self.session()
            .map(|s| s.account_roles.as_slice())
            .unwrap_or_default()
    }

    /// The raw token of the bound session.
    pub fn token(&self) -> Option<&Token> {
        self.current.as_ref().map(|c| &c.token)
    }

    /// What the transport should do with the client's token so far.
    pub fn directive(&self) -> &TokenDirective {
        &self.directive
    }

    fn session(&self) -> Option<&Session> {
        self.current.as_ref().map(|c| &c.session)
    }

    // -- Data --------------------------------------------------------------

    /// Reads a data value.
    ///
    /// Returns `None` if the key is absent or holds a different type.
    pub fn get<V: DeserializeOwned>(&self, key: &str) -> Option<V> {
        let value = self.get_value(key)?;
        serde_json::from_value(value.clone()).ok()
    }

    /// Reads a data value without conversion.
    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.session()?.data.get(key)
    }

    /// Stores a data value, starting a session if there is none.
    pub fn set<V: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: V,
    ) -> Result<(), SessionError> {
        let value = to_value(value)?;
        let key = key.into();
        self.mutate(|s| {
            s.data.insert(key, value);
        })
    }

    /// Removes a data value, returning it.
    pub fn remove(&mut self, key: &str) -> Result<Option<Value>, SessionError> {
        if self.get_value(key).is_none() {
            return Ok(None);
        }
        self.mutate(|s| s.data.remove(key))
    }

    // -- Flash data --------------------------------------------------------

    /// Reads a flash value delivered to this request.
    pub fn flash<V: DeserializeOwned>(&self, key: &str) -> Option<V> {
        let value = self.flash.get(key)?;
        serde_json::from_value(value.clone()).ok()
    }

    /// Every flash value delivered to this request.
    pub fn flashes(&self) -> &DataMap {
        &self.flash
    }

    /// Queues a flash value for the next request on this session.
    pub fn set_flash<V: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: V,
    ) -> Result<(), SessionError> {
        let value = to_value(value)?;
        let key = key.into();
        self.mutate(|s| {
            s.flash_data.insert(key, value);
        })
    }

    // -- CSRF --------------------------------------------------------------

    /// The anti-forgery value, starting a session if there is none.
    pub fn csrf_token(&mut self) -> Result<String, SessionError> {
        match self.session() {
            Some(session) => Ok(session.csrf.clone()),
            None => self.mutate(|s| s.csrf.clone()),
        }
    }

    // -- Lifecycle ---------------------------------------------------------

    /// Rebinds this request to `account` under a brand-new token.
    ///
    /// Called at login. The previous token (if any) forwards to the new
    /// one for its liminal window; data and flash data carry over, the
    /// CSRF value does not.
    ///
    /// # Errors
    /// Returns [`SessionError::UpgradeOutsideBlocking`] on a non-blocking
    /// request.
    pub fn upgrade(
        &mut self,
        account: AccountId,
        roles: Vec<String>,
    ) -> Result<(), SessionError> {
        if !self.blocking {
            return Err(SessionError::UpgradeOutsideBlocking);
        }

        let held = if self.current.is_none() {
            self.start(Some(account), roles)?
        } else {
            let Held {
                token,
                mut session,
                lock,
            } = self.held()?;
            let now = self.manager.now();
            let mut successor =
                session.successor(now, self.manager.config().lifetimes);
            successor.account_id = Some(account);
            successor.account_roles = roles;
            successor.rotate_csrf();

            let held =
                self.manager.reissue(&token, &mut session, lock, successor, now)?;
            self.announce(&held.token);
            held
        };

        tracing::info!(%account, token = %held.token, "session upgraded");
        self.store(held)
    }

    /// Persists the session and releases its lock.
    ///
    /// The request keeps working afterwards; later writes become
    /// write-through.
    pub fn terminate(&mut self) -> Result<(), SessionError> {
        self.write_through = true;
        self.release()
    }

    /// Deletes the session and tells the client to drop its token.
    pub fn destroy(&mut self) -> Result<(), SessionError> {
        self.flash.clear();
        self.directive = TokenDirective::Clear;

        let Some(current) = self.current.take() else {
            return Ok(());
        };
        let lock = match current.lock {
            Some(lock) => Some(lock),
            None => self
                .manager
                .store()
                .open_lock_if_exists(current.token.as_str())?,
        };
        if let Some(lock) = lock {
            self.manager.store().delete_unsafe(lock)?;
        }

        tracing::info!(token = %current.token, "session destroyed");
        Ok(())
    }

    /// Ends the request: persists, releases and returns the directive for
    /// the transport.
    pub fn finish(mut self) -> Result<TokenDirective, SessionError> {
        self.release()?;
        Ok(std::mem::replace(
            &mut self.directive,
            TokenDirective::Unchanged,
        ))
    }

    // -- Internals ---------------------------------------------------------

    /// Applies `f` to the locked session, persisting right away when
    /// write-through.
    fn mutate<R>(
        &mut self,
        f: impl FnOnce(&mut Session) -> R,
    ) -> Result<R, SessionError> {
        let mut held = self.held()?;
        let result = f(&mut held.session);
        self.store(held)?;
        Ok(result)
    }

    /// Puts `held` back as the current session.
    fn store(&mut self, held: Held<S::Lock>) -> Result<(), SessionError> {
        self.current = Some(Current {
            token: held.token,
            session: held.session,
            lock: Some(held.lock),
        });
        if self.write_through {
            self.release()?;
        }
        Ok(())
    }

    /// Takes the current session with its lock held, re-locking a
    /// released entry or starting a new session as needed.
    fn held(&mut self) -> Result<Held<S::Lock>, SessionError> {
        match self.current.take() {
            Some(Current {
                token,
                session,
                lock: Some(lock),
            }) => Ok(Held {
                token,
                session,
                lock,
            }),
            Some(Current {
                token, lock: None, ..
            }) => match self.manager.resolve(token)? {
                Some(resolved) => {
                    if resolved.reissued {
                        self.announce(&resolved.held.token);
                    }
                    Ok(resolved.held)
                }
                None => {
                    tracing::debug!("released session vanished; starting anew");
                    self.start(None, Vec::new())
                }
            },
            None => self.start(None, Vec::new()),
        }
    }

    /// Mints a new session for this request and announces its token.
    fn start(
        &mut self,
        account: Option<AccountId>,
        roles: Vec<String>,
    ) -> Result<Held<S::Lock>, SessionError> {
        let session = Session::new(
            account,
            roles,
            self.manager.now(),
            self.manager.config().lifetimes,
        );
        let held = self.manager.mint(session)?;
        self.announce(&held.token);
        tracing::info!(token = %held.token, "session started");
        Ok(held)
    }

    fn announce(&mut self, token: &Token) {
        let lifetimes = self.manager.config().lifetimes;
        self.directive = TokenDirective::Set {
            sealed: self.manager.signer().encrypt_for_transport(token.as_str()),
            expires_at: lifetimes.renewable_until(self.manager.now()),
        };
    }

    /// Stamps `last_used`, persists and unlocks the current entry.
    fn release(&mut self) -> Result<(), SessionError> {
        let Some(current) = self.current.as_mut() else {
            return Ok(());
        };
        let Some(mut lock) = current.lock.take() else {
            return Ok(());
        };

        current.session.last_used = self.manager.now();
        self.manager.write_session(&mut lock, &current.session)?;
        lock.close()?;
        tracing::trace!(token = %current.token, "session released");
        Ok(())
    }
}

impl<S: LockStore, T: TokenSigner> Drop for RequestSession<'_, S, T> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::error!(error = %e, "failed to release session on drop");
        }
    }
}

fn to_value<V: Serialize>(value: V) -> Result<Value, SessionError> {
    serde_json::to_value(value)
        .map_err(|e| SessionError::Protocol(ProtocolError::Encode(e)))
}
