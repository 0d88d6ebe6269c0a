//! The `Latchkey` handle.
//!
//! This is the entry point for hosts. It ties together all the layers:
//! containers → session manager → garbage collection, plus the
//! throttle and remember-me helpers that share the same storage model.
//!
//! Build one per process and pass references down to request handlers.

use std::sync::Arc;
use std::time::Duration;

use latchkey_gc::{GarbageCollector, GcReport, GcScheduler};
use latchkey_protocol::{AccountId, Clock, SystemClock};
use latchkey_session::{
    RandomTokenSigner, RequestSession, SessionError, SessionManager,
    SessionRequest, TokenSigner,
};
use latchkey_store::FileLockStore;

use crate::config::{LatchkeyConfig, StoreBackend};
use crate::remember::RememberMe;
use crate::throttle::Throttle;
use crate::transport::{self, ClientKind, RequestContext, TokenEmission};
use crate::LatchkeyError;

/// A request's session bound to Latchkey's file containers.
pub type Session<'a, T> = RequestSession<'a, FileLockStore, T>;

/// Builder for a [`Latchkey`] handle.
///
/// # Example
///
/// ```rust,no_run
/// use latchkey::prelude::*;
///
/// let config = LatchkeyConfig::load("latchkey.toml")?;
/// let latchkey = Latchkey::builder(config).build(RandomTokenSigner)?;
/// # Ok::<(), LatchkeyError>(())
/// ```
pub struct LatchkeyBuilder {
    config: LatchkeyConfig,
    clock: Arc<dyn Clock>,
}

impl LatchkeyBuilder {
    /// Creates a builder for `config`.
    pub fn new(config: LatchkeyConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the time source of every component.
    pub fn clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Opens the containers and wires up the components.
    pub fn build<T: TokenSigner>(
        self,
        signer: T,
    ) -> Result<Latchkey<T>, LatchkeyError> {
        let config = self.config;
        let open = |dir: &std::path::Path| -> Result<FileLockStore, LatchkeyError> {
            match config.backend {
                StoreBackend::File => Ok(FileLockStore::open(dir)?
                    .with_sync_writes(config.sync_writes)),
            }
        };

        let sessions = open(config.session_dir.as_path())?;
        let remember = open(config.remember_dir.as_path())?;
        let throttle = open(config.throttle_dir.as_path())?;

        let gc = GarbageCollector::new(sessions.clone(), config.gc.clone())
            .with_timestamp_container("remember", remember.clone())
            .with_timestamp_container("throttle", throttle.clone())
            .with_clock(Arc::clone(&self.clock));
        let manager = SessionManager::new(sessions, signer, config.session.clone())
            .with_clock(Arc::clone(&self.clock));
        let remember = RememberMe::new(remember, config.remember_for)
            .with_clock(Arc::clone(&self.clock));
        let throttle = Throttle::new(throttle).with_clock(Arc::clone(&self.clock));

        tracing::info!(
            session_dir = %config.session_dir.display(),
            backend = ?config.backend,
            "latchkey ready"
        );

        Ok(Latchkey {
            config,
            manager,
            gc: Arc::new(gc),
            remember,
            throttle,
        })
    }
}

/// Sessions, garbage collection, throttling and remember-me over one set
/// of containers.
pub struct Latchkey<T: TokenSigner = RandomTokenSigner> {
    config: LatchkeyConfig,
    manager: SessionManager<FileLockStore, T>,
    gc: Arc<GarbageCollector<FileLockStore>>,
    remember: RememberMe<FileLockStore>,
    throttle: Throttle<FileLockStore>,
}

impl Latchkey<RandomTokenSigner> {
    /// Opens a handle with the development signer.
    ///
    /// Production deployments should use [`Latchkey::builder`] with a
    /// signer that actually seals tokens.
    pub fn open(config: LatchkeyConfig) -> Result<Self, LatchkeyError> {
        LatchkeyBuilder::new(config).build(RandomTokenSigner)
    }

    /// Creates a builder; the signer is chosen at
    /// [`build`](LatchkeyBuilder::build).
    pub fn builder(config: LatchkeyConfig) -> LatchkeyBuilder {
        LatchkeyBuilder::new(config)
    }
}

impl<T: TokenSigner> Latchkey<T> {
    /// The configuration this handle was built from.
    pub fn config(&self) -> &LatchkeyConfig {
        &self.config
    }

    /// The session manager over the session container.
    pub fn sessions(&self) -> &SessionManager<FileLockStore, T> {
        &self.manager
    }

    /// The rate limiter over the throttle container.
    pub fn throttle(&self) -> &Throttle<FileLockStore> {
        &self.throttle
    }

    /// Remember-me ids over the remember container.
    pub fn remember_me(&self) -> &RememberMe<FileLockStore> {
        &self.remember
    }

    /// Loads the session for an incoming request.
    ///
    /// Also gives the garbage collector its per-request chance to run. A
    /// failed pass is logged and does not fail the request.
    pub fn begin_request<C: RequestContext + ?Sized>(
        &self,
        ctx: &C,
    ) -> Result<Session<'_, T>, LatchkeyError> {
        if let Err(e) = self.gc.maybe_collect() {
            tracing::error!(error = %e, "gc pass failed");
        }

        let request = SessionRequest {
            token: transport::presented_token(ctx, &self.config.client),
            blocking: ctx.is_blocking(),
        };
        Ok(self.manager.load_session(&request)?)
    }

    /// Ends a request, returning what to attach to the response.
    pub fn finish(
        &self,
        session: Session<'_, T>,
        kind: ClientKind,
    ) -> Result<Option<TokenEmission>, LatchkeyError> {
        let directive = session.finish()?;
        Ok(transport::emit(
            &directive,
            kind,
            &self.config.cookie,
            &self.config.client,
        ))
    }

    /// Logs `session` in as `account` if `remember_id` redeems.
    ///
    /// On success the session is upgraded and a replacement id is
    /// returned for the client; otherwise the session is left alone.
    /// Non-blocking requests are refused before the id is spent.
    pub fn reauthenticate(
        &self,
        session: &mut Session<'_, T>,
        remember_id: &str,
        account: AccountId,
        roles: Vec<String>,
    ) -> Result<Option<String>, LatchkeyError> {
        if !session.is_blocking() {
            return Err(SessionError::UpgradeOutsideBlocking.into());
        }
        if !self.remember.consume(remember_id)? {
            return Ok(None);
        }
        session.upgrade(account, roles)?;
        let renewed = self.remember.issue()?;
        tracing::info!(%account, "re-authenticated from remember-me id");
        Ok(Some(renewed))
    }

    /// The cookie that hands `remember_id` to the client for
    /// `remember_for` seconds, or clears it when `None`.
    ///
    /// Pair it with [`reauthenticate`](Self::reauthenticate): send the
    /// renewed id back, or clear the cookie when redemption failed.
    pub fn remember_cookie(&self, remember_id: Option<&str>) -> TokenEmission {
        let valid_for = i64::try_from(self.config.remember_for).unwrap_or(i64::MAX);
        transport::emit_remember_id(
            remember_id,
            self.manager.now().saturating_add(valid_for),
            &self.config.cookie,
            &self.config.client,
        )
    }

    /// Runs a full garbage collection pass now.
    pub fn collect_garbage(&self) -> Result<GcReport, LatchkeyError> {
        Ok(self.gc.collect()?)
    }

    /// Starts periodic garbage collection on the current tokio runtime.
    pub fn spawn_gc(&self, interval: Duration) -> GcScheduler {
        GcScheduler::spawn(Arc::clone(&self.gc), interval)
    }
}
