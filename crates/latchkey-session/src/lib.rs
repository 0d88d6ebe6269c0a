//! Session lifecycle for Latchkey.
//!
//! This crate turns a [`LockStore`](latchkey_store::LockStore) of session
//! records into the request-scoped session protocol:
//!
//! 1. **Signing**: sealing raw tokens for the client ([`TokenSigner`] trait)
//! 2. **Loading**: resolving a presented token to a live session
//!    ([`SessionManager::load_session`]), following forward pointers and
//!    silently re-issuing expired-but-eligible tokens
//! 3. **Using**: reading and writing data, flash data and the CSRF value
//!    through a [`RequestSession`]
//! 4. **Upgrading**: rotating the token at login ([`RequestSession::upgrade`])
//! 5. **Terminating**: persisting and releasing the entry lock
//!
//! # How it fits in the stack
//!
//! ```text
//! Host framework (above)  ← reads/writes the client token, calls load/finish
//!     ↕
//! Session Layer (this crate)  ← token validation, rotation, flash data
//!     ↕
//! Protocol + Store (below)  ← session records, lockable entries
//! ```

mod config;
mod error;
mod manager;
mod request;
mod signer;

pub use config::SessionConfig;
pub use error::SessionError;
pub use manager::{MAX_FORWARD_HOPS, SessionManager};
pub use request::{RequestSession, SessionRequest, TokenDirective};
pub use signer::{RandomTokenSigner, TokenSigner};
