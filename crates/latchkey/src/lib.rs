//! # Latchkey
//!
//! File-locked web sessions with liminal token re-issuance.
//!
//! Sessions live as JSON entries in a directory, one file per token,
//! guarded by advisory file locks so any number of request threads or
//! worker processes can share them. Expired tokens are silently replaced
//! while still within their inactivity allowance, and a replaced token
//! keeps forwarding to its successor for a short liminal window, so
//! requests racing the rotation never lose their session.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use latchkey::prelude::*;
//!
//! let latchkey = Latchkey::open(LatchkeyConfig::default().with_root("/var/lib/app"))?;
//!
//! // Per request, with `ctx` implementing `RequestContext`:
//! // let mut session = latchkey.begin_request(&ctx)?;
//! // session.set("theme", "dark")?;
//! // if let Some(emission) = latchkey.finish(session, ctx.client_kind())? {
//! //     /* attach to the response */
//! // }
//! # Ok::<(), LatchkeyError>(())
//! ```
//!
//! ## Crates
//!
//! | Crate               | Role                                         |
//! |---------------------|----------------------------------------------|
//! | `latchkey-store`    | lockable key-value containers                |
//! | `latchkey-protocol` | session records, codecs, clocks              |
//! | `latchkey-session`  | token lifecycle and request sessions         |
//! | `latchkey-gc`       | reclaiming stale entries                     |

mod app;
mod config;
mod error;
pub mod remember;
pub mod telemetry;
pub mod throttle;
pub mod transport;

pub use app::{Latchkey, LatchkeyBuilder, Session};
pub use config::{
    ClientConfig, ConfigError, CookieConfig, LatchkeyConfig, SameSite,
    StoreBackend,
};
pub use error::LatchkeyError;

pub use latchkey_gc as gc;
pub use latchkey_protocol as protocol;
pub use latchkey_session as session;
pub use latchkey_store as store;

/// The types most hosts need.
pub mod prelude {
    pub use crate::remember::RememberMe;
    pub use crate::throttle::{Throttle, ThrottleDecision};
    pub use crate::transport::{
        ClientKind, RequestContext, TokenEmission,
    };
    pub use crate::{
        Latchkey, LatchkeyBuilder, LatchkeyConfig, LatchkeyError, Session,
    };
    pub use latchkey_gc::{GcConfig, GcReport, GcScheduler};
    pub use latchkey_protocol::{AccountId, Clock, ManualClock, SystemClock};
    pub use latchkey_session::{
        RandomTokenSigner, SessionConfig, SessionError, TokenDirective,
        TokenSigner,
    };
}
