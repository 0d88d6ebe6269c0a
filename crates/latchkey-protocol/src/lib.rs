//! Session record format for Latchkey.
//!
//! This crate defines what a session looks like at rest:
//!
//! - **Types** ([`Session`], [`AccountId`], [`Token`], [`Lifetimes`]):
//!   the record stored in a session entry and the identifiers around it.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how records are turned
//!   into entry payloads and back, plus the decimal timestamp payload used
//!   by remember-me and rate-limit entries.
//! - **Time** ([`Clock`], [`SystemClock`], [`ManualClock`]): unix-second
//!   time sources, so lifecycle rules can be driven deterministically.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! ```text
//! Store (bytes) → Protocol (Session) → Session layer (request lifecycle)
//! ```

mod codec;
mod error;
mod session;
mod time;
mod types;

pub use codec::{Codec, JsonCodec, decode_timestamp, encode_timestamp};
pub use error::ProtocolError;
pub use session::{DataMap, Forwarding, Session, SessionStatus};
pub use time::{Clock, ManualClock, SystemClock, UnixTime};
pub use types::{AccountId, Lifetimes, Token};
