//! Garbage collection for Latchkey containers.
//!
//! Session entries are never deleted on the request path: a superseded
//! token keeps forwarding for its liminal window, and an idle token can
//! still be re-issued until its inactivity allowance runs out. Something
//! has to reclaim them afterwards, and the same goes for the timestamp
//! entries behind remember-me ids and rate limits.
//!
//! # Running a pass
//!
//! - Per request: [`GarbageCollector::maybe_collect`] rolls the
//!   configured `probability / divisor` dice ([`GcTrigger`]).
//! - Periodically: [`GcScheduler::spawn`] runs passes on tokio's blocking
//!   pool at a fixed interval.
//! - On demand: [`GarbageCollector::collect`].
//!
//! # Session entries
//!
//! A session entry is reclaimable once its forwarding window has closed
//! or it has been idle for its whole inactivity allowance. Entries that
//! can't be decoded are reclaimed too. Session sweeps read and delete
//! without locking: a lock could in theory be granted between a
//! holder's release and the delete, and that window is accepted.
//!
//! # Timestamp entries
//!
//! Timestamp entries hold a decimal unix time. They are deleted once
//! older than `timestamp_max_age`, but only while nobody holds their
//! lock. An unparseable timestamp aborts the pass with
//! [`GcError::CorruptTimestamp`].

mod collector;
mod config;
mod error;
mod scheduler;
mod trigger;

pub use collector::{GarbageCollector, GcReport, SweepReport};
pub use config::GcConfig;
pub use error::GcError;
pub use scheduler::GcScheduler;
pub use trigger::GcTrigger;
