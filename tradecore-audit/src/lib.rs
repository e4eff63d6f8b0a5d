#![forbid(unsafe_code)]
#![warn(missing_debug_implementations, rust_2018_idioms)]

//! Audit Log (§4.K): an append-only, per-stream hash chain recording every
//! mutating operation on a Portfolio, Order, RiskLimit or Predictor.
//! Tamper detection re-derives each record's hash from its neighbours and
//! reports the first broken link, rather than trusting the stored hash.

pub mod error;
pub mod log;
pub mod record;

pub use error::AuditError;
pub use log::{AuditLog, FileAuditLog, InMemoryAuditLog};
pub use record::{AuditRecord, NewAuditRecord, GENESIS_HASH};

/// The audit stream name for events not scoped to a single portfolio (eg/
/// predictor registry transitions).
pub const GLOBAL_STREAM: &str = "global";
