//! `keeper-guard` — inline rate limiting and abuse blocking.
//!
//! Every inbound user action passes through [`guard::AbuseGuard`] before any
//! handler sees it: active blocks reject immediately, windowed counters
//! enforce per-action thresholds, and repeated suspicious input escalates
//! into an automatic temporary block with an administrator alert.

pub mod error;
pub mod guard;
pub mod types;
pub mod validate;

pub use error::{GuardError, Result};
pub use guard::{AbuseGuard, SuspectPayload};
pub use types::{ActionType, BlockDuration, BlockRecord, SecurityStatus};
pub use validate::{FieldKind, InputValidator};
