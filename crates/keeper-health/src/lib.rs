//! `keeper-health` — dependency health probing.
//!
//! Each probe cycle checks the store, the messaging API and the third-party
//! ranking API independently, each under its own deadline, and aggregates
//! the results into an append-only [`types::HealthReport`]. A non-ok report
//! raises one administrator alert listing the failing checks.

pub mod breaker;
pub mod error;
pub mod prober;
pub mod types;

pub use error::{HealthError, Result};
pub use prober::HealthProber;
pub use types::{CheckResult, CheckStatus, HealthReport, ProbeLevel};
