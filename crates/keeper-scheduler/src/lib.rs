//! `keeper-scheduler` — drives the fixed set of maintenance jobs.
//!
//! One scheduler instance owns the job registry and their next-fire times;
//! [`engine::MaintenanceScheduler::run_due_jobs`] takes the clock as a
//! parameter, so tests construct isolated schedulers with a fake clock.
//! Jobs run sequentially in registration order, each inside a failure
//! boundary: a broken job is logged, reported and retried at its next
//! natural firing, never immediately.

pub mod engine;
pub mod error;
pub mod jobs;
pub mod schedule;
pub mod types;

pub use engine::MaintenanceScheduler;
pub use error::{JobError, Result, SchedulerError};
pub use jobs::JobContext;
pub use schedule::Cadence;
pub use types::{JobKind, JobOutcome, JobStatus, MaintenanceJob};
