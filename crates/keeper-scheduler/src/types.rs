use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schedule::Cadence;

/// The closed set of maintenance jobs. The registry is an enum rather than
/// string-keyed handlers so an unknown job cannot exist at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Backup,
    BackupCleanup,
    EventArchive,
    SubscriptionExpiry,
    BlockSweep,
    HealthBasic,
    HealthFull,
}

impl JobKind {
    pub fn name(&self) -> &'static str {
        match self {
            JobKind::Backup => "backup",
            JobKind::BackupCleanup => "backup_cleanup",
            JobKind::EventArchive => "event_archive",
            JobKind::SubscriptionExpiry => "subscription_expiry",
            JobKind::BlockSweep => "block_sweep",
            JobKind::HealthBasic => "health_basic",
            JobKind::HealthFull => "health_full",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Outcome state of the most recent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Never run yet.
    Pending,
    Ok,
    Failed,
}

/// One registered job and its scheduling state. Registered at startup,
/// mutated after every run, never removed during the process lifetime.
#[derive(Debug, Clone)]
pub struct MaintenanceJob {
    pub kind: JobKind,
    pub cadence: Cadence,
    pub next_fire: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub last_status: JobStatus,
}

/// What one job run produced, as reported to callers of `run_due_jobs`.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub job: JobKind,
    pub success: bool,
    pub detail: String,
}
