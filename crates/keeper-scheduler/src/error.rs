use thiserror::Error;

/// Errors raised by the scheduler itself (not by the jobs it runs).
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A job with this name is already registered; fatal at startup.
    #[error("Duplicate job registration: {name}")]
    DuplicateJob { name: String },

    #[error("Database error: {0}")]
    Database(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

/// A job handler failure, caught by the per-job failure boundary.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Backup(#[from] keeper_backup::BackupError),

    #[error(transparent)]
    Health(#[from] keeper_health::HealthError),

    #[error(transparent)]
    Guard(#[from] keeper_guard::GuardError),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<keeper_store::StoreError> for JobError {
    fn from(e: keeper_store::StoreError) -> Self {
        JobError::Database(e.to_string())
    }
}
