use thiserror::Error;

/// Process-level errors.
///
/// Only configuration problems abort the process; every other failure is
/// scoped to the error type of the subsystem it happened in (store, guard,
/// backup, health, scheduler).
#[derive(Debug, Error)]
pub enum KeeperError {
    /// Invalid configuration; fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, KeeperError>;
