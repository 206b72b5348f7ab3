use thiserror::Error;

/// Prober-internal failures.
///
/// Individual check outcomes are never errors; they land in the report as
/// `failed` results. Only persisting the report itself can fail here.
#[derive(Debug, Error)]
pub enum HealthError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<keeper_store::StoreError> for HealthError {
    fn from(e: keeper_store::StoreError) -> Self {
        HealthError::Database(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HealthError>;
