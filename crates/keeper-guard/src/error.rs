use thiserror::Error;

/// Per-action rejections and guard failures.
///
/// The `Display` text of the rejection variants is safe to echo back to the
/// user — it carries no internal diagnostics.
#[derive(Debug, Error)]
pub enum GuardError {
    /// The user has an active block record.
    #[error("You are currently blocked from using this service. Reason: {reason}")]
    Blocked { reason: String },

    /// Too many actions in the current window.
    #[error("You're sending actions too quickly. Try again in {retry_after_secs}s.")]
    RateLimited { retry_after_secs: i64 },

    /// Payload failed structural or signature validation.
    #[error("Your input could not be processed: {0}")]
    InvalidInput(String),

    /// Privileged operation attempted by a non-administrator.
    #[error("Permission denied for user {user_id}")]
    Unauthorized { user_id: i64 },

    #[error("Database error: {0}")]
    Database(String),
}

impl From<keeper_store::StoreError> for GuardError {
    fn from(e: keeper_store::StoreError) -> Self {
        GuardError::Database(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GuardError>;
