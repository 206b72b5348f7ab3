use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackupError {
    /// The dump tool exited non-zero for a collection.
    #[error("Dump of collection '{collection}' failed: {detail}")]
    DumpFailed { collection: String, detail: String },

    /// The archive could not be written or extracted.
    #[error("Archive operation failed: {0}")]
    Archive(String),

    /// Checksum verification failed; the archive is not trusted and the
    /// store has not been touched.
    #[error("Corrupt archive: checksum mismatch (expected {expected}, got {actual})")]
    CorruptArchive { expected: String, actual: String },

    /// Neither the registry nor a sidecar file carries a checksum for the
    /// archive; restoring unverified data is refused.
    #[error("No recorded checksum for archive: {path}")]
    ChecksumMissing { path: String },

    /// The restore tool failed partway: `restored` collections were already
    /// replaced, `failed` and everything after it were not. Manual
    /// verification is required.
    #[error("Restore failed at collection '{failed}' with {} collection(s) already replaced: {detail}", .restored.len())]
    PartialRestore {
        restored: Vec<String>,
        failed: String,
        detail: String,
    },

    #[error("Database error: {0}")]
    Database(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<keeper_store::StoreError> for BackupError {
    fn from(e: keeper_store::StoreError) -> Self {
        BackupError::Database(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
