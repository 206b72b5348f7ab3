use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Filename prefix for finished archives; the embedded timestamp gives
/// artifacts a stable ordering.
pub const ARTIFACT_PREFIX: &str = "keeper_backup_";
pub const ARTIFACT_SUFFIX: &str = ".tar.gz";

/// A registered, retained snapshot of the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupArtifact {
    pub path: String,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub checksum: String,
    pub retention_expiry: DateTime<Utc>,
}

/// `keeper_backup_YYYYMMDD_HHMMSS.tar.gz` for the given instant (UTC).
pub fn artifact_file_name(at: DateTime<Utc>) -> String {
    format!(
        "{ARTIFACT_PREFIX}{}{ARTIFACT_SUFFIX}",
        at.format("%Y%m%d_%H%M%S")
    )
}

/// Recover the creation instant embedded in an artifact filename.
pub fn parse_artifact_timestamp(file_name: &str) -> Option<DateTime<Utc>> {
    let stamp = file_name
        .strip_prefix(ARTIFACT_PREFIX)?
        .strip_suffix(ARTIFACT_SUFFIX)?;
    NaiveDateTime::parse_from_str(stamp, "%Y%m%d_%H%M%S")
        .ok()
        .map(|naive| naive.and_utc())
}
