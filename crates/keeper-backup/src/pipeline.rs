use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use keeper_core::alert::{AlertSink, Severity};
use keeper_core::config::BackupConfig;
use keeper_store::{Store, COLLECTIONS};
use tokio::process::Command;
use tracing::{info, warn};

use crate::archive::{read_sidecar, sha256_file, sidecar_path, write_sidecar};
use crate::error::{BackupError, Result};
use crate::types::{artifact_file_name, parse_artifact_timestamp, BackupArtifact};

/// Produces, retains and restores snapshots of the store.
///
/// The artifact registry (`backup_artifacts`) is owned exclusively by this
/// pipeline; nothing else writes to it.
pub struct BackupPipeline {
    store: Store,
    alerts: Arc<dyn AlertSink>,
    admin_ids: Vec<i64>,
    cfg: BackupConfig,
}

impl BackupPipeline {
    pub fn new(
        store: Store,
        alerts: Arc<dyn AlertSink>,
        cfg: BackupConfig,
        admin_ids: Vec<i64>,
    ) -> Self {
        Self {
            store,
            alerts,
            admin_ids,
            cfg,
        }
    }

    /// Dump every collection, pack the archive, checksum and register it.
    ///
    /// On any failure the working directory and any partial artifact are
    /// removed and nothing is left registered.
    pub async fn backup(&self, now: DateTime<Utc>) -> Result<BackupArtifact> {
        let started = Instant::now();
        let dir = PathBuf::from(&self.cfg.dir);
        std::fs::create_dir_all(&dir)?;

        let work_name = format!("work_{}", now.format("%Y%m%d_%H%M%S"));
        let workdir = dir.join(&work_name);
        std::fs::create_dir_all(&workdir)?;

        let result = self.backup_inner(now, &dir, &work_name, &workdir).await;
        // The workdir is transient either way: deleted on success, swept on
        // failure so a crash loop cannot fill the disk.
        let _ = std::fs::remove_dir_all(&workdir);

        let artifact = result?;
        let secs = started.elapsed().as_secs_f64();
        info!(
            path = %artifact.path,
            size = artifact.size_bytes,
            "backup complete in {secs:.2}s"
        );
        self.alerts
            .notify(
                &self.admin_ids,
                &format!(
                    "Backup created successfully.\nLocation: {}\nSize: {:.2} MB\nDuration: {secs:.2}s",
                    artifact.path,
                    artifact.size_bytes as f64 / (1024.0 * 1024.0)
                ),
                Severity::Info,
            )
            .await;
        Ok(artifact)
    }

    async fn backup_inner(
        &self,
        now: DateTime<Utc>,
        dir: &Path,
        work_name: &str,
        workdir: &Path,
    ) -> Result<BackupArtifact> {
        for table in COLLECTIONS {
            let output = Command::new(&self.cfg.sqlite_bin)
                .arg(self.store.path())
                .arg(format!(".dump {table}"))
                .output()
                .await
                .map_err(|e| BackupError::DumpFailed {
                    collection: table.to_string(),
                    detail: format!("failed to launch {}: {e}", self.cfg.sqlite_bin),
                })?;
            if !output.status.success() {
                return Err(BackupError::DumpFailed {
                    collection: table.to_string(),
                    detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                });
            }
            std::fs::write(workdir.join(format!("{table}.sql")), &output.stdout)?;
        }

        let file_name = artifact_file_name(now);
        let artifact_path = dir.join(&file_name);
        let tar = Command::new(&self.cfg.tar_bin)
            .arg("-czf")
            .arg(&artifact_path)
            .arg("-C")
            .arg(dir)
            .arg(work_name)
            .output()
            .await
            .map_err(|e| BackupError::Archive(format!("failed to launch tar: {e}")))?;
        if !tar.status.success() {
            let _ = std::fs::remove_file(&artifact_path);
            return Err(BackupError::Archive(
                String::from_utf8_lossy(&tar.stderr).trim().to_string(),
            ));
        }

        let finish = || -> std::io::Result<(String, u64)> {
            let checksum = sha256_file(&artifact_path)?;
            write_sidecar(&artifact_path, &checksum)?;
            Ok((checksum, std::fs::metadata(&artifact_path)?.len()))
        };
        let (checksum, size_bytes) = match finish() {
            Ok(pair) => pair,
            Err(e) => {
                let _ = std::fs::remove_file(sidecar_path(&artifact_path));
                let _ = std::fs::remove_file(&artifact_path);
                return Err(e.into());
            }
        };

        let artifact = BackupArtifact {
            path: artifact_path.to_string_lossy().into_owned(),
            created_at: now,
            size_bytes,
            checksum,
            retention_expiry: now + Duration::days(self.cfg.max_age_days as i64),
        };

        if let Err(e) = self.register(&artifact) {
            let _ = std::fs::remove_file(&artifact_path);
            let _ = std::fs::remove_file(sidecar_path(&artifact_path));
            return Err(e);
        }
        Ok(artifact)
    }

    /// Delete artifacts whose retention has expired: file, sidecar and
    /// registry row. A missing file is logged and the row still removed.
    pub async fn cleanup(&self, now: DateTime<Utc>) -> Result<u32> {
        let expired: Vec<String> = self.store.with_conn(|c| {
            let mut stmt = c.prepare(
                "SELECT path FROM backup_artifacts WHERE retention_expiry <= ?1",
            )?;
            let rows = stmt
                .query_map([now.to_rfc3339()], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        let mut removed = 0u32;
        for path in &expired {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!(path = %path, "expired artifact file already gone");
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "could not remove artifact file");
                }
            }
            let _ = std::fs::remove_file(sidecar_path(Path::new(path)));
            self.store.with_conn(|c| {
                c.execute("DELETE FROM backup_artifacts WHERE path = ?1", [path])
            })?;
            removed += 1;
            info!(path = %path, "expired backup removed");
        }
        Ok(removed)
    }

    /// Restore the store from an archive.
    ///
    /// The checksum is verified before anything destructive happens. After
    /// that, each collection dump is replayed with drop-and-replace
    /// semantics; a failure partway leaves the earlier collections replaced
    /// and raises a critical alert; no automatic retry or rollback.
    pub async fn restore(&self, artifact_path: &Path) -> Result<()> {
        let expected = self.lookup_checksum(artifact_path)?;
        let actual = sha256_file(artifact_path)?;
        if actual != expected {
            return Err(BackupError::CorruptArchive { expected, actual });
        }

        let dir = PathBuf::from(&self.cfg.dir);
        std::fs::create_dir_all(&dir)?;
        let tmp = dir.join(format!("restore_{}", std::process::id()));
        std::fs::create_dir_all(&tmp)?;

        let result = self.restore_inner(artifact_path, &tmp).await;
        let _ = std::fs::remove_dir_all(&tmp);

        match result {
            Ok(()) => {
                // Dumps carry tables but not necessarily every index.
                self.store.reinit().map_err(BackupError::from)?;
                let stamp = artifact_path
                    .file_name()
                    .and_then(|n| parse_artifact_timestamp(&n.to_string_lossy()))
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "unknown".to_string());
                info!(path = %artifact_path.display(), "restore complete");
                self.alerts
                    .notify(
                        &self.admin_ids,
                        &format!(
                            "Store restored from backup {} (created {stamp}).",
                            artifact_path.display()
                        ),
                        Severity::Info,
                    )
                    .await;
                Ok(())
            }
            Err(e) => {
                if let BackupError::PartialRestore {
                    restored, failed, ..
                } = &e
                {
                    self.alerts
                        .notify(
                            &self.admin_ids,
                            &format!(
                                "RESTORE FAILED PARTWAY — manual verification required.\n\
                                 Replaced collections: {}\nFailed at: {failed}\n\
                                 The store may be inconsistent.",
                                if restored.is_empty() {
                                    "none".to_string()
                                } else {
                                    restored.join(", ")
                                }
                            ),
                            Severity::Critical,
                        )
                        .await;
                }
                Err(e)
            }
        }
    }

    async fn restore_inner(&self, artifact_path: &Path, tmp: &Path) -> Result<()> {
        let tar = Command::new(&self.cfg.tar_bin)
            .arg("-xzf")
            .arg(artifact_path)
            .arg("-C")
            .arg(tmp)
            .output()
            .await
            .map_err(|e| BackupError::Archive(format!("failed to launch tar: {e}")))?;
        if !tar.status.success() {
            return Err(BackupError::Archive(
                String::from_utf8_lossy(&tar.stderr).trim().to_string(),
            ));
        }

        let dump_dir = find_dump_dir(tmp)?;
        let mut restored: Vec<String> = Vec::new();

        for table in COLLECTIONS {
            let file = dump_dir.join(format!("{table}.sql"));
            if !file.exists() {
                // Archives from before a schema addition simply lack the file.
                warn!(collection = table, "no dump in archive — skipping");
                continue;
            }
            let output = Command::new(&self.cfg.sqlite_bin)
                .arg(self.store.path())
                .arg(format!("DROP TABLE IF EXISTS {table};"))
                .arg(format!(".read {}", file.display()))
                .output()
                .await
                .map_err(|e| BackupError::PartialRestore {
                    restored: restored.clone(),
                    failed: table.to_string(),
                    detail: format!("failed to launch {}: {e}", self.cfg.sqlite_bin),
                })?;
            if !output.status.success() {
                return Err(BackupError::PartialRestore {
                    restored,
                    failed: table.to_string(),
                    detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                });
            }
            restored.push(table.to_string());
        }
        Ok(())
    }

    // --- private helpers ---------------------------------------------------

    /// Expected checksum for an archive: the registry knows artifacts this
    /// deployment produced; the sidecar covers archives copied in from
    /// elsewhere. With neither, restoring is refused.
    fn lookup_checksum(&self, artifact_path: &Path) -> Result<String> {
        let key = artifact_path.to_string_lossy().into_owned();
        let registered: Option<String> = self.store.with_conn(|c| {
            c.query_row(
                "SELECT checksum FROM backup_artifacts WHERE path = ?1",
                [&key],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
        })?;
        if let Some(checksum) = registered {
            return Ok(checksum);
        }
        if let Some(checksum) = read_sidecar(artifact_path)? {
            return Ok(checksum);
        }
        Err(BackupError::ChecksumMissing { path: key })
    }

    fn register(&self, artifact: &BackupArtifact) -> Result<()> {
        self.store.with_conn(|c| {
            c.execute(
                "INSERT INTO backup_artifacts
                 (path, created_at, size_bytes, checksum, retention_expiry)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    artifact.path,
                    artifact.created_at.to_rfc3339(),
                    artifact.size_bytes,
                    artifact.checksum,
                    artifact.retention_expiry.to_rfc3339()
                ],
            )
        })?;
        Ok(())
    }
}

/// Locate the directory holding the `.sql` dumps inside an extracted
/// archive: either the extraction root itself or its single work dir.
fn find_dump_dir(tmp: &Path) -> Result<PathBuf> {
    let has_sql = |dir: &Path| -> bool {
        std::fs::read_dir(dir)
            .map(|entries| {
                entries.flatten().any(|e| {
                    e.path()
                        .extension()
                        .is_some_and(|ext| ext == "sql")
                })
            })
            .unwrap_or(false)
    };
    if has_sql(tmp) {
        return Ok(tmp.to_path_buf());
    }
    for entry in std::fs::read_dir(tmp)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() && has_sql(&entry.path()) {
            return Ok(entry.path());
        }
    }
    Err(BackupError::Archive(
        "archive contains no collection dumps".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use keeper_core::alert::LogSink;

    fn pipeline(store: Store, dir: &Path) -> BackupPipeline {
        let cfg = BackupConfig {
            dir: dir.to_string_lossy().into_owned(),
            ..BackupConfig::default()
        };
        BackupPipeline::new(store, Arc::new(LogSink), cfg, vec![])
    }

    fn register_row(store: &Store, path: &str, checksum: &str, expiry: DateTime<Utc>) {
        store
            .with_conn(|c| {
                c.execute(
                    "INSERT INTO backup_artifacts
                     (path, created_at, size_bytes, checksum, retention_expiry)
                     VALUES (?1, ?2, 10, ?3, ?4)",
                    rusqlite::params![path, Utc::now().to_rfc3339(), checksum, expiry.to_rfc3339()],
                )
            })
            .unwrap();
    }

    #[tokio::test]
    async fn cleanup_removes_only_expired_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open_in_memory().unwrap();
        let p = pipeline(store.clone(), dir.path());
        let now = Utc::now();

        let old = dir.path().join("keeper_backup_20200101_030000.tar.gz");
        let fresh = dir.path().join("keeper_backup_20990101_030000.tar.gz");
        std::fs::write(&old, b"old").unwrap();
        std::fs::write(&fresh, b"fresh").unwrap();
        register_row(
            &store,
            &old.to_string_lossy(),
            "aa",
            now - Duration::days(1),
        );
        register_row(
            &store,
            &fresh.to_string_lossy(),
            "bb",
            now + Duration::days(20),
        );

        assert_eq!(p.cleanup(now).await.unwrap(), 1);
        assert!(!old.exists());
        assert!(fresh.exists());

        let remaining: u32 = store
            .with_conn(|c| c.query_row("SELECT COUNT(*) FROM backup_artifacts", [], |r| r.get(0)))
            .unwrap();
        assert_eq!(remaining, 1);
    }

    #[tokio::test]
    async fn cleanup_tolerates_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open_in_memory().unwrap();
        let p = pipeline(store.clone(), dir.path());
        let now = Utc::now();

        register_row(&store, "/nonexistent/gone.tar.gz", "aa", now - Duration::days(1));
        assert_eq!(p.cleanup(now).await.unwrap(), 1);
        let remaining: u32 = store
            .with_conn(|c| c.query_row("SELECT COUNT(*) FROM backup_artifacts", [], |r| r.get(0)))
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn restore_rejects_checksum_mismatch_before_touching_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open_in_memory().unwrap();
        let p = pipeline(store.clone(), dir.path());

        let artifact = dir.path().join("keeper_backup_20260314_030000.tar.gz");
        std::fs::write(&artifact, b"tampered-bytes").unwrap();
        write_sidecar(&artifact, "0000000000000000").unwrap();

        let err = p.restore(&artifact).await.unwrap_err();
        assert!(matches!(err, BackupError::CorruptArchive { .. }));
        // The store is untouched: members table still present and empty.
        let n: u32 = store
            .with_conn(|c| c.query_row("SELECT COUNT(*) FROM members", [], |r| r.get(0)))
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn restore_refuses_without_any_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open_in_memory().unwrap();
        let p = pipeline(store, dir.path());

        let artifact = dir.path().join("keeper_backup_20260314_030000.tar.gz");
        std::fs::write(&artifact, b"bytes").unwrap();

        let err = p.restore(&artifact).await.unwrap_err();
        assert!(matches!(err, BackupError::ChecksumMissing { .. }));
    }

    #[tokio::test]
    async fn registry_checksum_takes_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open_in_memory().unwrap();
        let p = pipeline(store.clone(), dir.path());

        let artifact = dir.path().join("keeper_backup_20260314_030000.tar.gz");
        std::fs::write(&artifact, b"bytes").unwrap();
        let real = sha256_file(&artifact).unwrap();
        // Registry disagrees with the file; must reject even though no
        // sidecar exists.
        register_row(
            &store,
            &artifact.to_string_lossy(),
            "not-the-real-checksum",
            Utc::now() + Duration::days(1),
        );

        let err = p.restore(&artifact).await.unwrap_err();
        match err {
            BackupError::CorruptArchive { expected, actual } => {
                assert_eq!(expected, "not-the-real-checksum");
                assert_eq!(actual, real);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn find_dump_dir_prefers_root_then_subdir() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("work_20260314_030000");
        std::fs::create_dir_all(&sub).unwrap();
        std::fs::write(sub.join("members.sql"), b"-- dump").unwrap();
        assert_eq!(find_dump_dir(dir.path()).unwrap(), sub);

        std::fs::write(dir.path().join("events.sql"), b"-- dump").unwrap();
        assert_eq!(find_dump_dir(dir.path()).unwrap(), dir.path());
    }
}
