//! Job handlers: each `JobKind` maps to one operation against the shared
//! subsystems in [`JobContext`].

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use keeper_backup::BackupPipeline;
use keeper_guard::AbuseGuard;
use keeper_health::{HealthProber, ProbeLevel};
use keeper_store::Store;

use crate::error::JobError;
use crate::types::JobKind;

/// Subsystems a job run may touch. One context is shared by every job; the
/// store connection inside it is the only serialised resource. The guard is
/// the same instance the messaging adapter checks actions against.
pub struct JobContext {
    pub store: Store,
    pub backups: BackupPipeline,
    pub prober: HealthProber,
    pub guard: Arc<AbuseGuard>,
    /// Events older than this many days are archived.
    pub archive_age_days: u32,
}

/// Run one job to completion. Returns a short human-readable detail line
/// for the maintenance log.
pub async fn execute(
    kind: JobKind,
    ctx: &JobContext,
    now: DateTime<Utc>,
) -> std::result::Result<String, JobError> {
    match kind {
        JobKind::Backup => {
            let artifact = ctx.backups.backup(now).await?;
            Ok(format!(
                "artifact {} ({} bytes)",
                artifact.path, artifact.size_bytes
            ))
        }
        JobKind::BackupCleanup => {
            let removed = ctx.backups.cleanup(now).await?;
            Ok(format!("{removed} expired artifact(s) removed"))
        }
        JobKind::EventArchive => {
            let archived = archive_old_events(&ctx.store, now, ctx.archive_age_days)?;
            Ok(format!("{archived} event(s) archived"))
        }
        JobKind::SubscriptionExpiry => {
            let expired = expire_subscriptions(&ctx.store, now)?;
            Ok(format!("{expired} subscription(s) expired"))
        }
        JobKind::BlockSweep => {
            let swept = ctx.guard.sweep_expired_blocks(now)?;
            Ok(format!("{swept} expired block(s) removed"))
        }
        JobKind::HealthBasic => {
            let report = ctx.prober.run(ProbeLevel::Basic).await?;
            Ok(format!("overall {}", report.overall))
        }
        JobKind::HealthFull => {
            let report = ctx.prober.run(ProbeLevel::Comprehensive).await?;
            Ok(format!("overall {}", report.overall))
        }
    }
}

/// Move events older than `age_days` into the archive collection.
///
/// The insert is OR REPLACE so a delete that failed on a previous run
/// cannot produce duplicate archive rows.
fn archive_old_events(store: &Store, now: DateTime<Utc>, age_days: u32) -> Result<u32, JobError> {
    let cutoff = (now - Duration::days(age_days as i64)).to_rfc3339();
    let moved = store.with_conn(|c| {
        c.execute(
            "INSERT OR REPLACE INTO archived_events
             (id, title, location, starts_at, created_by, created_at, archived_at)
             SELECT id, title, location, starts_at, created_by, created_at, ?2
             FROM events WHERE starts_at < ?1",
            rusqlite::params![cutoff, now.to_rfc3339()],
        )?;
        c.execute("DELETE FROM events WHERE starts_at < ?1", [&cutoff])
    })?;
    Ok(moved as u32)
}

/// Transition active subscriptions past their expiry to `expired`.
/// Expired records are never flipped back; renewal creates a new row.
fn expire_subscriptions(store: &Store, now: DateTime<Utc>) -> Result<u32, JobError> {
    let changed = store.with_conn(|c| {
        c.execute(
            "UPDATE subscriptions SET status = 'expired', expired_at = ?2
             WHERE status = 'active' AND expires_at <= ?1",
            rusqlite::params![now.to_rfc3339(), now.to_rfc3339()],
        )
    })?;
    Ok(changed as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_subscription(store: &Store, id: &str, status: &str, expires_at: DateTime<Utc>) {
        store
            .with_conn(|c| {
                c.execute(
                    "INSERT INTO subscriptions
                     (id, subscriber_id, subject_id, status, started_at, expires_at)
                     VALUES (?1, 1, 2, ?2, ?3, ?4)",
                    rusqlite::params![
                        id,
                        status,
                        (expires_at - Duration::days(30)).to_rfc3339(),
                        expires_at.to_rfc3339()
                    ],
                )
            })
            .unwrap();
    }

    fn seed_event(store: &Store, id: &str, starts_at: DateTime<Utc>) {
        store
            .with_conn(|c| {
                c.execute(
                    "INSERT INTO events (id, title, location, starts_at, created_at)
                     VALUES (?1, 'Club night', 'Main hall', ?2, ?3)",
                    rusqlite::params![id, starts_at.to_rfc3339(), Utc::now().to_rfc3339()],
                )
            })
            .unwrap();
    }

    fn status_of(store: &Store, id: &str) -> String {
        store
            .with_conn(|c| {
                c.query_row("SELECT status FROM subscriptions WHERE id = ?1", [id], |r| {
                    r.get(0)
                })
            })
            .unwrap()
    }

    #[test]
    fn expiry_transitions_only_active_past_due() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc::now();
        seed_subscription(&store, "past-active", "active", now - Duration::days(1));
        seed_subscription(&store, "future-active", "active", now + Duration::days(1));
        seed_subscription(&store, "cancelled", "cancelled", now - Duration::days(1));

        assert_eq!(expire_subscriptions(&store, now).unwrap(), 1);
        assert_eq!(status_of(&store, "past-active"), "expired");
        assert_eq!(status_of(&store, "future-active"), "active");
        assert_eq!(status_of(&store, "cancelled"), "cancelled");
    }

    #[test]
    fn expiry_never_reactivates_expired_rows() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc::now();
        seed_subscription(&store, "already", "expired", now - Duration::days(1));
        assert_eq!(expire_subscriptions(&store, now).unwrap(), 0);
        assert_eq!(status_of(&store, "already"), "expired");
    }

    #[test]
    fn archive_moves_only_old_events() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc::now();
        seed_event(&store, "ancient", now - Duration::days(120));
        seed_event(&store, "recent", now - Duration::days(10));

        assert_eq!(archive_old_events(&store, now, 90).unwrap(), 1);

        let (live, archived): (u32, u32) = store
            .with_conn(|c| {
                Ok((
                    c.query_row("SELECT COUNT(*) FROM events", [], |r| r.get(0))?,
                    c.query_row("SELECT COUNT(*) FROM archived_events", [], |r| r.get(0))?,
                ))
            })
            .unwrap();
        assert_eq!(live, 1);
        assert_eq!(archived, 1);

        let archived_id: String = store
            .with_conn(|c| c.query_row("SELECT id FROM archived_events", [], |r| r.get(0)))
            .unwrap();
        assert_eq!(archived_id, "ancient");
    }
}
