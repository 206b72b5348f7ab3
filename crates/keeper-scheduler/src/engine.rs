use std::sync::Arc;

use chrono::{DateTime, Utc};
use keeper_core::alert::{AlertSink, Severity};
use keeper_core::config::MaintenanceConfig;
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{Result, SchedulerError};
use crate::jobs::{self, JobContext};
use crate::schedule::{first_fire, next_fire_after, Cadence};
use crate::types::{JobKind, JobOutcome, JobStatus, MaintenanceJob};

/// Owns the job registry and next-fire times, and drives execution.
pub struct MaintenanceScheduler {
    jobs: Vec<MaintenanceJob>,
    ctx: JobContext,
    alerts: Arc<dyn AlertSink>,
    admin_ids: Vec<i64>,
}

impl MaintenanceScheduler {
    pub fn new(ctx: JobContext, alerts: Arc<dyn AlertSink>, admin_ids: Vec<i64>) -> Self {
        Self {
            jobs: Vec::new(),
            ctx,
            alerts,
            admin_ids,
        }
    }

    /// Build a scheduler carrying the full default job set.
    ///
    /// Registration order is execution order within one tick; backup
    /// cleanup shares the backup's cadence and is registered right after
    /// it, so it runs immediately following a backup.
    pub fn with_default_jobs(
        ctx: JobContext,
        alerts: Arc<dyn AlertSink>,
        admin_ids: Vec<i64>,
        cfg: &MaintenanceConfig,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let mut scheduler = Self::new(ctx, alerts, admin_ids);
        let backup_cadence = Cadence::Daily {
            hour: cfg.backup_hour,
            minute: cfg.backup_minute,
        };
        scheduler.register(JobKind::Backup, backup_cadence, now)?;
        scheduler.register(JobKind::BackupCleanup, backup_cadence, now)?;
        scheduler.register(
            JobKind::EventArchive,
            Cadence::Weekly {
                day: cfg.archive_weekday,
                hour: cfg.archive_hour,
                minute: 0,
            },
            now,
        )?;
        scheduler.register(
            JobKind::SubscriptionExpiry,
            Cadence::Daily {
                hour: cfg.expiry_hour,
                minute: 0,
            },
            now,
        )?;
        scheduler.register(JobKind::BlockSweep, Cadence::Interval { every_secs: 3600 }, now)?;
        scheduler.register(JobKind::HealthBasic, Cadence::Interval { every_secs: 3600 }, now)?;
        scheduler.register(
            JobKind::HealthFull,
            Cadence::Daily {
                hour: cfg.full_health_hour,
                minute: 0,
            },
            now,
        )?;
        Ok(scheduler)
    }

    /// Add a job to the registry. Duplicate names are a config error.
    pub fn register(&mut self, kind: JobKind, cadence: Cadence, now: DateTime<Utc>) -> Result<()> {
        if self.jobs.iter().any(|j| j.kind == kind) {
            return Err(SchedulerError::DuplicateJob {
                name: kind.name().to_string(),
            });
        }
        let next_fire = first_fire(&cadence, now);
        info!(job = kind.name(), next_fire = %next_fire, "job registered");
        self.jobs.push(MaintenanceJob {
            kind,
            cadence,
            next_fire,
            last_run: None,
            last_status: JobStatus::Pending,
        });
        Ok(())
    }

    pub fn jobs(&self) -> &[MaintenanceJob] {
        &self.jobs
    }

    /// Execute every job whose `next_fire` has arrived, sequentially, in
    /// registration order. A `next_fire` that fell into the past while the
    /// process was offline fires exactly once here; rescheduling collapses
    /// the missed slots.
    pub async fn run_due_jobs(&mut self, now: DateTime<Utc>) -> Vec<JobOutcome> {
        let mut outcomes = Vec::new();
        for i in 0..self.jobs.len() {
            let (kind, cadence, prior) = {
                let job = &self.jobs[i];
                if job.next_fire > now {
                    continue;
                }
                (job.kind, job.cadence, job.next_fire)
            };

            let outcome = self.run_one(kind, now).await;

            let job = &mut self.jobs[i];
            job.last_run = Some(now);
            job.last_status = if outcome.success {
                JobStatus::Ok
            } else {
                JobStatus::Failed
            };
            job.next_fire = next_fire_after(&cadence, prior, now);
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Run every registered job once, ignoring schedules: the `maintenance`
    /// CLI mode. Next-fire times advance as if the jobs had fired normally.
    pub async fn run_all_jobs(&mut self, now: DateTime<Utc>) -> Vec<JobOutcome> {
        for job in &mut self.jobs {
            job.next_fire = now;
        }
        self.run_due_jobs(now).await
    }

    /// Bot-mode loop: poll every second until `shutdown` broadcasts `true`.
    ///
    /// Shutdown is only observed between ticks, so an in-flight job
    /// (including a backup or restore) always runs to completion first.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("maintenance scheduler started");
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let outcomes = self.run_due_jobs(Utc::now()).await;
                    for o in &outcomes {
                        if !o.success {
                            warn!(job = o.job.name(), "job failed: {}", o.detail);
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("maintenance scheduler shutting down");
                        break;
                    }
                }
            }
        }
    }

    // --- private helpers ---------------------------------------------------

    /// One job run inside the failure boundary: the error is logged,
    /// recorded and reported, never propagated.
    async fn run_one(&self, kind: JobKind, now: DateTime<Utc>) -> JobOutcome {
        info!(job = kind.name(), "executing job");
        match jobs::execute(kind, &self.ctx, now).await {
            Ok(detail) => {
                info!(job = kind.name(), "job ok: {detail}");
                self.log_outcome(kind, true, &detail, now);
                JobOutcome {
                    job: kind,
                    success: true,
                    detail,
                }
            }
            Err(e) => {
                let detail = e.to_string();
                error!(job = kind.name(), "job failed: {detail}");
                self.log_outcome(kind, false, &detail, now);
                self.alerts
                    .notify(
                        &self.admin_ids,
                        &format!("Maintenance job '{}' failed:\n{detail}", kind.name()),
                        Severity::Error,
                    )
                    .await;
                JobOutcome {
                    job: kind,
                    success: false,
                    detail,
                }
            }
        }
    }

    /// Append the outcome to the maintenance log. A logging failure is
    /// itself only logged; it must not flip the job's outcome.
    fn log_outcome(&self, kind: JobKind, success: bool, detail: &str, now: DateTime<Utc>) {
        let details = serde_json::json!({ "detail": detail }).to_string();
        let res = self.ctx.store.with_conn(|c| {
            c.execute(
                "INSERT INTO maintenance_log (id, job, details, success, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    Uuid::new_v4().to_string(),
                    kind.name(),
                    details,
                    success as i64,
                    now.to_rfc3339()
                ],
            )
        });
        if let Err(e) = res {
            warn!(job = kind.name(), error = %e, "could not record maintenance log entry");
        }
    }
}
