//! `keeperd` — entry point for the maintenance core.
//!
//! Four modes: `bot` (scheduler + inline guard alongside message handling),
//! `maintenance` (run every job once and exit), `health` (one probe cycle),
//! `restore` (restore the store from an archive). Exit code 0 on success,
//! non-zero on any job/check failure, 2 on a configuration error.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;

use keeper_backup::BackupPipeline;
use keeper_core::alert::{AlertSink, LogSink, Severity};
use keeper_core::config::KeeperConfig;
use keeper_guard::AbuseGuard;
use keeper_health::{HealthProber, ProbeLevel};
use keeper_scheduler::{JobContext, MaintenanceScheduler};
use keeper_store::Store;
use keeper_telegram::{GuardedTelegramAdapter, TelegramSink};

#[derive(Parser)]
#[command(name = "keeperd", version, about = "Maintenance core for the community service")]
struct Cli {
    /// Config file (falls back to KEEPER_CONFIG, then ~/.keeper/keeper.toml).
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Start the scheduler and the inline guard alongside message handling.
    Bot,
    /// Run all maintenance jobs once, synchronously, then exit.
    Maintenance,
    /// Run one health probe, print the report, exit.
    Health {
        #[arg(long, default_value = "basic")]
        level: ProbeLevelArg,
    },
    /// Restore the store from a backup archive.
    Restore {
        #[arg(long)]
        backup: PathBuf,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ProbeLevelArg {
    Basic,
    Comprehensive,
}

impl From<ProbeLevelArg> for ProbeLevel {
    fn from(level: ProbeLevelArg) -> Self {
        match level {
            ProbeLevelArg::Basic => ProbeLevel::Basic,
            ProbeLevelArg::Comprehensive => ProbeLevel::Comprehensive,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keeper=info,keeperd=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let config = match KeeperConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("keeperd: {e}");
            std::process::exit(2);
        }
    };

    let code = match run(cli.mode, config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("keeperd: {e:#}");
            1
        }
    };
    std::process::exit(code);
}

async fn run(mode: Mode, config: KeeperConfig) -> anyhow::Result<i32> {
    let store = Store::open(&config.database.path)?;
    let admin_ids = config.admin_ids();

    let alerts: Arc<dyn AlertSink> = match &config.telegram {
        Some(telegram) => Arc::new(TelegramSink::new(&telegram.bot_token)),
        None => Arc::new(LogSink),
    };

    let guard = Arc::new(AbuseGuard::new(
        store.clone(),
        alerts.clone(),
        config.security.clone(),
        admin_ids.clone(),
    ));
    let prober = HealthProber::new(
        store.clone(),
        alerts.clone(),
        config.health.clone(),
        config.ranking.clone(),
        config.telegram.as_ref().map(|t| t.bot_token.clone()),
        admin_ids.clone(),
    );
    let backups = BackupPipeline::new(
        store.clone(),
        alerts.clone(),
        config.backup.clone(),
        admin_ids.clone(),
    );

    match mode {
        Mode::Bot => {
            let Some(telegram) = config.telegram.clone() else {
                anyhow::bail!("bot mode requires the [telegram] config section");
            };

            let ctx = JobContext {
                store,
                backups,
                prober,
                guard: guard.clone(),
                archive_age_days: config.maintenance.archive_age_days,
            };
            let scheduler = MaintenanceScheduler::with_default_jobs(
                ctx,
                alerts.clone(),
                admin_ids.clone(),
                &config.maintenance,
                Utc::now(),
            )?;

            let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
            let scheduler_task = tokio::spawn(scheduler.run(shutdown_rx));

            let adapter = GuardedTelegramAdapter::new(&telegram, guard);
            let adapter_task = tokio::spawn(adapter.run());

            alerts
                .notify(&admin_ids, "Keeper started successfully.", Severity::Info)
                .await;

            tokio::signal::ctrl_c().await?;
            info!("shutdown signal received — waiting for in-flight jobs");
            let _ = shutdown_tx.send(true);
            // The scheduler finishes the job it is on before exiting, so a
            // running backup or restore is never cut off mid-way.
            let _ = scheduler_task.await;
            adapter_task.abort();
            Ok(0)
        }

        Mode::Maintenance => {
            let ctx = JobContext {
                store,
                backups,
                prober,
                guard,
                archive_age_days: config.maintenance.archive_age_days,
            };
            let mut scheduler = MaintenanceScheduler::with_default_jobs(
                ctx,
                alerts,
                admin_ids,
                &config.maintenance,
                Utc::now(),
            )?;

            let outcomes = scheduler.run_all_jobs(Utc::now()).await;
            let mut all_ok = true;
            for outcome in &outcomes {
                let state = if outcome.success { "ok" } else { "FAILED" };
                println!("{:<20} {state:<7} {}", outcome.job.name(), outcome.detail);
                all_ok &= outcome.success;
            }
            Ok(if all_ok { 0 } else { 1 })
        }

        Mode::Health { level } => {
            let report = prober.run(level.into()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(if report.is_ok() { 0 } else { 1 })
        }

        Mode::Restore { backup } => {
            backups.restore(&backup).await?;
            println!("Store restored from {}", backup.display());
            Ok(0)
        }
    }
}
