use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{Duration, Utc};
use keeper_core::alert::{AlertSink, Severity};
use keeper_core::config::{HealthConfig, RankingConfig};
use keeper_store::Store;
use tracing::info;
use uuid::Uuid;

use crate::breaker::Breaker;
use crate::error::Result;
use crate::types::{CheckResult, CheckStatus, HealthReport, ProbeLevel};

/// Runs the dependency checks and persists the resulting reports.
pub struct HealthProber {
    store: Store,
    alerts: Arc<dyn AlertSink>,
    admin_ids: Vec<i64>,
    cfg: HealthConfig,
    ranking_base_url: String,
    messaging_token: Option<String>,
    http: reqwest::Client,
    ranking_breaker: Mutex<Breaker>,
}

impl HealthProber {
    pub fn new(
        store: Store,
        alerts: Arc<dyn AlertSink>,
        cfg: HealthConfig,
        ranking: RankingConfig,
        messaging_token: Option<String>,
        admin_ids: Vec<i64>,
    ) -> Self {
        let ranking_breaker = Mutex::new(Breaker::new(
            cfg.breaker_threshold,
            cfg.breaker_cooldown_secs,
        ));
        Self {
            store,
            alerts,
            admin_ids,
            cfg,
            ranking_base_url: ranking.base_url,
            messaging_token,
            http: reqwest::Client::new(),
            ranking_breaker,
        }
    }

    /// Run one probe cycle at the given level.
    ///
    /// Checks execute concurrently, each under its own deadline, so one
    /// stalled dependency never delays the others. The report is persisted
    /// append-only; a non-ok overall raises one administrator alert.
    pub async fn run(&self, level: ProbeLevel) -> Result<HealthReport> {
        let checks = match level {
            ProbeLevel::Basic => {
                let (messaging, store) =
                    tokio::join!(self.check_messaging_api(), self.check_store());
                vec![messaging, store]
            }
            ProbeLevel::Comprehensive => {
                let (messaging, store, ranking, integrity, inactive) = tokio::join!(
                    self.check_messaging_api(),
                    self.check_store(),
                    self.check_ranking_api(),
                    self.check_data_integrity(),
                    self.check_inactive_users(),
                );
                vec![messaging, store, ranking, integrity, inactive]
            }
        };

        let overall = checks
            .iter()
            .map(|c| c.status)
            .max()
            .unwrap_or(CheckStatus::Ok);
        let report = HealthReport {
            timestamp: Utc::now(),
            level,
            overall,
            checks,
        };

        self.persist(&report)?;
        info!(level = level.as_str(), overall = %overall, "health probe complete");

        if !report.is_ok() {
            let failing: Vec<String> = report
                .failing()
                .map(|c| {
                    format!(
                        "• {}: {} ({}ms){}",
                        c.name,
                        c.status,
                        c.latency_ms,
                        c.message
                            .as_deref()
                            .map(|m| format!(" — {m}"))
                            .unwrap_or_default()
                    )
                })
                .collect();
            let severity = if overall == CheckStatus::Failed {
                Severity::Error
            } else {
                Severity::Warning
            };
            self.alerts
                .notify(
                    &self.admin_ids,
                    &format!("Health check: {overall}\n\n{}", failing.join("\n")),
                    severity,
                )
                .await;
        }

        Ok(report)
    }

    /// Messaging API connectivity: a `getMe` round trip.
    pub async fn check_messaging_api(&self) -> CheckResult {
        const NAME: &str = "messaging_api";
        let Some(token) = self.messaging_token.as_deref() else {
            return CheckResult::failed(NAME, 0, "bot token not configured");
        };
        let url = format!("https://api.telegram.org/bot{token}/getMe");
        let started = Instant::now();
        let req = async {
            self.http
                .get(&url)
                .send()
                .await?
                .error_for_status()
                .map(|_| ())
        };
        match tokio::time::timeout(self.deadline(), req).await {
            Ok(Ok(())) => self.timed(NAME, started),
            Ok(Err(e)) => CheckResult::failed(NAME, elapsed_ms(started), e.to_string()),
            Err(_) => CheckResult::failed(NAME, elapsed_ms(started), "timed out"),
        }
    }

    /// Store connectivity: cheapest possible round trip.
    pub async fn check_store(&self) -> CheckResult {
        const NAME: &str = "store";
        let started = Instant::now();
        match self.store.ping() {
            Ok(()) => self.timed(NAME, started),
            Err(e) => CheckResult::failed(NAME, elapsed_ms(started), e.to_string()),
        }
    }

    /// Third-party ranking API, behind the circuit breaker.
    pub async fn check_ranking_api(&self) -> CheckResult {
        const NAME: &str = "ranking_api";
        let now = Utc::now();
        if self.ranking_breaker.lock().unwrap().is_open(now) {
            return CheckResult::failed(NAME, 0, "circuit open — probe skipped");
        }

        let url = format!("{}/ui/config", self.ranking_base_url);
        let started = Instant::now();
        let req = async {
            self.http
                .get(&url)
                .send()
                .await?
                .error_for_status()
                .map(|_| ())
        };
        match tokio::time::timeout(self.deadline(), req).await {
            Ok(Ok(())) => {
                self.ranking_breaker.lock().unwrap().record_success();
                self.timed(NAME, started)
            }
            Ok(Err(e)) => {
                self.ranking_breaker.lock().unwrap().record_failure(now);
                CheckResult::failed(NAME, elapsed_ms(started), e.to_string())
            }
            Err(_) => {
                self.ranking_breaker.lock().unwrap().record_failure(now);
                CheckResult::failed(NAME, elapsed_ms(started), "timed out")
            }
        }
    }

    /// Upcoming events must have a title, a location and a known creator.
    pub async fn check_data_integrity(&self) -> CheckResult {
        const NAME: &str = "data_integrity";
        let started = Instant::now();
        let now = Utc::now();
        let horizon = now + Duration::days(7);

        let rows: std::result::Result<Vec<(String, bool, bool, bool)>, _> =
            self.store.with_conn(|c| {
                let mut stmt = c.prepare(
                    "SELECT e.id,
                            e.title = '',
                            e.location IS NULL OR e.location = '',
                            e.created_by IS NOT NULL AND m.member_id IS NULL
                     FROM events e
                     LEFT JOIN members m ON m.member_id = e.created_by
                     WHERE e.starts_at >= ?1 AND e.starts_at <= ?2",
                )?;
                let rows = stmt
                    .query_map([now.to_rfc3339(), horizon.to_rfc3339()], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            });

        let rows = match rows {
            Ok(rows) => rows,
            Err(e) => return CheckResult::failed(NAME, elapsed_ms(started), e.to_string()),
        };

        let mut issues = Vec::new();
        for (id, no_title, no_location, bad_creator) in &rows {
            if *no_title {
                issues.push(format!("event {id} has no title"));
            }
            if *no_location {
                issues.push(format!("event {id} has no location"));
            }
            if *bad_creator {
                issues.push(format!("event {id} has an unknown creator"));
            }
        }

        if issues.is_empty() {
            CheckResult::ok_with(
                NAME,
                elapsed_ms(started),
                format!("{} upcoming events verified", rows.len()),
            )
        } else {
            CheckResult::failed(NAME, elapsed_ms(started), issues.join("; "))
        }
    }

    /// Informational scan: members without recent activity.
    pub async fn check_inactive_users(&self) -> CheckResult {
        const NAME: &str = "inactive_users";
        let started = Instant::now();
        let cutoff = Utc::now() - Duration::days(self.cfg.inactive_days as i64);
        let count: std::result::Result<u64, _> = self.store.with_conn(|c| {
            c.query_row(
                "SELECT COUNT(*) FROM members WHERE last_activity < ?1",
                [cutoff.to_rfc3339()],
                |r| r.get(0),
            )
        });
        match count {
            Ok(n) => CheckResult::ok_with(
                NAME,
                elapsed_ms(started),
                format!(
                    "{n} member(s) inactive for more than {} days",
                    self.cfg.inactive_days
                ),
            ),
            Err(e) => CheckResult::failed(NAME, elapsed_ms(started), e.to_string()),
        }
    }

    // --- private helpers ---------------------------------------------------

    fn deadline(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cfg.check_timeout_secs)
    }

    /// Classify a successful check by its latency.
    fn timed(&self, name: &str, started: Instant) -> CheckResult {
        let latency = elapsed_ms(started);
        if latency > self.cfg.degraded_latency_ms {
            CheckResult::degraded(name, latency, "latency above threshold")
        } else {
            CheckResult::ok(name, latency)
        }
    }

    fn persist(&self, report: &HealthReport) -> Result<()> {
        let json = serde_json::to_string(report)?;
        self.store.with_conn(|c| {
            c.execute(
                "INSERT INTO health_log (id, level, overall, report, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    Uuid::new_v4().to_string(),
                    report.level.as_str(),
                    report.overall.to_string(),
                    json,
                    report.timestamp.to_rfc3339()
                ],
            )
        })?;
        Ok(())
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use keeper_core::config::{HealthConfig, RankingConfig};

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<(String, Severity)>>,
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        async fn notify(&self, _admin_ids: &[i64], message: &str, severity: Severity) {
            self.sent.lock().unwrap().push((message.to_string(), severity));
        }
    }

    fn prober(store: Store, sink: Arc<RecordingSink>) -> HealthProber {
        HealthProber::new(
            store,
            sink,
            HealthConfig::default(),
            RankingConfig::default(),
            None,
            vec![1],
        )
    }

    fn seed_member(store: &Store, id: i64, last_activity: Option<chrono::DateTime<Utc>>) {
        store
            .with_conn(|c| {
                c.execute(
                    "INSERT INTO members (member_id, display_name, last_activity, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![
                        id,
                        format!("member-{id}"),
                        last_activity.map(|t| t.to_rfc3339()),
                        Utc::now().to_rfc3339()
                    ],
                )
            })
            .unwrap();
    }

    fn seed_event(store: &Store, id: &str, title: &str, location: Option<&str>, creator: Option<i64>) {
        store
            .with_conn(|c| {
                c.execute(
                    "INSERT INTO events (id, title, location, starts_at, created_by, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    rusqlite::params![
                        id,
                        title,
                        location,
                        (Utc::now() + Duration::days(2)).to_rfc3339(),
                        creator,
                        Utc::now().to_rfc3339()
                    ],
                )
            })
            .unwrap();
    }

    #[tokio::test]
    async fn store_check_is_ok_on_live_store() {
        let store = Store::open_in_memory().unwrap();
        let p = prober(store, Arc::new(RecordingSink::default()));
        let result = p.check_store().await;
        assert_eq!(result.status, CheckStatus::Ok);
    }

    #[tokio::test]
    async fn messaging_check_fails_without_token() {
        let store = Store::open_in_memory().unwrap();
        let p = prober(store, Arc::new(RecordingSink::default()));
        let result = p.check_messaging_api().await;
        assert_eq!(result.status, CheckStatus::Failed);
    }

    #[tokio::test]
    async fn integrity_flags_broken_events() {
        let store = Store::open_in_memory().unwrap();
        seed_member(&store, 1, None);
        seed_event(&store, "good", "Club night", Some("Main hall"), Some(1));
        seed_event(&store, "bad-loc", "Tournament", None, Some(1));
        seed_event(&store, "bad-creator", "Workshop", Some("Annex"), Some(99));

        let p = prober(store, Arc::new(RecordingSink::default()));
        let result = p.check_data_integrity().await;
        assert_eq!(result.status, CheckStatus::Failed);
        let msg = result.message.unwrap();
        assert!(msg.contains("bad-loc"));
        assert!(msg.contains("bad-creator"));
        assert!(!msg.contains("event good"));
    }

    #[tokio::test]
    async fn integrity_is_ok_on_clean_events() {
        let store = Store::open_in_memory().unwrap();
        seed_member(&store, 1, None);
        seed_event(&store, "good", "Club night", Some("Main hall"), Some(1));
        let p = prober(store, Arc::new(RecordingSink::default()));
        assert_eq!(p.check_data_integrity().await.status, CheckStatus::Ok);
    }

    #[tokio::test]
    async fn inactive_scan_counts_stale_members() {
        let store = Store::open_in_memory().unwrap();
        seed_member(&store, 1, Some(Utc::now() - Duration::days(90)));
        seed_member(&store, 2, Some(Utc::now()));
        let p = prober(store, Arc::new(RecordingSink::default()));
        let result = p.check_inactive_users().await;
        assert_eq!(result.status, CheckStatus::Ok);
        assert!(result.message.unwrap().starts_with("1 member(s)"));
    }

    #[tokio::test]
    async fn basic_run_persists_report_and_alerts_on_failure() {
        let store = Store::open_in_memory().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let p = prober(store.clone(), sink.clone());

        // No messaging token: the messaging check fails, store is fine.
        let report = p.run(ProbeLevel::Basic).await.unwrap();
        assert_eq!(report.overall, CheckStatus::Failed);
        assert_eq!(report.checks.len(), 2);

        let logged: u32 = store
            .with_conn(|c| c.query_row("SELECT COUNT(*) FROM health_log", [], |r| r.get(0)))
            .unwrap();
        assert_eq!(logged, 1);
        assert_eq!(sink.sent.lock().unwrap().len(), 1);
    }
}
