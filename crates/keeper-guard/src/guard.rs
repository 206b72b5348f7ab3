use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use keeper_core::alert::{AlertSink, Severity};
use keeper_core::config::SecurityConfig;
use keeper_store::Store;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{GuardError, Result};
use crate::types::{ActionType, BlockDuration, BlockRecord, SecurityStatus};
use crate::validate::{FieldKind, InputValidator};

/// Everything the guard inspects about one suspicious inbound payload.
pub struct SuspectPayload<'a> {
    /// Raw message text, scanned for attack shapes.
    pub text: &'a str,
    /// Structured fields extracted by the command surface, each validated
    /// against its pattern.
    pub fields: Vec<(FieldKind, &'a str)>,
    /// Hex HMAC-SHA256 signature over `text`, when the payload is signed.
    pub signature: Option<&'a str>,
}

impl<'a> SuspectPayload<'a> {
    pub fn text(text: &'a str) -> Self {
        Self {
            text,
            fields: Vec::new(),
            signature: None,
        }
    }
}

/// Inline admission control plus abuse escalation.
///
/// One instance is shared by the messaging adapter (every inbound action)
/// and the scheduler (hourly expired-block sweep).
pub struct AbuseGuard {
    store: Store,
    alerts: Arc<dyn AlertSink>,
    admin_ids: Vec<i64>,
    cfg: SecurityConfig,
    validator: InputValidator,
}

impl AbuseGuard {
    pub fn new(
        store: Store,
        alerts: Arc<dyn AlertSink>,
        cfg: SecurityConfig,
        admin_ids: Vec<i64>,
    ) -> Self {
        let validator = InputValidator::new(&cfg.secret);
        Self {
            store,
            alerts,
            admin_ids,
            cfg,
            validator,
        }
    }

    pub fn validator(&self) -> &InputValidator {
        &self.validator
    }

    /// Admit or reject one inbound action.
    ///
    /// Order matters: an active block rejects before any counter is touched,
    /// so blocked traffic never consumes rate-limit quota. On admission the
    /// member's `last_activity` is refreshed.
    pub async fn check_and_record(
        &self,
        user_id: i64,
        action: ActionType,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(block) = self.active_block(user_id, now)? {
            self.record_event(
                "blocked_attempt",
                user_id,
                serde_json::json!({ "action": action.as_str() }),
                "info",
                now,
            )?;
            return Err(GuardError::Blocked {
                reason: block.reason,
            });
        }

        let limit = match action {
            ActionType::Message => self.cfg.message_limit,
            ActionType::Callback => self.cfg.callback_limit,
        };
        let (count, window_start) = self.bump_counter(user_id, action, now)?;

        if count > limit {
            self.record_event(
                "rate_limit_exceeded",
                user_id,
                serde_json::json!({
                    "action": action.as_str(),
                    "count": count,
                    "limit": limit,
                    "window_secs": self.cfg.window_secs,
                }),
                "warning",
                now,
            )?;

            // Alert once per window, when the count first passes double the
            // limit — persistent flooding, not a momentary burst.
            if count == limit * 2 + 1 {
                self.alerts
                    .notify(
                        &self.admin_ids,
                        &format!(
                            "Rate limit significantly exceeded:\n\
                             User ID: {user_id}\nAction: {action}\n\
                             Count: {count}/{limit} in {}s",
                            self.cfg.window_secs
                        ),
                        Severity::Warning,
                    )
                    .await;
            }

            let window_end = window_start + Duration::seconds(self.cfg.window_secs as i64);
            return Err(GuardError::RateLimited {
                retry_after_secs: (window_end - now).num_seconds().max(1),
            });
        }

        self.touch_member(user_id, now)?;
        Ok(())
    }

    /// Validate a suspicious payload and record a strike on failure.
    ///
    /// When the strikes inside the rolling window reach the configured
    /// threshold and the user is not already blocked, exactly one temporary
    /// system block is created and exactly one administrator alert sent.
    pub async fn flag_suspicious(
        &self,
        user_id: i64,
        payload: SuspectPayload<'_>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut reason: Option<String> = None;

        if let Some(fragment) = self.validator.detect_attack(payload.text) {
            reason = Some(format!("attack pattern detected: {fragment}"));
        }
        if reason.is_none() {
            for (kind, value) in &payload.fields {
                if !self.validator.validate_field(*kind, value) {
                    reason = Some(format!("malformed {kind:?} field"));
                    break;
                }
            }
        }
        if reason.is_none() {
            if let Some(sig) = payload.signature {
                if !self.validator.verify(payload.text, sig) {
                    reason = Some("payload signature mismatch".to_string());
                }
            }
        }

        let Some(reason) = reason else {
            return Ok(());
        };

        self.record_event(
            "suspicious_input",
            user_id,
            serde_json::json!({ "reason": reason, "text_len": payload.text.len() }),
            "warning",
            now,
        )?;

        let since = now - Duration::hours(self.cfg.strike_window_hours as i64);
        let strikes: u32 = self.store.with_conn(|c| {
            c.query_row(
                "SELECT COUNT(*) FROM security_events
                 WHERE event_type = 'suspicious_input' AND user_id = ?1 AND created_at > ?2",
                rusqlite::params![user_id, since.to_rfc3339()],
                |row| row.get(0),
            )
        })?;

        if strikes >= self.cfg.strike_threshold && self.active_block(user_id, now)?.is_none() {
            let block_reason = format!("Automatic block: repeated suspicious input ({reason})");
            let expires = now + Duration::days(self.cfg.auto_block_days as i64);
            self.insert_block(user_id, &block_reason, Some(expires), "system", now)?;
            self.record_event(
                "user_blocked",
                user_id,
                serde_json::json!({ "reason": block_reason, "blocked_by": "system" }),
                "warning",
                now,
            )?;
            warn!(user_id, strikes, "automatic temporary block created");
            self.alerts
                .notify(
                    &self.admin_ids,
                    &format!(
                        "User {user_id} automatically blocked for {} day(s):\n\
                         {strikes} suspicious inputs within {}h.\nLast reason: {reason}",
                        self.cfg.auto_block_days, self.cfg.strike_window_hours
                    ),
                    Severity::Warning,
                )
                .await;
        }

        Err(GuardError::InvalidInput(reason))
    }

    /// Block a user. Privileged: `admin_id` must be a configured admin.
    pub async fn admin_block(
        &self,
        admin_id: i64,
        user_id: i64,
        duration: BlockDuration,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure_admin(admin_id)?;
        let expires = match duration {
            BlockDuration::Days(d) => Some(now + Duration::days(d as i64)),
            BlockDuration::Permanent => None,
        };
        self.insert_block(user_id, reason, expires, &admin_id.to_string(), now)?;
        self.record_event(
            "user_blocked",
            user_id,
            serde_json::json!({ "reason": reason, "blocked_by": admin_id }),
            "warning",
            now,
        )?;
        let duration_text = match duration {
            BlockDuration::Days(d) => format!("{d} day(s)"),
            BlockDuration::Permanent => "permanent".to_string(),
        };
        self.alerts
            .notify(
                &self.admin_ids,
                &format!(
                    "User blocked:\nUser ID: {user_id}\nReason: {reason}\nDuration: {duration_text}"
                ),
                Severity::Warning,
            )
            .await;
        Ok(())
    }

    /// Remove a block regardless of its expiry. Returns `false` when the
    /// user had no block. Privileged.
    pub async fn admin_unblock(&self, admin_id: i64, user_id: i64) -> Result<bool> {
        self.ensure_admin(admin_id)?;
        let removed = self.store.with_conn(|c| {
            c.execute("DELETE FROM block_records WHERE user_id = ?1", [user_id])
        })?;
        if removed == 0 {
            return Ok(false);
        }
        self.record_event(
            "user_unblocked",
            user_id,
            serde_json::json!({ "admin_id": admin_id }),
            "info",
            Utc::now(),
        )?;
        self.alerts
            .notify(
                &self.admin_ids,
                &format!("User unblocked:\nUser ID: {user_id}"),
                Severity::Info,
            )
            .await;
        Ok(true)
    }

    /// Counts for the `/security_status` report.
    pub fn security_status(&self, now: DateTime<Utc>) -> Result<SecurityStatus> {
        let day_ago = (now - Duration::hours(24)).to_rfc3339();
        self.store
            .with_conn(|c| {
                let blocked_users: u64 =
                    c.query_row("SELECT COUNT(*) FROM block_records", [], |r| r.get(0))?;
                let suspicious_24h: u64 = c.query_row(
                    "SELECT COUNT(*) FROM security_events
                     WHERE event_type = 'suspicious_input' AND created_at > ?1",
                    [&day_ago],
                    |r| r.get(0),
                )?;
                let rate_limited_24h: u64 = c.query_row(
                    "SELECT COUNT(*) FROM security_events
                     WHERE event_type = 'rate_limit_exceeded' AND created_at > ?1",
                    [&day_ago],
                    |r| r.get(0),
                )?;
                Ok(SecurityStatus {
                    blocked_users,
                    suspicious_24h,
                    rate_limited_24h,
                })
            })
            .map_err(Into::into)
    }

    /// Bulk-delete expired temporary blocks. Driven hourly by the scheduler.
    pub fn sweep_expired_blocks(&self, now: DateTime<Utc>) -> Result<u32> {
        let removed = self.store.with_conn(|c| {
            c.execute(
                "DELETE FROM block_records
                 WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                [now.to_rfc3339()],
            )
        })?;
        if removed > 0 {
            info!(count = removed, "expired blocks swept");
        }
        Ok(removed as u32)
    }

    // --- private helpers ---------------------------------------------------

    fn ensure_admin(&self, admin_id: i64) -> Result<()> {
        if self.admin_ids.contains(&admin_id) {
            Ok(())
        } else {
            Err(GuardError::Unauthorized { user_id: admin_id })
        }
    }

    /// Fetch the user's block, deleting it when already expired; this is the
    /// automatic Blocked(temporary) → Unblocked transition.
    fn active_block(&self, user_id: i64, now: DateTime<Utc>) -> Result<Option<BlockRecord>> {
        let rec: Option<BlockRecord> = self.store.with_conn(|c| {
            c.query_row(
                "SELECT user_id, reason, blocked_at, expires_at, blocked_by
                 FROM block_records WHERE user_id = ?1",
                [user_id],
                |row| {
                    Ok(BlockRecord {
                        user_id: row.get(0)?,
                        reason: row.get(1)?,
                        blocked_at: parse_ts(&row.get::<_, String>(2)?),
                        expires_at: row.get::<_, Option<String>>(3)?.map(|s| parse_ts(&s)),
                        blocked_by: row.get(4)?,
                    })
                },
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
        })?;

        match rec {
            Some(rec) if rec.is_expired(now) => {
                self.store.with_conn(|c| {
                    c.execute("DELETE FROM block_records WHERE user_id = ?1", [user_id])
                })?;
                info!(user_id, "temporary block expired — user unblocked");
                Ok(None)
            }
            other => Ok(other),
        }
    }

    fn insert_block(
        &self,
        user_id: i64,
        reason: &str,
        expires_at: Option<DateTime<Utc>>,
        blocked_by: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.store.with_conn(|c| {
            c.execute(
                "INSERT OR REPLACE INTO block_records
                 (user_id, reason, blocked_at, expires_at, blocked_by)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    user_id,
                    reason,
                    now.to_rfc3339(),
                    expires_at.map(|e| e.to_rfc3339()),
                    blocked_by
                ],
            )
        })?;
        Ok(())
    }

    /// Increment the windowed counter, resetting it when the window has
    /// elapsed. Returns the new count and the window start.
    fn bump_counter(
        &self,
        user_id: i64,
        action: ActionType,
        now: DateTime<Utc>,
    ) -> Result<(u32, DateTime<Utc>)> {
        let window = Duration::seconds(self.cfg.window_secs as i64);
        let existing: Option<(u32, String)> = self.store.with_conn(|c| {
            c.query_row(
                "SELECT count, window_start FROM activity_counters
                 WHERE user_id = ?1 AND action = ?2",
                rusqlite::params![user_id, action.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
        })?;

        match existing {
            None => {
                self.store.with_conn(|c| {
                    c.execute(
                        "INSERT INTO activity_counters (user_id, action, count, window_start)
                         VALUES (?1, ?2, 1, ?3)",
                        rusqlite::params![user_id, action.as_str(), now.to_rfc3339()],
                    )
                })?;
                Ok((1, now))
            }
            Some((_, window_start)) if parse_ts(&window_start) + window <= now => {
                self.store.with_conn(|c| {
                    c.execute(
                        "UPDATE activity_counters SET count = 1, window_start = ?3
                         WHERE user_id = ?1 AND action = ?2",
                        rusqlite::params![user_id, action.as_str(), now.to_rfc3339()],
                    )
                })?;
                Ok((1, now))
            }
            Some((count, window_start)) => {
                let new_count = count + 1;
                self.store.with_conn(|c| {
                    c.execute(
                        "UPDATE activity_counters SET count = ?3
                         WHERE user_id = ?1 AND action = ?2",
                        rusqlite::params![user_id, action.as_str(), new_count],
                    )
                })?;
                Ok((new_count, parse_ts(&window_start)))
            }
        }
    }

    fn touch_member(&self, user_id: i64, now: DateTime<Utc>) -> Result<()> {
        self.store.with_conn(|c| {
            c.execute(
                "UPDATE members SET last_activity = ?1 WHERE member_id = ?2",
                rusqlite::params![now.to_rfc3339(), user_id],
            )
        })?;
        Ok(())
    }

    fn record_event(
        &self,
        event_type: &str,
        user_id: i64,
        details: serde_json::Value,
        severity: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.store.with_conn(|c| {
            c.execute(
                "INSERT INTO security_events (id, event_type, user_id, details, severity, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    Uuid::new_v4().to_string(),
                    event_type,
                    user_id,
                    details.to_string(),
                    severity,
                    now.to_rfc3339()
                ],
            )
        })?;
        Ok(())
    }
}

/// Parse an RFC 3339 timestamp written by this crate; rows are only ever
/// written through `to_rfc3339`, so a parse failure means external
/// tampering; fall back to the epoch so the record reads as expired.
fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| DateTime::<Utc>::MIN_UTC)
}
