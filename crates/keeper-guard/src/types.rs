use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of inbound user action, each with its own rate-limit threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Message,
    Callback,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Message => "message",
            ActionType::Callback => "callback",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How long an administrator block lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockDuration {
    Days(u32),
    Permanent,
}

/// An active block preventing a user's actions from being admitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockRecord {
    pub user_id: i64,
    pub reason: String,
    pub blocked_at: DateTime<Utc>,
    /// `None` means permanent; only an explicit unblock removes it.
    pub expires_at: Option<DateTime<Utc>>,
    /// Admin chat ID as text, or `"system"` for automatic blocks.
    pub blocked_by: String,
}

impl BlockRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|e| e <= now)
    }
}

/// Snapshot returned to the `/security_status` admin command.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityStatus {
    pub blocked_users: u64,
    pub suspicious_24h: u64,
    pub rate_limited_24h: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn permanent_block_never_expires() {
        let rec = BlockRecord {
            user_id: 1,
            reason: "spam".into(),
            blocked_at: Utc::now(),
            expires_at: None,
            blocked_by: "system".into(),
        };
        assert!(!rec.is_expired(Utc::now() + Duration::days(3650)));
    }

    #[test]
    fn temporary_block_expires_at_boundary() {
        let now = Utc::now();
        let rec = BlockRecord {
            user_id: 1,
            reason: "spam".into(),
            blocked_at: now,
            expires_at: Some(now + Duration::days(1)),
            blocked_by: "system".into(),
        };
        assert!(!rec.is_expired(now));
        assert!(rec.is_expired(now + Duration::days(1)));
    }
}
