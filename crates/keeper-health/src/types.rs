use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one dependency check.
///
/// Ordered by badness so the overall report status is simply the maximum
/// of its parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Ok,
    Degraded,
    Failed,
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CheckStatus::Ok => "ok",
            CheckStatus::Degraded => "degraded",
            CheckStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Result of a single named check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub latency_ms: u64,
    pub message: Option<String>,
}

impl CheckResult {
    pub fn ok(name: &str, latency_ms: u64) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Ok,
            latency_ms,
            message: None,
        }
    }

    pub fn ok_with(name: &str, latency_ms: u64, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Ok,
            latency_ms,
            message: Some(message.into()),
        }
    }

    pub fn degraded(name: &str, latency_ms: u64, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Degraded,
            latency_ms,
            message: Some(message.into()),
        }
    }

    pub fn failed(name: &str, latency_ms: u64, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Failed,
            latency_ms,
            message: Some(message.into()),
        }
    }
}

/// How much of the check set one probe cycle runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeLevel {
    /// Connectivity only: messaging API + store.
    Basic,
    /// All checks, including integrity and the inactivity scan.
    Comprehensive,
}

impl ProbeLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeLevel::Basic => "basic",
            ProbeLevel::Comprehensive => "comprehensive",
        }
    }
}

impl std::str::FromStr for ProbeLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "basic" => Ok(ProbeLevel::Basic),
            "comprehensive" => Ok(ProbeLevel::Comprehensive),
            other => Err(format!("unknown probe level: {other}")),
        }
    }
}

/// Immutable snapshot of one probe cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub timestamp: DateTime<Utc>,
    pub level: ProbeLevel,
    pub overall: CheckStatus,
    pub checks: Vec<CheckResult>,
}

impl HealthReport {
    pub fn is_ok(&self) -> bool {
        self.overall == CheckStatus::Ok
    }

    /// Checks that dragged the overall status below ok.
    pub fn failing(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks
            .iter()
            .filter(|c| c.status != CheckStatus::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_orders_by_badness() {
        assert!(CheckStatus::Ok < CheckStatus::Degraded);
        assert!(CheckStatus::Degraded < CheckStatus::Failed);
        let worst = [CheckStatus::Ok, CheckStatus::Failed, CheckStatus::Degraded]
            .into_iter()
            .max()
            .unwrap();
        assert_eq!(worst, CheckStatus::Failed);
    }

    #[test]
    fn failing_filters_ok_checks() {
        let report = HealthReport {
            timestamp: Utc::now(),
            level: ProbeLevel::Basic,
            overall: CheckStatus::Failed,
            checks: vec![
                CheckResult::ok("store", 3),
                CheckResult::failed("messaging_api", 10, "boom"),
            ],
        };
        let failing: Vec<_> = report.failing().map(|c| c.name.as_str()).collect();
        assert_eq!(failing, vec!["messaging_api"]);
    }

    #[test]
    fn probe_level_parses() {
        assert_eq!("basic".parse::<ProbeLevel>().unwrap(), ProbeLevel::Basic);
        assert!("full".parse::<ProbeLevel>().is_err());
    }
}
