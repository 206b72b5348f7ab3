//! Alerting seam: how maintenance jobs, health probes and the abuse guard
//! reach administrators.
//!
//! Delivery is fire-and-forget: a sink that fails to deliver logs the
//! failure and swallows it, so a broken messaging channel can never turn a
//! succeeding job into a failing one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Severity of an administrator notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    /// Emoji prefix used when formatting the message for chat delivery.
    pub fn emoji(&self) -> &'static str {
        match self {
            Severity::Info => "ℹ️",
            Severity::Warning => "⚠️",
            Severity::Error => "🚨",
            Severity::Critical => "🆘",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

/// Destination for administrator notifications.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Deliver `message` to every chat in `admin_ids`. Must not fail the
    /// caller: implementations log delivery errors and return normally.
    async fn notify(&self, admin_ids: &[i64], message: &str, severity: Severity);
}

/// Sink used when no messaging channel is configured: notifications land in
/// the process log at a level matching their severity.
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    async fn notify(&self, _admin_ids: &[i64], message: &str, severity: Severity) {
        match severity {
            Severity::Info => tracing::info!(target: "keeper::alert", "{message}"),
            Severity::Warning => tracing::warn!(target: "keeper::alert", "{message}"),
            Severity::Error | Severity::Critical => {
                tracing::error!(target: "keeper::alert", %severity, "{message}")
            }
        }
    }
}
