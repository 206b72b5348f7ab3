//! Telegram-backed alert sink.
//!
//! Delivery is fire-and-forget: per-admin send failures are logged and
//! swallowed so a broken chat never escalates into the triggering job's
//! failure.

use async_trait::async_trait;
use keeper_core::alert::{AlertSink, Severity};
use teloxide::prelude::*;
use tracing::warn;

pub struct TelegramSink {
    bot: Bot,
}

impl TelegramSink {
    pub fn new(bot_token: &str) -> Self {
        Self {
            bot: Bot::new(bot_token),
        }
    }
}

/// Message body shown to administrators.
pub fn format_alert(severity: Severity, message: &str) -> String {
    format!("{} Keeper alert ({severity})\n\n{message}", severity.emoji())
}

#[async_trait]
impl AlertSink for TelegramSink {
    async fn notify(&self, admin_ids: &[i64], message: &str, severity: Severity) {
        let formatted = format_alert(severity, message);
        for admin_id in admin_ids {
            if let Err(e) = self
                .bot
                .send_message(ChatId(*admin_id), &formatted)
                .await
            {
                warn!(admin_id, error = %e, "alert delivery failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_carries_emoji_and_severity() {
        let text = format_alert(Severity::Critical, "restore failed");
        assert!(text.starts_with("🆘"));
        assert!(text.contains("(critical)"));
        assert!(text.ends_with("restore failed"));
    }
}
