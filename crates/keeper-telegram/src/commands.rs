//! Admin command parsing and dispatch into the abuse guard.
//!
//! The guard itself enforces the admin allowlist; the parser only shapes
//! text into commands, so a non-admin issuing `/block` gets the guard's
//! permission error, not silence.

use chrono::{DateTime, Utc};
use keeper_guard::{AbuseGuard, BlockDuration, GuardError};

const BLOCK_USAGE: &str = "Usage: /block <user_id> <duration_days|permanent> <reason>";
const UNBLOCK_USAGE: &str = "Usage: /unblock <user_id>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Block {
        user_id: i64,
        duration: BlockDuration,
        reason: String,
    },
    Unblock {
        user_id: i64,
    },
    SecurityStatus,
}

/// Recognise one of the privileged commands in `text`.
///
/// Returns `None` for anything that is not one of ours, `Some(Err(usage))`
/// for a recognised command with malformed arguments.
pub fn parse_admin_command(text: &str) -> Option<Result<AdminCommand, String>> {
    let mut parts = text.trim().split_whitespace();
    let command = parts.next()?;
    // Tolerate the `/cmd@botname` form used in group chats.
    let command = command.split('@').next().unwrap_or(command);

    match command {
        "/block" => {
            let Some(user_id) = parts.next().and_then(|s| s.parse::<i64>().ok()) else {
                return Some(Err(BLOCK_USAGE.to_string()));
            };
            let duration = match parts.next() {
                Some(word) if word.eq_ignore_ascii_case("permanent") => BlockDuration::Permanent,
                Some(word) => match word.parse::<u32>() {
                    Ok(days) if days > 0 => BlockDuration::Days(days),
                    _ => return Some(Err(BLOCK_USAGE.to_string())),
                },
                None => return Some(Err(BLOCK_USAGE.to_string())),
            };
            let reason: Vec<&str> = parts.collect();
            let reason = if reason.is_empty() {
                "No reason provided".to_string()
            } else {
                reason.join(" ")
            };
            Some(Ok(AdminCommand::Block {
                user_id,
                duration,
                reason,
            }))
        }
        "/unblock" => match parts.next().and_then(|s| s.parse::<i64>().ok()) {
            Some(user_id) => Some(Ok(AdminCommand::Unblock { user_id })),
            None => Some(Err(UNBLOCK_USAGE.to_string())),
        },
        "/security_status" => Some(Ok(AdminCommand::SecurityStatus)),
        _ => None,
    }
}

/// Execute a parsed command on behalf of `admin_id` and produce the reply.
pub async fn dispatch_admin_command(
    command: AdminCommand,
    guard: &AbuseGuard,
    admin_id: i64,
    now: DateTime<Utc>,
) -> String {
    match command {
        AdminCommand::Block {
            user_id,
            duration,
            reason,
        } => match guard.admin_block(admin_id, user_id, duration, &reason, now).await {
            Ok(()) => {
                let duration_text = match duration {
                    BlockDuration::Days(d) => format!("for {d} day(s)"),
                    BlockDuration::Permanent => "permanently".to_string(),
                };
                format!("User {user_id} has been blocked {duration_text}.\nReason: {reason}")
            }
            Err(e) => reject(e),
        },
        AdminCommand::Unblock { user_id } => match guard.admin_unblock(admin_id, user_id).await {
            Ok(true) => format!("User {user_id} has been unblocked."),
            Ok(false) => format!("User {user_id} is not currently blocked."),
            Err(e) => reject(e),
        },
        AdminCommand::SecurityStatus => match guard.security_status(now) {
            Ok(status) => format!(
                "📊 Security status\n\n\
                 🚫 Blocked users: {}\n\
                 ⚠️ Suspicious inputs (24h): {}\n\
                 🔄 Rate-limit violations (24h): {}",
                status.blocked_users, status.suspicious_24h, status.rate_limited_24h
            ),
            Err(e) => reject(e),
        },
    }
}

fn reject(e: GuardError) -> String {
    match e {
        GuardError::Unauthorized { .. } => {
            "This command is restricted to administrators.".to_string()
        }
        other => format!("Command failed: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keeper_core::alert::LogSink;
    use keeper_core::config::SecurityConfig;
    use keeper_store::Store;
    use std::sync::Arc;

    #[test]
    fn parses_block_with_days_and_reason() {
        let cmd = parse_admin_command("/block 42 7 spamming the event feed")
            .unwrap()
            .unwrap();
        assert_eq!(
            cmd,
            AdminCommand::Block {
                user_id: 42,
                duration: BlockDuration::Days(7),
                reason: "spamming the event feed".to_string(),
            }
        );
    }

    #[test]
    fn parses_permanent_block_without_reason() {
        let cmd = parse_admin_command("/block 42 permanent").unwrap().unwrap();
        assert_eq!(
            cmd,
            AdminCommand::Block {
                user_id: 42,
                duration: BlockDuration::Permanent,
                reason: "No reason provided".to_string(),
            }
        );
    }

    #[test]
    fn malformed_block_yields_usage() {
        assert!(parse_admin_command("/block").unwrap().is_err());
        assert!(parse_admin_command("/block abc 7 x").unwrap().is_err());
        assert!(parse_admin_command("/block 42 0 x").unwrap().is_err());
        assert!(parse_admin_command("/block 42 soon x").unwrap().is_err());
    }

    #[test]
    fn parses_unblock_and_status() {
        assert_eq!(
            parse_admin_command("/unblock 42").unwrap().unwrap(),
            AdminCommand::Unblock { user_id: 42 }
        );
        assert_eq!(
            parse_admin_command("/security_status").unwrap().unwrap(),
            AdminCommand::SecurityStatus
        );
    }

    #[test]
    fn strips_bot_mention_suffix() {
        assert_eq!(
            parse_admin_command("/unblock@keeper_bot 42").unwrap().unwrap(),
            AdminCommand::Unblock { user_id: 42 }
        );
    }

    #[test]
    fn unrelated_text_is_not_a_command() {
        assert!(parse_admin_command("hello /block world").is_none());
        assert!(parse_admin_command("/register Alice").is_none());
    }

    fn guard() -> AbuseGuard {
        AbuseGuard::new(
            Store::open_in_memory().unwrap(),
            Arc::new(LogSink),
            SecurityConfig::default(),
            vec![100],
        )
    }

    #[tokio::test]
    async fn dispatch_block_then_status_then_unblock() {
        let guard = guard();
        let now = Utc::now();

        let reply = dispatch_admin_command(
            AdminCommand::Block {
                user_id: 42,
                duration: BlockDuration::Permanent,
                reason: "abuse".to_string(),
            },
            &guard,
            100,
            now,
        )
        .await;
        assert!(reply.contains("blocked permanently"));

        let reply =
            dispatch_admin_command(AdminCommand::SecurityStatus, &guard, 100, now).await;
        assert!(reply.contains("Blocked users: 1"));

        let reply =
            dispatch_admin_command(AdminCommand::Unblock { user_id: 42 }, &guard, 100, now).await;
        assert!(reply.contains("unblocked"));

        let reply =
            dispatch_admin_command(AdminCommand::Unblock { user_id: 42 }, &guard, 100, now).await;
        assert!(reply.contains("not currently blocked"));
    }

    #[tokio::test]
    async fn dispatch_by_non_admin_is_rejected() {
        let guard = guard();
        let reply = dispatch_admin_command(
            AdminCommand::Unblock { user_id: 42 },
            &guard,
            55,
            Utc::now(),
        )
        .await;
        assert!(reply.contains("restricted to administrators"));
    }
}
