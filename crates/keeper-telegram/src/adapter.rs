//! Long-polling Telegram adapter with the abuse guard inline.
//!
//! Every message and callback query goes through the guard before anything
//! else sees it. Rejected actions get a short reason reply; admitted
//! messages fall through to the conversational command surface, which is
//! wired in by the host process.

use std::sync::Arc;

use chrono::Utc;
use keeper_core::config::TelegramConfig;
use keeper_guard::{AbuseGuard, ActionType, GuardError, SuspectPayload};
use teloxide::prelude::*;
use tracing::{debug, info, warn};

use crate::commands;

/// Telegram adapter wrapping a teloxide `Bot` + `Dispatcher`.
pub struct GuardedTelegramAdapter {
    guard: Arc<AbuseGuard>,
    config: TelegramConfig,
}

impl GuardedTelegramAdapter {
    pub fn new(config: &TelegramConfig, guard: Arc<AbuseGuard>) -> Self {
        Self {
            guard,
            config: config.clone(),
        }
    }

    /// Connect to Telegram and drive the long-polling loop.
    ///
    /// Never returns — runs for the lifetime of the process.
    pub async fn run(self) {
        let bot = Bot::new(&self.config.bot_token);
        info!("Telegram: starting long-polling dispatcher");

        let handler = dptree::entry()
            .branch(Update::filter_message().endpoint(handle_message))
            .branch(Update::filter_callback_query().endpoint(handle_callback_query));

        Dispatcher::builder(bot, handler)
            .dependencies(dptree::deps![self.guard])
            .default_handler(|_upd| async {})
            .build()
            .dispatch()
            .await;
    }
}

/// Inline checks for every inbound message:
/// 1. Bot-message filter
/// 2. Block / rate-limit admission
/// 3. Attack-pattern scan
/// 4. Admin command interception
async fn handle_message(bot: Bot, msg: Message, guard: Arc<AbuseGuard>) -> ResponseResult<()> {
    if msg.from.as_ref().map(|u| u.is_bot).unwrap_or(false) {
        return Ok(());
    }
    let Some(from) = msg.from.as_ref() else {
        return Ok(());
    };
    let user_id = from.id.0 as i64;
    let now = Utc::now();
    let text = msg.text().or(msg.caption()).unwrap_or("");

    match guard.check_and_record(user_id, ActionType::Message, now).await {
        Ok(()) => {}
        Err(e @ (GuardError::Blocked { .. } | GuardError::RateLimited { .. })) => {
            let _ = bot.send_message(msg.chat.id, e.to_string()).await;
            return Ok(());
        }
        Err(e) => {
            warn!(user_id, error = %e, "admission check errored — action dropped");
            return Ok(());
        }
    }

    if !text.is_empty() {
        if let Err(e) = guard
            .flag_suspicious(user_id, SuspectPayload::text(text), now)
            .await
        {
            let _ = bot.send_message(msg.chat.id, e.to_string()).await;
            return Ok(());
        }
    }

    if let Some(parsed) = commands::parse_admin_command(text) {
        let reply = match parsed {
            Ok(cmd) => commands::dispatch_admin_command(cmd, &guard, user_id, now).await,
            Err(usage) => usage,
        };
        let _ = bot.send_message(msg.chat.id, reply).await;
        return Ok(());
    }

    // Admitted — the conversational command surface takes over from here.
    debug!(user_id, "message admitted");
    Ok(())
}

/// Callback queries get the same admission check under their own threshold.
async fn handle_callback_query(
    bot: Bot,
    query: CallbackQuery,
    guard: Arc<AbuseGuard>,
) -> ResponseResult<()> {
    let user_id = query.from.id.0 as i64;
    let now = Utc::now();

    match guard
        .check_and_record(user_id, ActionType::Callback, now)
        .await
    {
        Ok(()) => {
            debug!(user_id, "callback admitted");
        }
        Err(e @ (GuardError::Blocked { .. } | GuardError::RateLimited { .. })) => {
            let _ = bot
                .answer_callback_query(query.id)
                .text(e.to_string())
                .show_alert(true)
                .await;
        }
        Err(e) => {
            warn!(user_id, error = %e, "admission check errored — callback dropped");
        }
    }
    Ok(())
}
