//! `keeper-telegram` — the messaging-platform boundary.
//!
//! Three pieces live here: the Telegram-backed alert sink, the admin
//! command parser/dispatcher (`/block`, `/unblock`, `/security_status`),
//! and the long-polling adapter that runs the abuse guard inline on every
//! inbound message and callback query.

pub mod adapter;
pub mod commands;
pub mod sink;

pub use adapter::GuardedTelegramAdapter;
pub use commands::{dispatch_admin_command, parse_admin_command, AdminCommand};
pub use sink::TelegramSink;
