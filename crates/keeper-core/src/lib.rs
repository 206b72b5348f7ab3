//! `keeper-core` — shared foundation for the keeper maintenance service.
//!
//! Holds the pieces every subsystem needs: the layered configuration
//! (`keeper.toml` + `KEEPER_*` env overrides), the top-level error type,
//! and the alerting seam through which jobs and guards notify
//! administrators.

pub mod alert;
pub mod config;
pub mod error;

pub use alert::{AlertSink, LogSink, Severity};
pub use config::KeeperConfig;
pub use error::{KeeperError, Result};
