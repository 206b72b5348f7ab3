//! `keeper-store` — thin client over the service's SQLite store.
//!
//! Owns the connection lifecycle (WAL, foreign keys), the idempotent schema
//! with its indexes, and the canonical list of collections a backup covers.
//! All domain SQL lives with the subsystem that owns the semantics; this
//! crate only hands out guarded connection access.

pub mod db;
pub mod error;
pub mod store;

pub use error::{Result, StoreError};
pub use store::{Store, COLLECTIONS};
