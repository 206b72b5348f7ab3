//! `keeper-backup` — restorable, verifiable snapshots of the store.
//!
//! A backup dumps every collection through the SQLite CLI into a working
//! directory, packs it with `tar`, checksums the archive (SHA-256, recorded
//! in the registry and a sidecar file) and registers the artifact. Restore
//! verifies the checksum before anything touches the store, then replays
//! each collection dump with drop-and-replace semantics.

pub mod archive;
pub mod error;
pub mod pipeline;
pub mod types;

pub use error::{BackupError, Result};
pub use pipeline::BackupPipeline;
pub use types::BackupArtifact;
