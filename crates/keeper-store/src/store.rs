use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::info;

use crate::db::init_db;
use crate::error::Result;

/// Tables included in a backup, in dump order.
///
/// Restore replays them in the same order, so tables that other tables
/// reference logically (members, events) come first.
pub const COLLECTIONS: &[&str] = &[
    "members",
    "events",
    "archived_events",
    "subscriptions",
    "activity_counters",
    "block_records",
    "security_events",
    "health_log",
    "backup_artifacts",
    "maintenance_log",
];

/// Shared handle to the service's SQLite store.
///
/// Cloning is cheap; all clones share one mutex-guarded connection. The
/// file path is kept so the backup pipeline can point the dump tool at it.
#[derive(Clone)]
pub struct Store {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (creating if needed) the store at `path` and run migrations.
    pub fn open(path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        init_db(&conn)?;
        info!(path = %path, "store opened");
        Ok(Self {
            path: PathBuf::from(path),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store for tests. The path is the SQLite `:memory:` marker,
    /// so the dump tool cannot target it, so backup tests use real files.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_db(&conn)?;
        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Connectivity probe: cheapest possible round trip.
    pub fn ping(&self) -> Result<()> {
        self.with_conn(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)))?;
        Ok(())
    }

    /// Re-run schema init, used after a restore to put back indexes.
    pub fn reinit(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        init_db(&conn)
    }

    /// Run `f` with exclusive access to the connection.
    ///
    /// This is the seam every subsystem uses for its own SQL; keeping the
    /// lock scope inside one closure call bounds how long anyone holds it.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let conn = self.conn.lock().unwrap();
        Ok(f(&conn)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_succeeds_on_fresh_store() {
        let store = Store::open_in_memory().unwrap();
        store.ping().unwrap();
    }

    #[test]
    fn schema_creates_every_collection() {
        let store = Store::open_in_memory().unwrap();
        for table in COLLECTIONS {
            let n: i64 = store
                .with_conn(|c| {
                    c.query_row(
                        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                        [table],
                        |row| row.get(0),
                    )
                })
                .unwrap();
            assert_eq!(n, 1, "missing table {table}");
        }
    }

    #[test]
    fn reinit_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        store.reinit().unwrap();
        store.reinit().unwrap();
        store.ping().unwrap();
    }

    #[test]
    fn with_conn_propagates_sql_errors() {
        let store = Store::open_in_memory().unwrap();
        let res = store.with_conn(|c| c.execute("SELECT * FROM no_such_table", []));
        assert!(res.is_err());
    }
}
