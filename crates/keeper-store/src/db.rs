use rusqlite::Connection;

use crate::error::Result;

/// Initialise the full schema in `conn`.
///
/// Every statement is idempotent (CREATE IF NOT EXISTS), so this runs on
/// every startup and again after a restore to put back any index the dump
/// tool did not carry over. All timestamps are RFC 3339 TEXT in UTC.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS members (
            member_id     INTEGER NOT NULL PRIMARY KEY,
            display_name  TEXT    NOT NULL,
            rank          TEXT,
            is_mentor     INTEGER NOT NULL DEFAULT 0,
            last_activity TEXT,
            created_at    TEXT    NOT NULL
        ) STRICT;
        CREATE INDEX IF NOT EXISTS idx_members_last_activity
            ON members (last_activity);

        CREATE TABLE IF NOT EXISTS events (
            id          TEXT NOT NULL PRIMARY KEY,
            title       TEXT NOT NULL,
            location    TEXT,
            starts_at   TEXT NOT NULL,
            created_by  INTEGER,
            created_at  TEXT NOT NULL
        ) STRICT;
        CREATE INDEX IF NOT EXISTS idx_events_starts_at ON events (starts_at);

        CREATE TABLE IF NOT EXISTS archived_events (
            id          TEXT NOT NULL PRIMARY KEY,
            title       TEXT NOT NULL,
            location    TEXT,
            starts_at   TEXT NOT NULL,
            created_by  INTEGER,
            created_at  TEXT NOT NULL,
            archived_at TEXT NOT NULL
        ) STRICT;

        CREATE TABLE IF NOT EXISTS subscriptions (
            id            TEXT NOT NULL PRIMARY KEY,
            subscriber_id INTEGER NOT NULL,
            subject_id    INTEGER NOT NULL,
            status        TEXT NOT NULL DEFAULT 'active',
            started_at    TEXT NOT NULL,
            expires_at    TEXT NOT NULL,
            expired_at    TEXT
        ) STRICT;
        CREATE INDEX IF NOT EXISTS idx_subscriptions_status_expiry
            ON subscriptions (status, expires_at);

        CREATE TABLE IF NOT EXISTS activity_counters (
            user_id      INTEGER NOT NULL,
            action       TEXT    NOT NULL,
            count        INTEGER NOT NULL DEFAULT 0,
            window_start TEXT    NOT NULL,
            PRIMARY KEY (user_id, action)
        ) STRICT;

        CREATE TABLE IF NOT EXISTS block_records (
            user_id    INTEGER NOT NULL PRIMARY KEY,
            reason     TEXT    NOT NULL,
            blocked_at TEXT    NOT NULL,
            expires_at TEXT,               -- NULL means permanent
            blocked_by TEXT    NOT NULL    -- admin chat ID or 'system'
        ) STRICT;

        CREATE TABLE IF NOT EXISTS security_events (
            id         TEXT    NOT NULL PRIMARY KEY,
            event_type TEXT    NOT NULL,
            user_id    INTEGER NOT NULL,
            details    TEXT    NOT NULL DEFAULT '{}',  -- JSON
            severity   TEXT    NOT NULL DEFAULT 'info',
            created_at TEXT    NOT NULL
        ) STRICT;
        CREATE INDEX IF NOT EXISTS idx_security_events_lookup
            ON security_events (event_type, user_id, created_at);

        CREATE TABLE IF NOT EXISTS health_log (
            id         TEXT NOT NULL PRIMARY KEY,
            level      TEXT NOT NULL,
            overall    TEXT NOT NULL,
            report     TEXT NOT NULL,      -- JSON HealthReport
            created_at TEXT NOT NULL
        ) STRICT;

        CREATE TABLE IF NOT EXISTS backup_artifacts (
            path             TEXT    NOT NULL PRIMARY KEY,
            created_at       TEXT    NOT NULL,
            size_bytes       INTEGER NOT NULL,
            checksum         TEXT    NOT NULL,
            retention_expiry TEXT    NOT NULL
        ) STRICT;
        CREATE INDEX IF NOT EXISTS idx_backup_artifacts_expiry
            ON backup_artifacts (retention_expiry);

        CREATE TABLE IF NOT EXISTS maintenance_log (
            id         TEXT    NOT NULL PRIMARY KEY,
            job        TEXT    NOT NULL,
            details    TEXT    NOT NULL DEFAULT '{}',  -- JSON
            success    INTEGER NOT NULL,
            created_at TEXT    NOT NULL
        ) STRICT;
        ",
    )?;
    Ok(())
}
