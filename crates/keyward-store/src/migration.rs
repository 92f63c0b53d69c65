//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    // Create migrations table if it doesn't exist
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    // Get current version
    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    // Apply migrations
    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Admitted users
        CREATE TABLE users (
            user_id INTEGER PRIMARY KEY,      -- caller-assigned identifier
            admitted_at INTEGER NOT NULL      -- Unix ms
        );

        -- Registered devices, one row per fingerprint per user
        CREATE TABLE devices (
            device_id BLOB NOT NULL,          -- 32 bytes, fingerprint of canonical attributes
            user_id INTEGER NOT NULL,
            device_class TEXT NOT NULL,       -- 'mobile' | 'laptop'
            platform TEXT NOT NULL,
            device_name TEXT,                 -- nullable, caller-supplied label
            attributes BLOB NOT NULL,         -- canonical attribute map bytes
            public_key BLOB NOT NULL,         -- 32 bytes, X25519
            is_active INTEGER NOT NULL DEFAULT 1,
            registered_at INTEGER NOT NULL,   -- Unix ms
            last_seen INTEGER NOT NULL,       -- Unix ms

            PRIMARY KEY (user_id, device_id)
        );

        -- The quota rule: at most one active device per class per user.
        -- Enforced here so concurrent registrations serialize in the engine
        -- and exactly one wins.
        CREATE UNIQUE INDEX idx_devices_active_class
            ON devices(user_id, device_class) WHERE is_active = 1;

        -- Content catalog
        CREATE TABLE contents (
            content_id BLOB PRIMARY KEY,      -- 32 bytes, hash of the encrypted payload
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            kind TEXT NOT NULL,               -- 'video' | 'pdf' | 'audio'
            payload_path TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,      -- encrypted payload size
            duration_secs INTEGER,            -- nullable, absent for documents
            thumbnail_path TEXT,              -- nullable, unencrypted preview image
            key_id BLOB NOT NULL,             -- 16 bytes, custody handle
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL       -- Unix ms
        );

        -- Append-only access log
        CREATE TABLE access_events (
            event_id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            content_id BLOB NOT NULL,
            device_id BLOB NOT NULL,
            kind TEXT NOT NULL,               -- 'download' | 'stream' | 'view'
            at INTEGER NOT NULL,              -- Unix ms
            remote_addr TEXT,
            user_agent TEXT
        );

        -- Indexes for common queries
        CREATE INDEX idx_devices_user ON devices(user_id);
        CREATE INDEX idx_contents_active ON contents(is_active, created_at);
        CREATE INDEX idx_events_user ON access_events(user_id, at);
        CREATE INDEX idx_events_content ON access_events(content_id, at);
        "#,
    )?;

    Ok(())
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as i64
}
