//! Schema migrations for the offline database.
//!
//! Both tables use `IF NOT EXISTS` so databases created by earlier app
//! builds, which had the same tables but no migration bookkeeping, upgrade
//! in place.

use std::time::Duration;

use log::{debug, info};
use rusqlite::Connection;
use rusqlite_migration::{M, Migrations};

use crate::error::StoreError;

/// How long a writer waits on a lock held by the other app context.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Offline queue
        M::up(
            r#"
            CREATE TABLE IF NOT EXISTS items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                category TEXT NOT NULL,
                data TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                status INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_items_status ON items(status);
            "#,
        ),
        // Diagnostic log
        M::up(
            r#"
            CREATE TABLE IF NOT EXISTS logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                area TEXT NOT NULL,
                message TEXT NOT NULL,
                type INTEGER NOT NULL DEFAULT 0
            );
            "#,
        ),
    ])
}

/// Open (or create) the database at `path` and bring its schema up to date.
///
/// File databases use WAL journaling so the foreground app and the
/// background task can write through separate connections.
pub fn open_connection(path: &str) -> Result<Connection, StoreError> {
    let mut conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;

    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    debug!("[Migrations] {} journal_mode={}", path, mode);

    migrations().to_latest(&mut conn)?;
    info!("[Migrations] Schema ready at {}", path);

    Ok(conn)
}
