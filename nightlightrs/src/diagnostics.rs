//! Diagnostic log.
//!
//! Pipelines report what happened to each sample here. Entries are mirrored
//! to the `log` facade and appended to the `logs` table so the user can read
//! them on the device. Writing never fails the caller.

use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{error, info, warn};
use rusqlite::{Connection, params};

use nightlight::geo_utils::db_timestamp_now;

use crate::error::StoreError;
use crate::migrations::open_connection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

impl Severity {
    pub fn code(self) -> i64 {
        match self {
            Severity::Info => 0,
            Severity::Error => 1,
        }
    }

    /// Unknown codes read as errors so they stand out.
    pub fn from_code(code: i64) -> Self {
        if code == 0 { Severity::Info } else { Severity::Error }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub id: i64,
    pub timestamp: String,
    pub area: String,
    pub message: String,
    pub severity: Severity,
}

/// Fire-and-forget diagnostic sink.
pub trait DiagnosticSink: Send + Sync {
    fn write(&self, area: &str, message: &str, severity: Severity);

    fn info(&self, area: &str, message: &str) {
        self.write(area, message, Severity::Info);
    }

    fn error(&self, area: &str, message: &str) {
        self.write(area, message, Severity::Error);
    }
}

/// Discards everything.
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn write(&self, _area: &str, _message: &str, _severity: Severity) {}
}

/// SQLite-backed diagnostic log.
pub struct DiagnosticLog {
    conn: Mutex<Connection>,
}

impl DiagnosticLog {
    pub fn open(db_path: &str) -> Result<Self, StoreError> {
        let conn = open_connection(db_path)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory log (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::open(":memory:")
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn append(&self, area: &str, message: &str, severity: Severity) -> Result<i64, StoreError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO logs (timestamp, area, message, type) VALUES (?1, ?2, ?3, ?4)",
            params![db_timestamp_now(), area, message, severity.code()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// All entries, newest first.
    pub fn list(&self) -> Result<Vec<LogRecord>, StoreError> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT id, timestamp, area, message, type FROM logs ORDER BY id DESC")?;
        let records = stmt
            .query_map([], |row| {
                Ok(LogRecord {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    area: row.get(2)?,
                    message: row.get(3)?,
                    severity: Severity::from_code(row.get(4)?),
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(records)
    }

    pub fn delete_all(&self) -> Result<usize, StoreError> {
        let deleted = self.lock().execute("DELETE FROM logs", [])?;
        info!("[DiagnosticLog] Deleted {} entries", deleted);
        Ok(deleted)
    }
}

impl DiagnosticSink for DiagnosticLog {
    fn write(&self, area: &str, message: &str, severity: Severity) {
        match severity {
            Severity::Info => info!("[{}] {}", area, message),
            Severity::Error => error!("[{}] {}", area, message),
        }
        if let Err(e) = self.append(area, message, severity) {
            warn!("[DiagnosticLog] Failed to persist entry for {}: {}", area, e);
        }
    }
}
