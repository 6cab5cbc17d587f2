//! Durable offline queue.
//!
//! One `items` row per location that could not be (or was not meant to be)
//! delivered immediately. Rows are only ever inserted, moved out of PENDING
//! once, and deleted on explicit request.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, params};

use nightlight::geo_utils::{db_timestamp_now, parse_db_timestamp};

use crate::error::StoreError;
use crate::migrations::open_connection;

/// Lifecycle of a queued record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordStatus {
    Pending,
    Complete,
    Error,
}

impl RecordStatus {
    pub fn code(self) -> i64 {
        match self {
            RecordStatus::Pending => 0,
            RecordStatus::Complete => 1,
            RecordStatus::Error => 99,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(RecordStatus::Pending),
            1 => Some(RecordStatus::Complete),
            99 => Some(RecordStatus::Error),
            _ => None,
        }
    }
}

impl ToSql for RecordStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.code()))
    }
}

impl FromSql for RecordStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let code = i64::column_result(value)?;
        RecordStatus::from_code(code).ok_or(FromSqlError::OutOfRange(code))
    }
}

/// Which rows a bulk delete applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    All,
    Only(RecordStatus),
}

/// A persisted queue row.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedRecord {
    pub id: i64,
    pub category: String,
    /// JSON payload, `{lat, long, acc, src}` for location rows
    pub payload: String,
    /// ISO-8601 capture time
    pub created_at: String,
    pub status: RecordStatus,
}

impl QueuedRecord {
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        parse_db_timestamp(&self.created_at)
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            category: row.get(1)?,
            payload: row.get(2)?,
            created_at: row.get(3)?,
            status: row.get(4)?,
        })
    }
}

/// Row counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueSummary {
    pub pending: u32,
    pub complete: u32,
    pub error: u32,
}

impl QueueSummary {
    pub fn total(&self) -> u32 {
        self.pending + self.complete + self.error
    }
}

pub struct OfflineStore {
    conn: Mutex<Connection>,
}

const SELECT_COLUMNS: &str = "SELECT id, category, data, timestamp, status FROM items";

impl OfflineStore {
    // ========================================================================
    // Initialization
    // ========================================================================

    /// Open the store at `db_path`, creating and migrating it as needed.
    pub fn open(db_path: &str) -> Result<Self, StoreError> {
        let conn = open_connection(db_path)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::open(":memory:")
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Append a PENDING record stamped with the current time.
    pub fn append(&self, category: &str, payload_json: &str) -> Result<i64, StoreError> {
        self.append_at(category, payload_json, &db_timestamp_now())
    }

    /// Append a PENDING record with an explicit ISO-8601 timestamp.
    ///
    /// The payload must be a JSON object; anything else is rejected before
    /// touching the database.
    pub fn append_at(
        &self,
        category: &str,
        payload_json: &str,
        timestamp: &str,
    ) -> Result<i64, StoreError> {
        match serde_json::from_str::<serde_json::Value>(payload_json) {
            Ok(value) if value.is_object() => {}
            Ok(_) => {
                return Err(StoreError::InvalidPayload(
                    "payload is not a JSON object".to_string(),
                ));
            }
            Err(e) => return Err(StoreError::InvalidPayload(e.to_string())),
        }

        let conn = self.lock();
        conn.execute(
            "INSERT INTO items (category, data, timestamp, status) VALUES (?1, ?2, ?3, ?4)",
            params![category, payload_json, timestamp, RecordStatus::Pending],
        )?;
        let id = conn.last_insert_rowid();
        debug!("[OfflineStore] Appended {} record {}", category, id);
        Ok(id)
    }

    /// Move a PENDING record to COMPLETE or ERROR.
    ///
    /// Returns whether a row changed. Unknown ids and records that already
    /// left PENDING are left alone and reported as `Ok(false)`.
    pub fn update_status(&self, id: i64, status: RecordStatus) -> Result<bool, StoreError> {
        if status == RecordStatus::Pending {
            return Err(StoreError::InvalidTransition { id, status });
        }
        let changed = self.lock().execute(
            "UPDATE items SET status = ?1 WHERE id = ?2 AND status = ?3",
            params![status, id, RecordStatus::Pending],
        )?;
        Ok(changed > 0)
    }

    /// Delete one record. Returns whether it existed.
    pub fn delete_one(&self, id: i64) -> Result<bool, StoreError> {
        let deleted = self
            .lock()
            .execute("DELETE FROM items WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    /// Delete every record matching `filter`. Returns the number deleted.
    pub fn delete_by_status(&self, filter: StatusFilter) -> Result<usize, StoreError> {
        let conn = self.lock();
        let deleted = match filter {
            StatusFilter::All => conn.execute("DELETE FROM items", [])?,
            StatusFilter::Only(status) => {
                conn.execute("DELETE FROM items WHERE status = ?1", params![status])?
            }
        };
        info!("[OfflineStore] Deleted {} records ({:?})", deleted, filter);
        Ok(deleted)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// All records, newest id first.
    pub fn list_all(&self) -> Result<Vec<QueuedRecord>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!("{} ORDER BY id DESC", SELECT_COLUMNS))?;
        let records = readable(stmt.query_map([], QueuedRecord::from_row)?);
        Ok(records)
    }

    /// Records in one status, newest id first.
    pub fn list_by_status(&self, status: RecordStatus) -> Result<Vec<QueuedRecord>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "{} WHERE status = ?1 ORDER BY id DESC",
            SELECT_COLUMNS
        ))?;
        let records = readable(stmt.query_map(params![status], QueuedRecord::from_row)?);
        Ok(records)
    }

    pub fn get(&self, id: i64) -> Result<Option<QueuedRecord>, StoreError> {
        let conn = self.lock();
        let record = conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_COLUMNS),
                params![id],
                QueuedRecord::from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn summary(&self) -> Result<QueueSummary, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM items GROUP BY status")?;
        let mut summary = QueueSummary::default();
        let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, u32>(1)?)))?;
        for (code, count) in rows.filter_map(|r| r.ok()) {
            match RecordStatus::from_code(code) {
                Some(RecordStatus::Pending) => summary.pending = count,
                Some(RecordStatus::Complete) => summary.complete = count,
                Some(RecordStatus::Error) => summary.error = count,
                None => debug!("[OfflineStore] Ignoring {} rows with status {}", count, code),
            }
        }
        Ok(summary)
    }
}

/// Rows that fail to decode (e.g. an unknown status code) are logged and skipped.
fn readable<I>(rows: I) -> Vec<QueuedRecord>
where
    I: Iterator<Item = rusqlite::Result<QueuedRecord>>,
{
    rows.filter_map(|row| match row {
        Ok(record) => Some(record),
        Err(e) => {
            warn!("[OfflineStore] Skipping unreadable record: {}", e);
            None
        }
    })
    .collect()
}
