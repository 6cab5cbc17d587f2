//! Error types for storage, saving and scheduling.
//!
//! Storage failures are the terminal failure mode for a sample: nothing sits
//! beneath the offline queue to fall back to.

use nightlight::ValidationError;
use thiserror::Error;

use crate::store::RecordStatus;

/// Local store failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("migration error: {0}")]
    Migration(#[from] rusqlite_migration::Error),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Status may only move from PENDING to COMPLETE or ERROR
    #[error("record {id} cannot move to {status:?}")]
    InvalidTransition { id: i64, status: RecordStatus },
}

/// Save pipeline failure. Network failures are absorbed by the queue and never appear here.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("invalid sample: {0}")]
    Validation(#[from] ValidationError),

    #[error("could not queue sample: {0}")]
    Persistence(#[from] StoreError),
}

/// Background task registration failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchedulerError {
    #[error("task host rejected registration: {0}")]
    RegistrationRejected(String),

    #[error("task host error: {0}")]
    Host(String),
}
