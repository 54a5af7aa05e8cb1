//! Durable storage for completed runs.
mod any;
mod memory;
mod sqlite;

pub use any::AnyStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::sync::PoisonError;
use thiserror::Error;
use time::OffsetDateTime;
use volley_core::{RunId, RunRecord, RunResult};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid timestamp: {0}")]
    Timestamp(String),

    #[error("Lock is poisoned.")]
    PoisonData,
}

impl<T> From<PoisonError<T>> for StoreError {
    fn from(_err: PoisonError<T>) -> Self {
        Self::PoisonData
    }
}

/// Run records keyed by run id.
///
/// `upsert` is idempotent: storing the same run twice leaves a single record, whose `createdAt`
/// is the time the first copy was accepted.
#[trait_variant::make(RunStore: Send)]
pub trait LocalRunStore {
    async fn upsert(&self, result: RunResult) -> Result<RunRecord, StoreError>;

    async fn get(&self, run_id: &RunId) -> Result<Option<RunRecord>, StoreError>;

    /// Every record, oldest first.
    async fn list(&self) -> Result<Vec<RunRecord>, StoreError>;

    /// Records with `start <= createdAt <= end`, oldest first.
    async fn created_between(
        &self,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<RunRecord>, StoreError>;
}

/// Record timestamps have millisecond resolution in every store.
pub(crate) fn unix_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

pub(crate) fn from_unix_millis(millis: i64) -> Result<OffsetDateTime, StoreError> {
    OffsetDateTime::from_unix_timestamp_nanos(millis as i128 * 1_000_000)
        .map_err(|err| StoreError::Timestamp(err.to_string()))
}

pub(crate) fn now_millis() -> Result<OffsetDateTime, StoreError> {
    from_unix_millis(unix_millis(OffsetDateTime::now_utc()))
}
