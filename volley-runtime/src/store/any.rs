use super::{MemoryStore, RunStore, SqliteStore, StoreError};
use time::OffsetDateTime;
use volley_core::{RunId, RunRecord, RunResult};

/// Store selected at startup from the configured database URL.
#[derive(Clone, Debug)]
pub enum AnyStore {
    Memory(MemoryStore),
    Sqlite(SqliteStore),
}

impl AnyStore {
    /// `memory` selects the in-process store, anything else is treated as a SQLite URL.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        if url == "memory" {
            Ok(Self::Memory(MemoryStore::new()))
        } else {
            Ok(Self::Sqlite(SqliteStore::connect(url).await?))
        }
    }

    pub async fn close(&self) {
        if let Self::Sqlite(store) = self {
            store.close().await;
        }
    }
}

impl RunStore for AnyStore {
    async fn upsert(&self, result: RunResult) -> Result<RunRecord, StoreError> {
        match self {
            Self::Memory(store) => store.upsert(result).await,
            Self::Sqlite(store) => store.upsert(result).await,
        }
    }

    async fn get(&self, run_id: &RunId) -> Result<Option<RunRecord>, StoreError> {
        match self {
            Self::Memory(store) => store.get(run_id).await,
            Self::Sqlite(store) => store.get(run_id).await,
        }
    }

    async fn list(&self) -> Result<Vec<RunRecord>, StoreError> {
        match self {
            Self::Memory(store) => store.list().await,
            Self::Sqlite(store) => store.list().await,
        }
    }

    async fn created_between(
        &self,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<RunRecord>, StoreError> {
        match self {
            Self::Memory(store) => store.created_between(start, end).await,
            Self::Sqlite(store) => store.created_between(start, end).await,
        }
    }
}
