use super::{now_millis, unix_millis, RunStore, StoreError};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use time::OffsetDateTime;
use volley_core::{RunId, RunRecord, RunResult};

/// In-process store. Clones share the same records; nothing survives a restart.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    records: Arc<RwLock<HashMap<RunId, RunRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted<'a>(records: impl Iterator<Item = &'a RunRecord>) -> Vec<RunRecord> {
        let mut records: Vec<RunRecord> = records.cloned().collect();
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.run_id().cmp(b.run_id()))
        });
        records
    }
}

impl RunStore for MemoryStore {
    async fn upsert(&self, result: RunResult) -> Result<RunRecord, StoreError> {
        let now = now_millis()?;
        let mut records = self.records.write()?;

        let created_at = records
            .get(&result.run_id)
            .map(|existing| existing.created_at)
            .unwrap_or(now);
        let record = RunRecord { result, created_at };
        records.insert(record.run_id().clone(), record.clone());

        Ok(record)
    }

    async fn get(&self, run_id: &RunId) -> Result<Option<RunRecord>, StoreError> {
        Ok(self.records.read()?.get(run_id).cloned())
    }

    async fn list(&self) -> Result<Vec<RunRecord>, StoreError> {
        Ok(Self::sorted(self.records.read()?.values()))
    }

    async fn created_between(
        &self,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<RunRecord>, StoreError> {
        let range = unix_millis(start)..=unix_millis(end);
        Ok(Self::sorted(
            self.records
                .read()?
                .values()
                .filter(|record| range.contains(&unix_millis(record.created_at))),
        ))
    }
}
