use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{in_range, pick_latest, RecordStore, StoreError};
use crate::domain::StoredRecord;

/// records held in insertion order behind a tokio rwlock
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Vec<StoredRecord>>,
    next_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert(&self, mut record: StoredRecord) -> Result<StoredRecord, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        record.id = Some(id.to_string());
        self.records.write().await.push(record.clone());
        Ok(record)
    }

    async fn latest(&self) -> Result<Option<StoredRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(pick_latest(records.iter()).cloned())
    }

    async fn between(&self, start: f64, end: f64) -> Result<Vec<StoredRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| in_range(r, start, end))
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn describe(&self) -> String {
        "memory (in-process)".to_string()
    }
}
