//! ==============================================================================
//! store - document store seam
//! ==============================================================================
//!
//! purpose:
//!     everything that reads or writes stored records goes through the
//!     RecordStore trait. the backend never knows which store it talks to.
//!
//! implementations:
//!     - memory.rs: in-process container (tests, all-in-one role)
//!     - file.rs:   append-only json-lines document file
//!     - remote.rs: another node's store over http (reqwest)
//!
//! connection strings:
//!
//! ```text
//!     memory:                  -> MemoryStore
//!     file:/var/lib/tel.jsonl  -> FileStore
//!     http://hub:3001          -> RemoteStore
//! ```
//!
//! ==============================================================================

mod file;
mod memory;
mod remote;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use remote::RemoteStore;

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::StoredRecord;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// the store could not be reached at all (connection refused etc.)
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// the store answered but the operation failed
    #[error("store error: {0}")]
    Backend(String),
    #[error("malformed record: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// add a record, assigning its id; returns the stored copy
    async fn insert(&self, record: StoredRecord) -> Result<StoredRecord, StoreError>;

    /// the record with the greatest `_ts`, ties going to the later insert
    async fn latest(&self) -> Result<Option<StoredRecord>, StoreError>;

    /// records with `start <= _ts <= end`, in store order
    async fn between(&self, start: f64, end: f64) -> Result<Vec<StoredRecord>, StoreError>;

    /// cheap reachability check used at startup
    async fn ping(&self) -> Result<(), StoreError>;

    /// human-readable location for logs
    fn describe(&self) -> String;
}

/// open the store named by a connection string
pub fn connect(connection: &str) -> Result<Arc<dyn RecordStore>, StoreError> {
    let connection = connection.trim();
    if connection == "memory:" || connection == "memory" {
        return Ok(Arc::new(MemoryStore::new()));
    }
    if let Some(path) = connection.strip_prefix("file:") {
        if path.is_empty() {
            return Err(StoreError::Backend("file: connection string needs a path".into()));
        }
        return Ok(Arc::new(FileStore::new(path)));
    }
    if connection.starts_with("http://") || connection.starts_with("https://") {
        return Ok(Arc::new(RemoteStore::new(connection)?));
    }
    Err(StoreError::Backend(format!(
        "unsupported store connection string: {connection}"
    )))
}

/// `_ts` in [start, end]; compared as floats so fractional bounds work
pub(crate) fn in_range(record: &StoredRecord, start: f64, end: f64) -> bool {
    let ts = record.ts as f64;
    start <= ts && ts <= end
}

/// latest by `_ts`; `max_by_key` keeps the last of equal keys
pub(crate) fn pick_latest<'a, I>(records: I) -> Option<&'a StoredRecord>
where
    I: IntoIterator<Item = &'a StoredRecord>,
{
    records.into_iter().max_by_key(|r| r.ts)
}
