//! json-lines document file. one StoredRecord per line, appended in
//! ingestion order. a missing file reads as an empty store.
//!
//! a last line without its newline is an interrupted append: reads skip
//! it unless it parses, and the next insert repairs it before appending.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{in_range, pick_latest, RecordStore, StoreError};
use crate::domain::StoredRecord;

pub struct FileStore {
    path: PathBuf,
    // serializes appends; holds the line count once the tail has been checked
    appended: Mutex<Option<usize>>,
}

/// newline-terminated part, then whatever follows the last newline
fn split_tail(content: &str) -> (&str, &str) {
    match content.rfind('\n') {
        Some(i) => content.split_at(i + 1),
        None => ("", content),
    }
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            appended: Mutex::new(None),
        }
    }

    async fn read(&self) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(&self.path).await {
            Ok(c) => Ok(Some(c)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&self.path, e)),
        }
    }

    async fn load(&self) -> Result<Vec<StoredRecord>, StoreError> {
        let Some(content) = self.read().await? else {
            return Ok(Vec::new());
        };
        let (complete, tail) = split_tail(&content);

        let mut records = complete
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(n, line)| {
                serde_json::from_str(line)
                    .map_err(|e| StoreError::Malformed(format!("{}:{}: {}", self.path.display(), n + 1, e)))
            })
            .collect::<Result<Vec<StoredRecord>, _>>()?;

        if !tail.trim().is_empty() {
            match serde_json::from_str(tail) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(
                    "{}: skipping unterminated last line: {}",
                    self.path.display(),
                    e
                ),
            }
        }
        Ok(records)
    }

    /// count lines and make sure the next append starts on a fresh line
    async fn prepare_append(&self) -> Result<usize, StoreError> {
        let Some(content) = self.read().await? else {
            return Ok(0);
        };
        let (complete, tail) = split_tail(&content);
        let mut count = complete.lines().filter(|line| !line.trim().is_empty()).count();

        if !tail.is_empty() {
            if serde_json::from_str::<StoredRecord>(tail).is_ok() {
                self.append("\n").await?;
                count += 1;
            } else {
                tracing::warn!(
                    "{}: dropping partial record left by an interrupted append",
                    self.path.display()
                );
                let file = OpenOptions::new()
                    .write(true)
                    .open(&self.path)
                    .await
                    .map_err(|e| io_error(&self.path, e))?;
                file.set_len(complete.len() as u64)
                    .await
                    .map_err(|e| io_error(&self.path, e))?;
            }
        }
        Ok(count)
    }

    async fn append(&self, text: &str) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| io_error(&self.path, e))?;
        file.write_all(text.as_bytes())
            .await
            .map_err(|e| io_error(&self.path, e))?;
        file.flush().await.map_err(|e| io_error(&self.path, e))
    }
}

fn io_error(path: &Path, e: std::io::Error) -> StoreError {
    match e.kind() {
        std::io::ErrorKind::PermissionDenied => {
            StoreError::Unavailable(format!("{}: {}", path.display(), e))
        }
        _ => StoreError::Backend(format!("{}: {}", path.display(), e)),
    }
}

#[async_trait]
impl RecordStore for FileStore {
    async fn insert(&self, mut record: StoredRecord) -> Result<StoredRecord, StoreError> {
        let mut appended = self.appended.lock().await;

        let count = match *appended {
            Some(count) => count,
            None => self.prepare_append().await?,
        };
        record.id = Some((count + 1).to_string());

        let mut line = serde_json::to_string(&record)
            .map_err(|e| StoreError::Backend(format!("failed to encode record: {e}")))?;
        line.push('\n');

        match self.append(&line).await {
            Ok(()) => {
                *appended = Some(count + 1);
                Ok(record)
            }
            Err(e) => {
                // the write may have landed partially; recheck the tail next time
                *appended = None;
                Err(e)
            }
        }
    }

    async fn latest(&self) -> Result<Option<StoredRecord>, StoreError> {
        let records = self.load().await?;
        Ok(pick_latest(records.iter()).cloned())
    }

    async fn between(&self, start: f64, end: f64) -> Result<Vec<StoredRecord>, StoreError> {
        let mut records = self.load().await?;
        records.retain(|r| in_range(r, start, end));
        Ok(records)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.load().await.map(|_| ())
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}
