use chrono::{DateTime, Local};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::errors::CoreError;
use crate::models::worksheet::Worksheet;

/// In-memory state of one cache entry.
#[derive(Debug, Clone, Default)]
pub struct StorageRecord {
    pub table: Option<Arc<Worksheet>>,
    pub grab_timestamp: Option<DateTime<Local>>,
}

/// Parsed table and grab timestamp of one cache entry.
///
/// Next to the raw payload at `data_path` two sibling files back the
/// record: `<data_path>.table` (bincode worksheet) and
/// `<data_path>.timestamp` (RFC 3339). The record is replaced as a whole,
/// so readers never see a table paired with a stale timestamp.
#[derive(Debug)]
pub struct WorksheetStorage {
    data_path: PathBuf,
    record: RwLock<StorageRecord>,
}

impl WorksheetStorage {
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        Self {
            data_path: data_path.into(),
            record: RwLock::new(StorageRecord::default()),
        }
    }

    /// Location of the raw payload.
    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn table_path(&self) -> PathBuf {
        sibling(&self.data_path, "table")
    }

    pub fn timestamp_path(&self) -> PathBuf {
        sibling(&self.data_path, "timestamp")
    }

    /// Table currently held in memory.
    pub fn table(&self) -> Option<Arc<Worksheet>> {
        self.record.read().table.clone()
    }

    pub fn grab_timestamp(&self) -> Option<DateTime<Local>> {
        self.record.read().grab_timestamp
    }

    /// The in-memory table unless `force`, else the persisted one. A
    /// persisted pair that cannot be read resets the record.
    pub fn load(&self, force: bool) -> Option<Arc<Worksheet>> {
        if !force {
            if let Some(table) = self.table() {
                return Some(table);
            }
        }

        match self.read_persisted() {
            Ok(Some(record)) => {
                let table = record.table.clone();
                *self.record.write() = record;
                table
            }
            Ok(None) => {
                *self.record.write() = StorageRecord::default();
                None
            }
            Err(e) => {
                warn!(path = %self.data_path.display(), error = %e, "persisted table unreadable");
                *self.record.write() = StorageRecord::default();
                None
            }
        }
    }

    /// Persist `table` stamped with the current time, then publish it in
    /// memory. On a persistence failure the in-memory record is untouched.
    pub fn store(&self, table: Worksheet) -> Result<Arc<Worksheet>, CoreError> {
        let now = Local::now();
        if let Some(parent) = self.data_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let payload = bincode::serialize(&table)
            .map_err(|e| CoreError::Serialization(format!("Failed to serialize worksheet: {e}")))?;
        std::fs::write(self.table_path(), payload)?;
        std::fs::write(self.timestamp_path(), now.to_rfc3339())?;

        let table = Arc::new(table);
        *self.record.write() = StorageRecord {
            table: Some(table.clone()),
            grab_timestamp: Some(now),
        };
        debug!(path = %self.data_path.display(), rows = table.row_count(), "worksheet stored");
        Ok(table)
    }

    /// Drop the record from memory and disk. The raw payload stays.
    pub fn clear(&self) {
        *self.record.write() = StorageRecord::default();
        for path in [self.table_path(), self.timestamp_path()] {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %e, "cannot remove cache file");
                }
            }
        }
    }

    fn read_persisted(&self) -> Result<Option<StorageRecord>, CoreError> {
        let table_path = self.table_path();
        let timestamp_path = self.timestamp_path();
        if !table_path.exists() || !timestamp_path.exists() {
            return Ok(None);
        }

        let bytes = std::fs::read(&table_path)?;
        let table: Worksheet = bincode::deserialize(&bytes)
            .map_err(|e| CoreError::Deserialization(format!("Failed to deserialize worksheet: {e}")))?;

        let stamp = std::fs::read_to_string(&timestamp_path)?;
        let grab_timestamp = DateTime::parse_from_rfc3339(stamp.trim())
            .map_err(|e| CoreError::Deserialization(format!("Invalid grab timestamp: {e}")))?
            .with_timezone(&Local);

        Ok(Some(StorageRecord {
            table: Some(Arc::new(table)),
            grab_timestamp: Some(grab_timestamp),
        }))
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}
