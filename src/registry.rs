//! Registry store: the id -> record mapping and its durable JSON document.
//!
//! The whole mapping is persisted as one document via write-to-temp + rename,
//! so a crash mid-write can never leave partial records behind. A corrupt or
//! unreadable document on startup is logged and treated as an empty registry;
//! a failed persist is surfaced to the mutating caller without rolling back
//! the in-memory state (the mutation may be lost on restart, recovered by the
//! reconciliation pass).

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::error::Result;
use crate::record::ModelRecord;
use crate::versioning;

pub type RecordMap = HashMap<String, ModelRecord>;

pub struct RegistryStore {
    path: PathBuf,
    records: RwLock<RecordMap>,
}

impl RegistryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: RwLock::new(RecordMap::new()),
        }
    }

    /// Load the persisted document, defaulting legacy records and running the
    /// versioning reconciliation pass. Repairs are persisted immediately.
    pub fn reload(&self) -> Result<usize> {
        let loaded: RecordMap = match fs::read(&self.path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "registry document unreadable, starting empty");
                    RecordMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RecordMap::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "registry document inaccessible, starting empty");
                RecordMap::new()
            }
        };
        let (count, repaired) = {
            let mut records = self.records.write();
            *records = loaded;
            let repaired = versioning::reconcile(&mut records);
            (records.len(), repaired)
        };
        info!(records = count, repaired, "registry loaded");
        if repaired > 0 {
            self.persist()?;
        }
        Ok(count)
    }

    /// Serialize the full mapping and atomically replace the document.
    pub fn persist(&self) -> Result<()> {
        let bytes = {
            let records = self.records.read();
            serde_json::to_vec_pretty(&*records)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?
        };
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn put(&self, record: ModelRecord) {
        self.records.write().insert(record.id.clone(), record);
    }

    pub fn get(&self, id: &str) -> Option<ModelRecord> {
        self.records.read().get(id).cloned()
    }

    pub fn get_all(&self) -> Vec<ModelRecord> {
        self.records.read().values().cloned().collect()
    }

    pub fn delete(&self, id: &str) -> bool {
        self.records.write().remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Run `f` under the shared read lock.
    pub fn read<T>(&self, f: impl FnOnce(&RecordMap) -> T) -> T {
        f(&self.records.read())
    }

    /// Run `f` under the exclusive write lock. Version assignment holds this
    /// lock across its full read-compute-write so two concurrent saves into
    /// the same family cannot be given the same version number.
    pub fn mutate<T>(&self, f: impl FnOnce(&mut RecordMap) -> T) -> T {
        f(&mut self.records.write())
    }
}
