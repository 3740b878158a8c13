//! Lazy cache of deserialized, ready-to-run model objects.
//!
//! Entries live for the whole process unless explicitly evicted on delete;
//! there is no capacity policy. That is a deliberate simplification for a
//! single-process service with a bounded model count. A deployment holding
//! many large artifacts would need an LRU or TTL policy layered in here.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::artifact::{load_artifact, ArtifactStore, ModelArtifact};
use crate::error::{Error, Result};
use crate::record::{ModelRecord, ModelStatus};

#[derive(Default)]
pub struct ModelCache {
    loaded: RwLock<HashMap<String, Arc<dyn ModelArtifact>>>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached model for `record`, loading it from the artifact
    /// store on first use. Only `Deployed` records are eligible.
    ///
    /// The artifact is read and deserialized without holding the cache lock;
    /// two racing first loads both succeed and the first insert wins.
    pub fn get_or_load(&self, record: &ModelRecord, store: &ArtifactStore) -> Result<Arc<dyn ModelArtifact>> {
        if let Some(model) = self.loaded.read().get(&record.id) {
            return Ok(Arc::clone(model));
        }
        if record.status != ModelStatus::Deployed {
            return Err(Error::NotDeployed(record.id.clone()));
        }
        debug!(model_id = %record.id, path = %record.artifact_path.display(), "loading model artifact");
        let bytes = store.get(&record.artifact_path)?;
        let model: Arc<dyn ModelArtifact> = Arc::from(load_artifact(&bytes)?);
        let mut loaded = self.loaded.write();
        Ok(Arc::clone(loaded.entry(record.id.clone()).or_insert(model)))
    }

    /// Drop a cached entry; false when nothing was cached for `id`.
    pub fn evict(&self, id: &str) -> bool {
        self.loaded.write().remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.loaded.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaded.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn deployed_record(store: &ArtifactStore) -> ModelRecord {
        let bytes = serde_json::to_vec(&json!({
            "kind": "linear_regressor",
            "weights": [1.0],
            "bias": 0.0
        }))
        .unwrap();
        let path = store.put("m1", "model.json", &bytes).unwrap();
        let mut rec = ModelRecord::new("m1".into(), "m", None, path);
        rec.status = ModelStatus::Deployed;
        rec
    }

    #[test]
    fn loads_once_and_serves_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();
        let rec = deployed_record(&store);
        let cache = ModelCache::new();

        let first = cache.get_or_load(&rec, &store).unwrap();
        assert_eq!(cache.len(), 1);
        // Delete the backing file: a cached model must keep serving.
        assert!(store.delete(&rec.artifact_path));
        let second = cache.get_or_load(&rec, &store).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn refuses_records_that_are_not_deployed() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();
        let mut rec = deployed_record(&store);
        rec.status = ModelStatus::Error;
        let cache = ModelCache::new();
        assert!(matches!(
            cache.get_or_load(&rec, &store),
            Err(Error::NotDeployed(_))
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn evict_forces_a_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();
        let rec = deployed_record(&store);
        let cache = ModelCache::new();
        cache.get_or_load(&rec, &store).unwrap();
        assert!(cache.evict(&rec.id));
        assert!(!cache.evict(&rec.id));
        assert!(cache.is_empty());
        // Reload hits the store again.
        cache.get_or_load(&rec, &store).unwrap();
        assert_eq!(cache.len(), 1);
    }
}
