//! Service facade wiring the registry, versioning, artifact store, cache and
//! inference engine together for the surrounding transport layer.
//!
//! Constructed once at process start and passed by handle to request
//! handlers; there is no ambient global state. Upload validation (size,
//! extension) happens before `save_model` is called.

use serde_json::{json, Value};
use tracing::{error, info};

use crate::artifact::{load_artifact, ArtifactStore};
use crate::cache::ModelCache;
use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::inference::{self, BatchRow, FeatureMap, Prediction};
use crate::record::{ModelRecord, ModelStatus, ModelType, SaveRequest};
use crate::registry::RegistryStore;
use crate::versioning;

/// Artifact inspection result for a pre-upload preview; nothing is
/// registered or stored.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ArtifactPreview {
    pub model_class: String,
    pub model_type: ModelType,
    pub supports_probability: bool,
    pub feature_names: Option<Vec<String>>,
    pub n_features: usize,
    pub size_bytes: usize,
}

pub struct ModelService {
    registry: RegistryStore,
    artifacts: ArtifactStore,
    cache: ModelCache,
}

impl ModelService {
    /// Open the stores under the configured directory and load the persisted
    /// registry, reconciling legacy or crash-inconsistent state.
    pub fn open(cfg: &ServiceConfig) -> Result<Self> {
        let artifacts = ArtifactStore::new(&cfg.storage_dir)?;
        let registry = RegistryStore::new(cfg.registry_path());
        registry.reload()?;
        Ok(Self { registry, artifacts, cache: ModelCache::new() })
    }

    /// Store artifact bytes, assign the version placement, run the
    /// deployment state machine and persist the registry.
    ///
    /// A failing artifact inspection does not fail the upload: the record is
    /// kept in `Error` status with the failure text in `model_info`, so the
    /// registry retains provenance of the bad upload. Versioning failures
    /// (unknown parent, corrupt lineage) do fail it, and the stored bytes
    /// are removed again.
    pub fn save_model(&self, bytes: &[u8], filename: &str, req: SaveRequest) -> Result<ModelRecord> {
        if req.name.trim().is_empty() {
            return Err(Error::Validation("model name must not be empty".into()));
        }
        let id = ModelRecord::generate_id();
        let path = self.artifacts.put(&id, filename, bytes)?;
        // Inspect outside the registry lock; only the map mutation below
        // needs exclusivity.
        let inspection = load_artifact(bytes);

        let outcome = self.registry.mutate(|records| -> Result<ModelRecord> {
            let placement =
                versioning::assign_version(records, &req.name, req.parent_id.as_deref(), req.is_new_version)?;
            let mut record = ModelRecord::new(id.clone(), &req.name, req.description.clone(), path.clone());
            record.version = placement.version;
            record.parent_id = placement.parent_id;
            match &inspection {
                Ok(model) => {
                    record.status = ModelStatus::Deployed;
                    record.model_type = Some(if model.supports_probability() {
                        ModelType::Classifier
                    } else {
                        ModelType::Regressor
                    });
                    record.feature_names = model.feature_names().map(<[String]>::to_vec);
                    record.model_info = json_map(json!({
                        "model_class": model.class_name(),
                        "supports_probability": model.supports_probability(),
                        "n_features": model.n_features(),
                    }));
                }
                Err(e) => {
                    record.status = ModelStatus::Error;
                    record.model_info = json_map(json!({ "error": e.to_string() }));
                }
            }
            records.insert(record.id.clone(), record.clone());
            Ok(record)
        });

        let record = match outcome {
            Ok(record) => record,
            Err(e) => {
                self.artifacts.delete(&path);
                return Err(e);
            }
        };
        info!(
            model_id = %record.id,
            name = %record.name,
            version = record.version,
            status = ?record.status,
            "model saved"
        );
        self.persist()?;
        Ok(record)
    }

    /// Inspect artifact bytes without registering anything.
    pub fn preview_artifact(&self, bytes: &[u8]) -> Result<ArtifactPreview> {
        let model = load_artifact(bytes)?;
        Ok(ArtifactPreview {
            model_class: model.class_name().to_string(),
            model_type: if model.supports_probability() {
                ModelType::Classifier
            } else {
                ModelType::Regressor
            },
            supports_probability: model.supports_probability(),
            feature_names: model.feature_names().map(<[String]>::to_vec),
            n_features: model.n_features(),
            size_bytes: bytes.len(),
        })
    }

    pub fn get_record(&self, id: &str) -> Option<ModelRecord> {
        self.registry.get(id)
    }

    pub fn list_records(&self, latest_only: bool) -> Vec<ModelRecord> {
        let mut records = self.registry.get_all();
        if latest_only {
            records.retain(|r| r.is_latest);
        }
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        records
    }

    /// All versions carrying `name`, sorted by version.
    pub fn list_by_name(&self, name: &str) -> Vec<ModelRecord> {
        let mut records: Vec<ModelRecord> = self
            .registry
            .read(|map| map.values().filter(|r| r.name == name).cloned().collect());
        records.sort_by_key(|r| r.version);
        records
    }

    pub fn latest_by_name(&self, name: &str) -> Option<ModelRecord> {
        self.list_by_name(name).into_iter().max_by_key(|r| r.version)
    }

    /// Delete a record, promoting a surviving family member to latest,
    /// removing the artifact bytes and evicting the cached model.
    pub fn delete_record(&self, id: &str) -> Result<bool> {
        let removed = self.registry.mutate(|records| -> Result<Option<ModelRecord>> {
            if !records.contains_key(id) {
                return Ok(None);
            }
            versioning::promote_on_delete(records, id)?;
            Ok(records.remove(id))
        })?;
        let record = match removed {
            Some(record) => record,
            None => return Ok(false),
        };
        self.artifacts.delete(&record.artifact_path);
        self.cache.evict(id);
        info!(model_id = %id, name = %record.name, version = record.version, "model deleted");
        self.persist()?;
        Ok(true)
    }

    pub fn predict_one(&self, id: &str, features: &FeatureMap) -> Result<Prediction> {
        let record = self.registry.get(id).ok_or_else(|| Error::NotFound(id.to_string()))?;
        let model = self.cache.get_or_load(&record, &self.artifacts)?;
        inference::predict_row(&record, &model, features)
    }

    /// Batch prediction with per-row outcomes; one malformed element never
    /// aborts the rest.
    pub fn predict_batch(&self, id: &str, batch: &[FeatureMap]) -> Result<Vec<BatchRow>> {
        let record = self.registry.get(id).ok_or_else(|| Error::NotFound(id.to_string()))?;
        let model = self.cache.get_or_load(&record, &self.artifacts)?;
        Ok(inference::predict_rows(&record, &model, batch))
    }

    /// Flush the registry document; called by mutating operations and at
    /// shutdown.
    pub fn persist(&self) -> Result<()> {
        if let Err(e) = self.registry.persist() {
            error!(error = %e, "registry persist failed; in-memory state kept");
            return Err(e);
        }
        Ok(())
    }

    pub fn record_count(&self) -> usize {
        self.registry.len()
    }
}

fn json_map(value: Value) -> serde_json::Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}
