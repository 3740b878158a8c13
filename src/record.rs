//! Metadata record for one version of one named model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    Uploaded,
    Deployed,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    Classifier,
    Regressor,
}

/// One version of one named model.
///
/// `id` and `artifact_path` are set at creation and never change. `parent_id`
/// links a version to the record it supersedes; a record without a parent is
/// a lineage root. Registries written before versioning existed omit
/// `version`/`parent_id`/`is_latest`; the serde defaults below restore them,
/// after which `versioning::reconcile` converges the loaded set to the
/// single-latest invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: ModelStatus,
    #[serde(default)]
    pub model_type: Option<ModelType>,
    pub artifact_path: PathBuf,
    #[serde(default)]
    pub feature_names: Option<Vec<String>>,
    #[serde(default)]
    pub model_info: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default = "default_latest")]
    pub is_latest: bool,
}

fn default_version() -> u32 {
    1
}

fn default_latest() -> bool {
    true
}

impl ModelRecord {
    pub fn new(id: String, name: &str, description: Option<String>, artifact_path: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.to_string(),
            description,
            status: ModelStatus::Uploaded,
            model_type: None,
            artifact_path,
            feature_names: None,
            model_info: Map::new(),
            created_at: now,
            updated_at: now,
            version: 1,
            parent_id: None,
            is_latest: true,
        }
    }

    pub fn generate_id() -> String {
        Uuid::new_v4().to_string()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Caller-supplied metadata accompanying an upload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SaveRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_new_version: bool,
    #[serde(default)]
    pub parent_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_document_gains_versioning_defaults() {
        let json = r#"{
            "id": "m1",
            "name": "churn",
            "status": "deployed",
            "artifact_path": "/tmp/m1.json",
            "created_at": "2023-04-01T10:00:00Z",
            "updated_at": "2023-04-01T10:00:00Z"
        }"#;
        let rec: ModelRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.version, 1);
        assert_eq!(rec.parent_id, None);
        assert!(rec.is_latest);
        assert!(rec.model_info.is_empty());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ModelStatus::Deployed).unwrap(), "\"deployed\"");
        assert_eq!(serde_json::to_string(&ModelType::Classifier).unwrap(), "\"classifier\"");
    }
}
