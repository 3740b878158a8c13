//! Artifact storage and the model capability interface.
//!
//! An artifact is the serialized trained model payload. Supported formats are
//! JSON documents tagged by a `kind` field; each format has a concrete
//! adapter implementing [`ModelArtifact`], which declares statically whether
//! the model produces probabilities and how it reports its feature schema.
//! Unknown kinds fail with `UnsupportedArtifact` at load time rather than a
//! runtime capability miss.

use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};

/// Capability interface implemented by every supported artifact family.
pub trait ModelArtifact: Send + Sync {
    fn class_name(&self) -> &'static str;

    /// Declared input schema, when the artifact carries one.
    fn feature_names(&self) -> Option<&[String]>;

    fn n_features(&self) -> usize;

    /// True for classifier families that expose a probability vector.
    fn supports_probability(&self) -> bool;

    /// Class labels in probability-vector order; `None` for regressors.
    fn class_labels(&self) -> Option<&[Value]>;

    /// Single-row prediction: a number for regressors, a class label for
    /// classifiers.
    fn predict(&self, row: &[f64]) -> Result<Value>;

    /// Per-class probabilities for `row`; `None` when unsupported.
    fn predict_proba(&self, row: &[f64]) -> Option<Vec<f64>>;
}

fn check_width(expected: usize, row: &[f64]) -> Result<()> {
    if row.len() != expected {
        return Err(Error::Validation(format!(
            "expected {} features, got {}",
            expected,
            row.len()
        )));
    }
    Ok(())
}

fn dot(weights: &[f64], row: &[f64]) -> f64 {
    weights.iter().zip(row).map(|(w, x)| w * x).sum()
}

fn number(v: f64) -> Result<Value> {
    serde_json::Number::from_f64(v)
        .map(Value::Number)
        .ok_or_else(|| Error::Validation("model produced a non-finite prediction".into()))
}

// --- Linear regressor ---

#[derive(Debug, Deserialize)]
pub struct LinearRegressor {
    weights: Vec<f64>,
    bias: f64,
    #[serde(default)]
    feature_names: Option<Vec<String>>,
}

impl ModelArtifact for LinearRegressor {
    fn class_name(&self) -> &'static str {
        "LinearRegressor"
    }
    fn feature_names(&self) -> Option<&[String]> {
        self.feature_names.as_deref()
    }
    fn n_features(&self) -> usize {
        self.weights.len()
    }
    fn supports_probability(&self) -> bool {
        false
    }
    fn class_labels(&self) -> Option<&[Value]> {
        None
    }
    fn predict(&self, row: &[f64]) -> Result<Value> {
        check_width(self.weights.len(), row)?;
        number(dot(&self.weights, row) + self.bias)
    }
    fn predict_proba(&self, _row: &[f64]) -> Option<Vec<f64>> {
        None
    }
}

// --- Binary logistic classifier ---

#[derive(Debug, Deserialize)]
pub struct BinaryClassifier {
    weights: Vec<f64>,
    bias: f64,
    classes: Vec<Value>,
    #[serde(default)]
    feature_names: Option<Vec<String>>,
}

impl BinaryClassifier {
    fn positive_probability(&self, row: &[f64]) -> f64 {
        let z = dot(&self.weights, row) + self.bias;
        1.0 / (1.0 + (-z).exp())
    }
}

impl ModelArtifact for BinaryClassifier {
    fn class_name(&self) -> &'static str {
        "BinaryClassifier"
    }
    fn feature_names(&self) -> Option<&[String]> {
        self.feature_names.as_deref()
    }
    fn n_features(&self) -> usize {
        self.weights.len()
    }
    fn supports_probability(&self) -> bool {
        true
    }
    fn class_labels(&self) -> Option<&[Value]> {
        Some(&self.classes)
    }
    fn predict(&self, row: &[f64]) -> Result<Value> {
        check_width(self.weights.len(), row)?;
        let p = self.positive_probability(row);
        let idx = usize::from(p >= 0.5);
        Ok(self.classes[idx].clone())
    }
    fn predict_proba(&self, row: &[f64]) -> Option<Vec<f64>> {
        if row.len() != self.weights.len() {
            return None;
        }
        let p = self.positive_probability(row);
        Some(vec![1.0 - p, p])
    }
}

// --- Multiclass softmax classifier ---

#[derive(Debug, Deserialize)]
pub struct MulticlassClassifier {
    /// One weight vector per class, in `classes` order.
    weights: Vec<Vec<f64>>,
    biases: Vec<f64>,
    classes: Vec<Value>,
    #[serde(default)]
    feature_names: Option<Vec<String>>,
}

impl MulticlassClassifier {
    fn scores(&self, row: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.biases)
            .map(|(w, b)| dot(w, row) + b)
            .collect()
    }

    fn softmax(scores: &[f64]) -> Vec<f64> {
        let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
        let sum: f64 = exps.iter().sum();
        exps.into_iter().map(|e| e / sum).collect()
    }

    fn width(&self) -> usize {
        self.weights.first().map(Vec::len).unwrap_or(0)
    }
}

impl ModelArtifact for MulticlassClassifier {
    fn class_name(&self) -> &'static str {
        "MulticlassClassifier"
    }
    fn feature_names(&self) -> Option<&[String]> {
        self.feature_names.as_deref()
    }
    fn n_features(&self) -> usize {
        self.width()
    }
    fn supports_probability(&self) -> bool {
        true
    }
    fn class_labels(&self) -> Option<&[Value]> {
        Some(&self.classes)
    }
    fn predict(&self, row: &[f64]) -> Result<Value> {
        check_width(self.width(), row)?;
        let scores = self.scores(row);
        let best = scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .ok_or_else(|| Error::Validation("classifier has no classes".into()))?;
        Ok(self.classes[best].clone())
    }
    fn predict_proba(&self, row: &[f64]) -> Option<Vec<f64>> {
        if row.len() != self.width() {
            return None;
        }
        Some(Self::softmax(&self.scores(row)))
    }
}

// --- Loader ---

fn check_feature_names(names: &Option<Vec<String>>, width: usize) -> Result<()> {
    if let Some(n) = names {
        if n.len() != width {
            return Err(Error::Deserialization(format!(
                "feature_names length {} does not match weight vector length {}",
                n.len(),
                width
            )));
        }
    }
    Ok(())
}

/// Parse artifact bytes into a ready-to-run model.
///
/// Malformed payloads fail with `Deserialization`; a well-formed JSON
/// document with a missing or unknown `kind` fails with
/// `UnsupportedArtifact`.
pub fn load_artifact(bytes: &[u8]) -> Result<Box<dyn ModelArtifact>> {
    let doc: Value =
        serde_json::from_slice(bytes).map_err(|e| Error::Deserialization(e.to_string()))?;
    let kind = doc
        .get("kind")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::UnsupportedArtifact("missing 'kind' tag".into()))?
        .to_string();
    match kind.as_str() {
        "linear_regressor" => {
            let m: LinearRegressor =
                serde_json::from_value(doc).map_err(|e| Error::Deserialization(e.to_string()))?;
            if m.weights.is_empty() {
                return Err(Error::Deserialization("empty weight vector".into()));
            }
            check_feature_names(&m.feature_names, m.weights.len())?;
            Ok(Box::new(m))
        }
        "binary_classifier" => {
            let m: BinaryClassifier =
                serde_json::from_value(doc).map_err(|e| Error::Deserialization(e.to_string()))?;
            if m.weights.is_empty() {
                return Err(Error::Deserialization("empty weight vector".into()));
            }
            if m.classes.len() != 2 {
                return Err(Error::Deserialization(format!(
                    "binary classifier requires exactly 2 classes, got {}",
                    m.classes.len()
                )));
            }
            check_feature_names(&m.feature_names, m.weights.len())?;
            Ok(Box::new(m))
        }
        "multiclass_classifier" => {
            let m: MulticlassClassifier =
                serde_json::from_value(doc).map_err(|e| Error::Deserialization(e.to_string()))?;
            if m.weights.is_empty() {
                return Err(Error::Deserialization("no class weight vectors".into()));
            }
            if m.weights.len() != m.classes.len() || m.weights.len() != m.biases.len() {
                return Err(Error::Deserialization(
                    "weights, biases and classes must have matching lengths".into(),
                ));
            }
            let width = m.width();
            if m.weights.iter().any(|w| w.len() != width) {
                return Err(Error::Deserialization(
                    "class weight vectors have inconsistent lengths".into(),
                ));
            }
            check_feature_names(&m.feature_names, width)?;
            Ok(Box::new(m))
        }
        other => Err(Error::UnsupportedArtifact(other.to_string())),
    }
}

// --- Byte storage ---

/// Durable byte storage, one file per model id under a root directory.
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store artifact bytes for `id`, keeping the upload's file extension.
    pub fn put(&self, id: &str, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        let name = match Path::new(filename).extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{id}.{ext}"),
            None => id.to_string(),
        };
        let path = self.root.join(name);
        fs::write(&path, bytes)?;
        debug!(path = %path.display(), bytes = bytes.len(), "artifact stored");
        Ok(path)
    }

    pub fn get(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(fs::read(path)?)
    }

    /// Remove the artifact file; false when it was already gone.
    pub fn delete(&self, path: &Path) -> bool {
        fs::remove_file(path).is_ok()
    }
}
