//! Feature alignment, prediction execution and confidence labeling.
//!
//! Alignment is strict when the record declares a feature schema: every
//! declared name must be present (all missing names are reported, not just
//! the first) and extra keys are ignored. Without a schema the input values
//! are used in the mapping's iteration order and the response carries
//! `ordering_guaranteed: false` so callers know the fallback was taken.

use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::artifact::ModelArtifact;
use crate::error::{Error, Result};
use crate::record::ModelRecord;

pub type FeatureMap = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Bucket a classifier probability. Boundaries are inclusive: 0.8 is High,
/// 0.6 is Medium.
pub fn confidence_label(probability: f64) -> Confidence {
    if probability >= 0.8 {
        Confidence::High
    } else if probability >= 0.6 {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub model_id: String,
    pub prediction: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    pub ordering_guaranteed: bool,
}

/// One element of a batch result. Rows are independent: a malformed element
/// carries its error here and never aborts the surrounding batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchRow {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Prediction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn numeric(name: &str, value: &Value) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| Error::Validation(format!("feature '{name}' is not numeric")))
}

/// Build the model input vector from a key/value mapping.
///
/// Returns the vector and whether declared-schema ordering applied.
pub fn align_features(record: &ModelRecord, features: &FeatureMap) -> Result<(Vec<f64>, bool)> {
    match &record.feature_names {
        Some(names) => {
            let missing: Vec<String> = names
                .iter()
                .filter(|n| !features.contains_key(*n))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(Error::MissingFeatures(missing));
            }
            let mut row = Vec::with_capacity(names.len());
            for name in names {
                // Presence was checked above.
                if let Some(value) = features.get(name) {
                    row.push(numeric(name, value)?);
                }
            }
            Ok((row, true))
        }
        None => {
            let mut row = Vec::with_capacity(features.len());
            for (name, value) in features {
                row.push(numeric(name, value)?);
            }
            Ok((row, false))
        }
    }
}

fn select_probability(model: &dyn ModelArtifact, prediction: &Value, proba: &[f64]) -> Option<f64> {
    if proba.is_empty() {
        return None;
    }
    let max = proba.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if proba.len() == 2 {
        return Some(max);
    }
    // Multi-class: probability of the predicted class, falling back to the
    // maximum when the predicted label cannot index the vector.
    let by_label = model
        .class_labels()
        .and_then(|labels| labels.iter().position(|l| l == prediction))
        .and_then(|i| proba.get(i).copied());
    Some(by_label.unwrap_or(max))
}

/// Align and execute one prediction against a loaded model.
pub fn predict_row(
    record: &ModelRecord,
    model: &Arc<dyn ModelArtifact>,
    features: &FeatureMap,
) -> Result<Prediction> {
    let (row, ordered) = align_features(record, features)?;
    let prediction = model.predict(&row)?;
    let (probability, confidence) = match model.predict_proba(&row) {
        Some(proba) => match select_probability(model.as_ref(), &prediction, &proba) {
            Some(p) => (Some(p), Some(confidence_label(p))),
            None => (None, None),
        },
        None => (None, None),
    };
    Ok(Prediction {
        model_id: record.id.clone(),
        prediction,
        probability,
        confidence,
        ordering_guaranteed: ordered,
    })
}

/// Batch prediction with per-row outcomes; partial success is expected.
pub fn predict_rows(
    record: &ModelRecord,
    model: &Arc<dyn ModelArtifact>,
    batch: &[FeatureMap],
) -> Vec<BatchRow> {
    batch
        .iter()
        .enumerate()
        .map(|(index, features)| match predict_row(record, model, features) {
            Ok(result) => BatchRow { index, result: Some(result), error: None },
            Err(e) => BatchRow { index, result: None, error: Some(e.to_string()) },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::load_artifact;
    use crate::record::ModelStatus;
    use serde_json::json;
    use std::path::PathBuf;

    fn record_with_schema(names: Option<Vec<&str>>) -> ModelRecord {
        let mut rec = ModelRecord::new("m1".into(), "m", None, PathBuf::from("/tmp/m1.json"));
        rec.status = ModelStatus::Deployed;
        rec.feature_names = names.map(|n| n.into_iter().map(str::to_string).collect());
        rec
    }

    fn features(value: Value) -> FeatureMap {
        value.as_object().unwrap().clone()
    }

    fn classifier() -> Arc<dyn ModelArtifact> {
        let bytes = serde_json::to_vec(&json!({
            "kind": "binary_classifier",
            "weights": [2.0, 0.0, 0.0],
            "bias": 0.0,
            "classes": [0, 1],
            "feature_names": ["a", "b", "c"]
        }))
        .unwrap();
        Arc::from(load_artifact(&bytes).unwrap())
    }

    #[test]
    fn alignment_is_deterministic_regardless_of_key_order() {
        let rec = record_with_schema(Some(vec!["a", "b", "c"]));
        let input = features(json!({"b": 2, "a": 1, "c": 3, "d": 9}));
        let (row, ordered) = align_features(&rec, &input).unwrap();
        assert_eq!(row, vec![1.0, 2.0, 3.0]);
        assert!(ordered);
    }

    #[test]
    fn all_missing_features_are_reported() {
        let rec = record_with_schema(Some(vec!["a", "b", "c"]));
        let input = features(json!({"a": 1}));
        match align_features(&rec, &input) {
            Err(Error::MissingFeatures(names)) => assert_eq!(names, vec!["b", "c"]),
            other => panic!("expected MissingFeatures, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn non_numeric_feature_is_a_validation_error() {
        let rec = record_with_schema(Some(vec!["a"]));
        let input = features(json!({"a": "high"}));
        assert!(matches!(align_features(&rec, &input), Err(Error::Validation(_))));
    }

    #[test]
    fn fallback_without_schema_flags_unguaranteed_ordering() {
        let rec = record_with_schema(None);
        let input = features(json!({"x": 1.5, "y": 2.5}));
        let (row, ordered) = align_features(&rec, &input).unwrap();
        assert_eq!(row.len(), 2);
        assert!(!ordered);
    }

    #[test]
    fn confidence_buckets_are_boundary_inclusive() {
        assert_eq!(confidence_label(0.81), Confidence::High);
        assert_eq!(confidence_label(0.8), Confidence::High);
        assert_eq!(confidence_label(0.65), Confidence::Medium);
        assert_eq!(confidence_label(0.6), Confidence::Medium);
        assert_eq!(confidence_label(0.59), Confidence::Low);
    }

    #[test]
    fn binary_probability_takes_the_larger_class() {
        let rec = record_with_schema(Some(vec!["a", "b", "c"]));
        let model = classifier();
        let out = predict_row(&rec, &model, &features(json!({"a": 3, "b": 0, "c": 0}))).unwrap();
        let p = out.probability.unwrap();
        assert!(p > 0.5);
        assert_eq!(out.prediction, json!(1));
    }

    #[test]
    fn multiclass_uses_predicted_class_probability() {
        let bytes = serde_json::to_vec(&json!({
            "kind": "multiclass_classifier",
            "weights": [[4.0], [0.0], [-4.0]],
            "biases": [0.0, 0.0, 0.0],
            "classes": ["hot", "warm", "cold"]
        }))
        .unwrap();
        let model: Arc<dyn ModelArtifact> = Arc::from(load_artifact(&bytes).unwrap());
        let rec = record_with_schema(Some(vec!["t"]));
        let out = predict_row(&rec, &model, &features(json!({"t": 1.0}))).unwrap();
        assert_eq!(out.prediction, json!("hot"));
        let proba = model.predict_proba(&[1.0]).unwrap();
        assert_eq!(out.probability.unwrap(), proba[0]);
    }

    #[test]
    fn regressor_produces_no_probability_or_confidence() {
        let bytes = serde_json::to_vec(&json!({
            "kind": "linear_regressor",
            "weights": [1.0],
            "bias": 0.5,
            "feature_names": ["a"]
        }))
        .unwrap();
        let model: Arc<dyn ModelArtifact> = Arc::from(load_artifact(&bytes).unwrap());
        let rec = record_with_schema(Some(vec!["a"]));
        let out = predict_row(&rec, &model, &features(json!({"a": 2}))).unwrap();
        assert_eq!(out.prediction.as_f64().unwrap(), 2.5);
        assert!(out.probability.is_none());
        assert!(out.confidence.is_none());
    }

    #[test]
    fn batch_rows_fail_independently() {
        let rec = record_with_schema(Some(vec!["a", "b", "c"]));
        let model = classifier();
        let batch = vec![
            features(json!({"a": 1, "b": 2, "c": 3})),
            features(json!({"a": 1})),
            features(json!({"c": 3, "b": 2, "a": 1})),
        ];
        let rows = predict_rows(&rec, &model, &batch);
        assert_eq!(rows.len(), 3);
        assert!(rows[0].result.is_some() && rows[0].error.is_none());
        assert!(rows[1].result.is_none());
        assert!(rows[1].error.as_ref().unwrap().contains("b"));
        assert!(rows[2].result.is_some());
    }
}
