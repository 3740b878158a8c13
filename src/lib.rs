//! Versioned ML model registry and inference core.
//!
//! A caller uploads a serialized trained model; the registry keeps a
//! versioned lineage of models sharing a name and serves predictions
//! against deployed artifacts whose feature schema matches the input.
//!
//! Components:
//! - [`artifact`]: durable byte storage plus the artifact-adapter capability
//!   interface (one adapter per supported model family).
//! - [`registry`]: the id -> record mapping and its durable JSON document.
//! - [`versioning`]: lineage resolution, version assignment, the
//!   reconciliation repair pass and promote-on-delete.
//! - [`cache`]: lazy cache of deserialized, ready-to-run models.
//! - [`inference`]: feature alignment, execution, confidence labeling.
//! - [`service`]: the facade exposed to the transport layer.
//!
//! Transport (HTTP/WebSocket), upload validation and UI concerns live
//! outside this crate and consume [`service::ModelService`].

pub mod artifact;
pub mod cache;
pub mod config;
pub mod error;
pub mod inference;
pub mod record;
pub mod registry;
pub mod service;
pub mod versioning;

pub use artifact::{load_artifact, ArtifactStore, ModelArtifact};
pub use cache::ModelCache;
pub use config::{load_config, ServiceConfig};
pub use error::{Error, Result};
pub use inference::{BatchRow, Confidence, FeatureMap, Prediction};
pub use record::{ModelRecord, ModelStatus, ModelType, SaveRequest};
pub use registry::RegistryStore;
pub use service::{ArtifactPreview, ModelService};
pub use versioning::VersionPlacement;
