//! Error taxonomy shared by the registry, versioning, cache and inference layers.
//!
//! Validation and not-found conditions are typed and returned to the immediate
//! caller. Artifact deserialization failures during upload are absorbed into
//! the record's `Error` status instead of propagating (see `service`).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("model not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("missing required features: {}", .0.join(", "))]
    MissingFeatures(Vec<String>),

    #[error("model {0} is not deployed")]
    NotDeployed(String),

    #[error("parent model not found: {0}")]
    ParentNotFound(String),

    #[error("corrupt lineage: parent chain from {0} does not terminate")]
    CorruptLineage(String),

    #[error("storage failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("artifact deserialization failed: {0}")]
    Deserialization(String),

    #[error("unsupported artifact format: {0}")]
    UnsupportedArtifact(String),
}
