//! Service configuration: defaults, optional file source, env overrides.

use serde::Deserialize;
use std::path::PathBuf;

use crate::error::Result;

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Directory holding artifact files and the registry document.
    pub storage_dir: PathBuf,
    /// Registry document file name inside `storage_dir`.
    pub registry_file: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("./storage/models"),
            registry_file: "registry.json".into(),
        }
    }
}

impl ServiceConfig {
    pub fn registry_path(&self) -> PathBuf {
        self.storage_dir.join(&self.registry_file)
    }
}

/// Build configuration from defaults, an optional file named by
/// `MODELHUB_CONFIG_FILE`, and `MODELHUB`-prefixed environment variables
/// (e.g. `MODELHUB_STORAGE_DIR`), later sources winning.
pub fn load_config() -> Result<ServiceConfig> {
    let mut builder = config::Config::builder()
        .set_default("storage_dir", "./storage/models")?
        .set_default("registry_file", "registry.json")?;
    if let Ok(file) = std::env::var("MODELHUB_CONFIG_FILE") {
        builder = builder.add_source(config::File::with_name(&file).required(false));
    }
    builder = builder.add_source(config::Environment::with_prefix("MODELHUB"));
    let cfg = builder.build()?;
    Ok(cfg.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_any_sources() {
        let cfg = load_config().unwrap();
        assert_eq!(cfg.registry_file, "registry.json");
        assert_eq!(cfg.registry_path(), PathBuf::from("./storage/models/registry.json"));
    }
}
