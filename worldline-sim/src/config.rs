//! Simulator configuration file.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;
use worldline_core::SimulatorConfig;
use worldline_store::StoreConfig;

use crate::error::SimError;

/// Top-level YAML configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub simulator: SimulatorConfig,
    pub store: StoreConfig,
}

impl SimConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Load the file if it exists, otherwise defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content).map_err(|e| SimError::Config(format!("{}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = SimConfig::load_or_default("/definitely/not/here.yaml").unwrap();
        assert_eq!(config, SimConfig::default());
    }

    #[test]
    fn test_load_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("worldline.yaml");
        std::fs::write(
            &path,
            "simulator:\n  verbose: true\n  output_root: /tmp/worlds\nstore:\n  namespace: symbolos\n",
        )
        .unwrap();

        let config = SimConfig::load_or_default(&path).unwrap();
        assert!(config.simulator.verbose);
        assert_eq!(config.simulator.output_root, "/tmp/worlds");
        assert!(config.simulator.compress);
        assert_eq!(config.store.namespace, "symbolos");
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.yaml");
        std::fs::write(&path, "simulator: [unclosed").unwrap();
        assert!(matches!(
            SimConfig::load_or_default(&path),
            Err(SimError::Config(_))
        ));
    }
}
