//! Configuration for running simulations.

use serde::{Deserialize, Serialize};

/// Simulator settings shared by the executor and the archive writers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Log per-step detail at info instead of debug
    pub verbose: bool,
    /// Root directory for written worlds
    pub output_root: String,
    /// Sub-directory of `output_root` holding archives
    pub archive_dir_name: String,
    /// Gzip frames and archives
    pub compress: bool,
    /// Write a frame file after every step
    pub save_frames: bool,
    /// Default for `PipelineArgs::store_pipeline_run`
    pub store_pipeline_run: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            output_root: "sandbox/worlds".to_string(),
            archive_dir_name: "archives".to_string(),
            compress: true,
            save_frames: true,
            store_pipeline_run: true,
        }
    }
}

impl SimulatorConfig {
    /// Load config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Directory archives are written under.
    pub fn archive_root(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.output_root).join(&self.archive_dir_name)
    }
}
