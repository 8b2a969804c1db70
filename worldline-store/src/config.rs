//! Snapshot store configuration.

use serde::{Deserialize, Serialize};

fn default_namespace() -> String {
    "worldline".to_string()
}

fn default_compress_frames() -> bool {
    false
}

/// Where and how frames are persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Key namespace (`<namespace>:worlds:...`)
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// sled directory; no store is opened when unset
    #[serde(default)]
    pub db_path: Option<String>,
    /// Gzip frame payloads
    #[serde(default = "default_compress_frames")]
    pub compress_frames: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            db_path: None,
            compress_frames: default_compress_frames(),
        }
    }
}

impl StoreConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}
