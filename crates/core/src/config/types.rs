use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::converter::{ConverterConfig, ImageConfig, TimeoutConfig, ToolsConfig};

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub image: ImageConfig,
}

impl Config {
    /// Adapter settings carved out of the root configuration.
    pub fn converter(&self) -> ConverterConfig {
        ConverterConfig {
            tools: self.tools.clone(),
            timeouts: self.timeouts.clone(),
            image: self.image.clone(),
        }
    }
}

/// Directories shared with the upload layer and the cleanup sweep
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    /// Where artifacts are written; passed to every adapter call.
    #[serde(default = "default_converted_dir")]
    pub converted_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            converted_dir: default_converted_dir(),
        }
    }
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_converted_dir() -> PathBuf {
    PathBuf::from("converted")
}
