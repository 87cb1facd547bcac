use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::selection::RedirectPolicy;
use crate::validator::UploadPolicy;

pub const DEFAULT_CONFIG_FILE: &str = "gallery-sync.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Root of the gallery API, e.g. "https://gallery.example.com"
    pub api_base_url: String,
    /// Durable store holding the cached snapshots
    pub cache_file: String,
    #[serde(default)]
    pub upload: UploadPolicy,
    /// Replace photos that already exist in the target album
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default)]
    pub auth_redirect: RedirectConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedirectConfig {
    pub path: String,
    pub delay_ms: u64,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        let policy = RedirectPolicy::default();
        Self {
            path: policy.path,
            delay_ms: policy.delay.as_millis() as u64,
        }
    }
}

impl RedirectConfig {
    pub fn policy(&self) -> RedirectPolicy {
        RedirectPolicy {
            path: self.path.clone(),
            delay: Duration::from_millis(self.delay_ms),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000".to_string(),
            cache_file: ".gallery-sync/cache.json".to_string(),
            upload: UploadPolicy::default(),
            overwrite: false,
            auth_redirect: RedirectConfig::default(),
        }
    }
}

impl Config {
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;

        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let yaml = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let config = serde_yaml::from_str(&yaml)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        Ok(config)
    }

    pub fn get_config_path(config_arg: &Option<PathBuf>) -> PathBuf {
        config_arg
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }
}
