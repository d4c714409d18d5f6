//! Loader configuration stored in `Mods/Hangar/hangar.toml`.

use crate::error::Result;
use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use std::fs;

pub const CONFIG_FILE_NAME: &str = "hangar.toml";

/// Loader-wide configuration.
///
/// Every section defaults when missing, so a partial file is always valid.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct HangarConfig {
    pub relink: RelinkConfig,
    pub merge: MergeConfig,
    pub log: LogConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RelinkConfig {
    /// Whether shim relinking runs at all.
    pub enabled: bool,
    /// Modules the built-in relink step opens for writing.
    pub modules: Vec<String>,
}

impl Default for RelinkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            modules: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct MergeConfig {
    /// Drop blank lines and repeated header lines when appending to CSV files.
    pub normalize_csv_on_append: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            normalize_csv_on_append: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl HangarConfig {
    /// Parses a config file. Fails if the file is missing or malformed.
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save(&self, path: &Utf8Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Loads the config, writing defaults when the file does not exist.
    ///
    /// A config that cannot be read or parsed is logged and replaced by
    /// defaults in memory; the broken file is left untouched.
    pub fn load_or_create(path: &Utf8Path) -> Self {
        if !path.exists() {
            let config = Self::default();
            if let Err(e) = config.save(path) {
                tracing::warn!("Could not write default config to {}: {}", path, e);
            }
            return config;
        }

        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Could not load config {}, using defaults: {}", path, e);
                Self::default()
            }
        }
    }
}
