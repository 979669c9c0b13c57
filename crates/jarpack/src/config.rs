//! Project configuration (jarpack.toml)
//!
//! Describes a bundle the way a build file would: which inputs, in which
//! order, the main class and the duplicate policy.

use crate::archive::InputSource;
use crate::bundler::{BundleOptions, DuplicatePolicy, DEFAULT_EXCLUDES};
use crate::manifest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name looked up by project discovery
pub const CONFIG_FILE: &str = "jarpack.toml";

/// Errors that can occur while loading a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize TOML
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// Validation error
    #[error("Invalid config: {0}")]
    ValidationError(String),
}

/// Project configuration file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectConfig {
    /// Bundle settings
    pub bundle: BundleSection,

    /// Extra manifest attributes
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub manifest: BTreeMap<String, String>,
}

/// `[bundle]` table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct BundleSection {
    /// Class bound to `Main-Class`
    pub main_class: String,

    /// Output archive, relative to the config file
    pub output: String,

    /// Duplicate policy (defaults to first-wins)
    #[serde(default)]
    pub duplicates: DuplicatePolicy,

    /// Inputs in merge order, relative to the config file
    pub inputs: Vec<String>,

    /// Exclude patterns; replaces the built-in signature-file list when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Vec<String>>,

    /// Read parallelism
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,
}

impl ProjectConfig {
    /// Create a config with default policy and excludes
    pub fn new(main_class: &str, output: &str, inputs: Vec<String>) -> Self {
        Self {
            bundle: BundleSection {
                main_class: main_class.to_string(),
                output: output.to_string(),
                duplicates: DuplicatePolicy::default(),
                inputs,
                exclude: None,
                jobs: None,
            },
            manifest: BTreeMap::new(),
        }
    }

    /// Parse a config from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse a config from a string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: ProjectConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the config
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bundle.main_class.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "main-class cannot be empty".to_string(),
            ));
        }

        if self.bundle.output.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "output cannot be empty".to_string(),
            ));
        }

        if self.bundle.inputs.is_empty() {
            return Err(ConfigError::ValidationError(
                "inputs cannot be empty".to_string(),
            ));
        }

        for pattern in self.bundle.exclude.iter().flatten() {
            glob::Pattern::new(pattern).map_err(|e| {
                ConfigError::ValidationError(format!("Invalid exclude pattern {:?}: {}", pattern, e))
            })?;
        }

        for name in self.manifest.keys() {
            if !manifest::is_valid_attribute_name(name) {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid manifest attribute name: {}",
                    name
                )));
            }
            if manifest::is_reserved_attribute(name) {
                return Err(ConfigError::ValidationError(format!(
                    "Manifest attribute {} is set by jarpack and cannot be configured",
                    name
                )));
            }
        }

        Ok(())
    }

    /// Write config to a file
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Bundler options described by this config
    pub fn to_options(&self) -> BundleOptions {
        let exclude = match &self.bundle.exclude {
            Some(patterns) => patterns.clone(),
            None => DEFAULT_EXCLUDES.iter().map(|p| p.to_string()).collect(),
        };

        BundleOptions {
            entry_point: self.bundle.main_class.clone(),
            policy: self.bundle.duplicates,
            exclude,
            attributes: self
                .manifest
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            jobs: self.bundle.jobs.unwrap_or(1),
        }
    }

    /// Inputs resolved against the directory holding the config
    pub fn resolve_inputs(&self, base: &Path) -> Vec<InputSource> {
        self.bundle
            .inputs
            .iter()
            .map(|input| InputSource::from_path(resolve_path(base, input)))
            .collect()
    }

    /// Output path resolved against the directory holding the config
    pub fn resolve_output(&self, base: &Path) -> PathBuf {
        resolve_path(base, &self.bundle.output)
    }
}

/// Join relative paths onto `base`; absolute paths pass through
pub fn resolve_path(base: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Find the nearest directory at or above `start_dir` containing jarpack.toml
pub fn find_project_root(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir;

    loop {
        if current.join(CONFIG_FILE).exists() {
            return Some(current.to_path_buf());
        }

        current = current.parent()?;
    }
}
