//! Project initialization command
//!
//! Creates a starter jarpack.toml.

use crate::config::{ProjectConfig, CONFIG_FILE};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main class written when none is given
pub const DEFAULT_MAIN_CLASS: &str = "com.example.Main";

/// Errors that can occur during project initialization
#[derive(Debug, Error)]
pub enum InitError {
    /// Project already exists
    #[error("Project already exists: jarpack.toml found in {0}")]
    AlreadyExists(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Config error
    #[error("Config error: {0}")]
    ConfigError(#[from] crate::config::ConfigError),
}

/// Write a jarpack.toml into `dir`, returning its path.
///
/// The output jar is named after the directory.
pub fn init_project(dir: &Path, main_class: Option<&str>) -> Result<PathBuf, InitError> {
    let config_path = dir.join(CONFIG_FILE);

    // Check if project already exists
    if config_path.exists() {
        return Err(InitError::AlreadyExists(dir.display().to_string()));
    }

    fs::create_dir_all(dir)?;

    let name = dir
        .canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "app".to_string());

    let config = ProjectConfig::new(
        main_class.unwrap_or(DEFAULT_MAIN_CLASS),
        &format!("build/libs/{}.jar", name),
        vec!["build/classes".to_string(), "libs".to_string()],
    );
    config.validate()?;
    config.to_file(&config_path)?;

    Ok(config_path)
}
