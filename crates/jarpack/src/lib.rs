//! Jarpack Library
//!
//! Merges an ordered list of archives into one executable jar:
//! - Input reading (zip/jar files, class directories, in-memory entries)
//! - Duplicate entry resolution (first wins, last wins, or fail)
//! - Manifest synthesis with a fixed `Main-Class`
//! - Deterministic, atomic output writing
//! - Project configuration (jarpack.toml)

pub mod archive;
pub mod bundler;
pub mod commands;
pub mod config;
pub mod manifest;
pub mod writer;

pub use archive::{EntryKind, InputArchive, InputEntry, InputSource, ReadError};
pub use bundler::{
    BundleError, BundleOptions, BundleReport, Bundler, DuplicatePolicy, ErrorKind, MergeStats,
    MergedArchive, MergedEntry, DEFAULT_EXCLUDES,
};
pub use config::{find_project_root, ConfigError, ProjectConfig, CONFIG_FILE};
pub use manifest::{Manifest, ManifestError, MAIN_CLASS, MANIFEST_PATH};
