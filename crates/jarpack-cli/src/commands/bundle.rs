//! `jarpack bundle` — Merge archives into one executable jar.
//!
//! Flags override the nearest jarpack.toml (or the one given with
//! `--config`). Input arguments replace its `inputs` list only.

use crate::output::StyledOutput;
use anyhow::{anyhow, Context};
use jarpack::{
    find_project_root, BundleError, BundleOptions, Bundler, DuplicatePolicy, InputSource,
    ProjectConfig, CONFIG_FILE, DEFAULT_EXCLUDES,
};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Bundle options collected from the command line
#[derive(Debug, Default)]
pub struct BundleCommand {
    pub inputs: Vec<PathBuf>,
    pub main_class: Option<String>,
    pub output: Option<PathBuf>,
    pub duplicates: Option<DuplicatePolicy>,
    pub exclude: Vec<String>,
    pub no_default_excludes: bool,
    pub attributes: Vec<(String, String)>,
    pub jobs: Option<usize>,
    pub config: Option<PathBuf>,
}

pub fn execute(cmd: BundleCommand, out: &mut StyledOutput) -> anyhow::Result<()> {
    let project = load_project(cmd.config.as_deref())?;

    let mut options = match &project {
        Some((config, _)) => config.to_options(),
        None => BundleOptions::new(String::new()),
    };
    match cmd.main_class {
        Some(main_class) => options.entry_point = main_class,
        None if project.is_none() => {
            return Err(anyhow!(
                "no main class: pass --main-class or create a {}",
                CONFIG_FILE
            ))
        }
        None => {}
    }
    if let Some(policy) = cmd.duplicates {
        options.policy = policy;
    }
    if cmd.no_default_excludes {
        options
            .exclude
            .retain(|pattern| !DEFAULT_EXCLUDES.contains(&pattern.as_str()));
    }
    options.exclude.extend(cmd.exclude);
    options.attributes.extend(cmd.attributes);
    if let Some(jobs) = cmd.jobs {
        options.jobs = jobs;
    }

    let policy = options.policy;
    let bundler = Bundler::new(options)?;

    let inputs: Vec<InputSource> = if !cmd.inputs.is_empty() {
        cmd.inputs.into_iter().map(InputSource::from_path).collect()
    } else if let Some((config, base)) = &project {
        config.resolve_inputs(base)
    } else {
        Vec::new()
    };
    if inputs.is_empty() {
        return Err(BundleError::EmptyInput.into());
    }

    let output = match (cmd.output, &project) {
        (Some(path), _) => path,
        (None, Some((config, base))) => config.resolve_output(base),
        (None, None) => {
            return Err(anyhow!(
                "no output path: pass --output or create a {}",
                CONFIG_FILE
            ))
        }
    };

    let report = bundler.bundle(&inputs, &output)?;

    out.success("Bundled ");
    out.bold(&report.output.display().to_string());
    out.newline();
    out.field("inputs", &inputs.len().to_string());
    out.field("entries", &report.entries.to_string());
    out.field(
        "duplicates",
        &format!("{} resolved ({})", report.stats.duplicates_resolved, policy),
    );
    out.field("excluded", &report.stats.excluded.to_string());
    out.field("sha256", &report.checksum_hex());
    out.flush();

    Ok(())
}

/// Load the explicit config, or the nearest one above the working directory.
///
/// Returns the config with the directory its relative paths are based on.
fn load_project(explicit: Option<&Path>) -> anyhow::Result<Option<(ProjectConfig, PathBuf)>> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let cwd = std::env::current_dir().context("cannot determine current directory")?;
            match find_project_root(&cwd) {
                Some(root) => root.join(CONFIG_FILE),
                None => return Ok(None),
            }
        }
    };

    debug!(config = %path.display(), "loading project config");
    let config = ProjectConfig::from_file(&path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    let base = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    Ok(Some((config, base)))
}
