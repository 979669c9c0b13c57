//! `jarpack init` — Write a starter jarpack.toml.

use crate::output::StyledOutput;
use std::path::Path;

pub fn execute(path: &Path, main_class: Option<&str>, out: &mut StyledOutput) -> anyhow::Result<()> {
    let config_path = jarpack::commands::init_project(path, main_class)?;
    out.success("Created ");
    out.plain(&config_path.display().to_string());
    out.newline();
    out.flush();
    Ok(())
}
