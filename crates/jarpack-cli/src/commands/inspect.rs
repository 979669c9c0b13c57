//! `jarpack inspect` — List the entries and main class of an archive.

use crate::output::StyledOutput;
use jarpack::manifest::is_manifest_path;
use jarpack::{InputSource, Manifest};
use std::path::Path;

pub fn execute(archive: &Path, out: &mut StyledOutput) -> anyhow::Result<()> {
    let input = InputSource::Archive(archive.to_path_buf()).read()?;

    let mut manifest = None;
    for entry in input.entries() {
        if entry.is_dir() {
            out.plain(&format!("{:>10}  ", "-"));
            out.info(&entry.name);
        } else {
            out.plain(&format!("{:>10}  {}", entry.payload.len(), entry.name));
            if is_manifest_path(&entry.name) {
                manifest = Some(Manifest::parse(&entry.payload)?);
            }
        }
        out.newline();
    }

    out.newline();
    out.field("entries", &input.len().to_string());
    match manifest.as_ref().and_then(Manifest::main_class) {
        Some(main_class) => out.field("main-class", main_class),
        None => {
            out.warning("No Main-Class in manifest");
            out.newline();
        }
    }
    out.flush();

    Ok(())
}
