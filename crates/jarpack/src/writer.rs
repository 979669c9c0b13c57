//! Output archive serialization
//!
//! Entries are written with pinned timestamps and permissions so the same
//! merged archive always produces the same bytes. The file on disk only
//! appears once it is complete.

use crate::bundler::MergedArchive;
use crate::manifest::{MANIFEST_DIR, MANIFEST_PATH};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Cursor, Seek, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

fn file_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644)
}

fn dir_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o755)
}

fn zip_err(err: zip::result::ZipError) -> io::Error {
    match err {
        zip::result::ZipError::Io(e) => e,
        other => io::Error::new(io::ErrorKind::Other, other),
    }
}

/// Write the manifest first, then entries in merge order
pub fn write_zip<W: Write + Seek>(archive: &MergedArchive, writer: W) -> io::Result<W> {
    let mut zip = ZipWriter::new(writer);

    zip.add_directory(MANIFEST_DIR, dir_options())
        .map_err(zip_err)?;
    zip.start_file(MANIFEST_PATH, file_options())
        .map_err(zip_err)?;
    zip.write_all(&archive.manifest().to_bytes())?;

    for entry in archive.entries() {
        if entry.is_dir() {
            zip.add_directory(entry.name.as_str(), dir_options())
                .map_err(zip_err)?;
        } else {
            zip.start_file(entry.name.as_str(), file_options())
                .map_err(zip_err)?;
            zip.write_all(&entry.payload)?;
        }
    }

    zip.finish().map_err(zip_err)
}

/// Serialize to an in-memory zip
pub fn to_bytes(archive: &MergedArchive) -> io::Result<Vec<u8>> {
    Ok(write_zip(archive, Cursor::new(Vec::new()))?.into_inner())
}

/// Write `archive` to `output` through a temporary file in the same
/// directory, returning the SHA-256 of the written bytes.
///
/// On error the temporary file and any parent directories created for it
/// are removed, and an existing `output` is left as it was.
pub fn write_atomic(archive: &MergedArchive, output: &Path) -> io::Result<[u8; 32]> {
    let bytes = to_bytes(archive)?;
    let checksum: [u8; 32] = Sha256::digest(&bytes).into();

    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    // Innermost first
    let created: Vec<PathBuf> = dir
        .ancestors()
        .take_while(|p| !p.as_os_str().is_empty() && !p.exists())
        .map(Path::to_path_buf)
        .collect();

    let result = fs::create_dir_all(dir).and_then(|()| persist_in(dir, &bytes, output));
    if result.is_err() {
        for path in &created {
            let _ = fs::remove_dir(path);
        }
    }
    result?;

    Ok(checksum)
}

fn persist_in(dir: &Path, bytes: &[u8], output: &Path) -> io::Result<()> {
    let mut tmp = tempfile::Builder::new()
        .prefix(".jarpack-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;

    // Move to final location
    tmp.persist(output).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{InputArchive, InputEntry};
    use crate::bundler::{BundleOptions, Bundler};
    use std::io::Read;

    fn merged() -> MergedArchive {
        Bundler::new(BundleOptions::new("com.example.Main"))
            .unwrap()
            .merge(vec![InputArchive::from_entries(
                "mem",
                vec![
                    InputEntry::directory("com/"),
                    InputEntry::file("com/Main.class", "main"),
                ],
            )])
            .unwrap()
    }

    #[test]
    fn test_manifest_written_first() {
        let bytes = to_bytes(&merged()).unwrap();
        let mut zip = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let names: Vec<String> = (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["META-INF/", "META-INF/MANIFEST.MF", "com/", "com/Main.class"]
        );

        let mut main = String::new();
        zip.by_name("com/Main.class")
            .unwrap()
            .read_to_string(&mut main)
            .unwrap();
        assert_eq!(main, "main");
    }

    #[test]
    fn test_serialization_is_deterministic() {
        let archive = merged();
        assert_eq!(to_bytes(&archive).unwrap(), to_bytes(&archive).unwrap());
    }

    #[test]
    fn test_write_atomic_creates_parent_and_leaves_no_temp() {
        let temp = tempfile::tempdir().unwrap();
        let output = temp.path().join("build/libs/app.jar");
        let checksum = write_atomic(&merged(), &output).unwrap();

        let written = fs::read(&output).unwrap();
        let expected: [u8; 32] = Sha256::digest(&written).into();
        assert_eq!(checksum, expected);

        let leftovers: Vec<_> = fs::read_dir(output.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_failed_write_removes_created_parents() {
        let temp = tempfile::tempdir().unwrap();
        // Too long for a single path component, so the final rename fails
        let name = format!("{}.jar", "x".repeat(300));
        let output = temp.path().join("build/libs").join(name);

        assert!(write_atomic(&merged(), &output).is_err());
        assert!(!temp.path().join("build").exists());
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_failed_write_keeps_existing_parents() {
        let temp = tempfile::tempdir().unwrap();
        let output = temp.path().join("out.jar");
        fs::create_dir(&output).unwrap();

        assert!(write_atomic(&merged(), &output).is_err());
        assert!(output.is_dir());
        let leftovers: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("out.jar")]);
    }
}
