//! Input archives
//!
//! An input is an ordered list of named entries. It can come from a zip/jar
//! file, from a directory tree (compiled classes), or be built in memory.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while loading a single input
#[derive(Debug, Error)]
pub enum ReadError {
    /// The input could not be read from disk
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The input was readable but is not a well-formed archive
    #[error("{0}")]
    Malformed(String),
}

impl From<zip::result::ZipError> for ReadError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => ReadError::from_io(e),
            other => ReadError::Malformed(other.to_string()),
        }
    }
}

impl ReadError {
    /// Corrupt payloads surface from the zip reader as `InvalidData`.
    fn from_io(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::InvalidData {
            ReadError::Malformed(err.to_string())
        } else {
            ReadError::Io(err)
        }
    }
}

/// Whether an entry carries data or only marks a directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One named record of an input archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputEntry {
    /// `/`-separated path inside the archive; directories end with `/`
    pub name: String,
    pub kind: EntryKind,
    pub payload: Vec<u8>,
}

impl InputEntry {
    /// Create a file entry
    pub fn file(name: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File,
            payload: payload.into(),
        }
    }

    /// Create a directory entry, appending the trailing `/` if missing
    pub fn directory(name: impl Into<String>) -> Self {
        let mut name = name.into();
        if !name.ends_with('/') {
            name.push('/');
        }
        Self {
            name,
            kind: EntryKind::Directory,
            payload: Vec::new(),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// An input archive loaded into memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputArchive {
    /// Human-readable origin, used in error messages
    label: String,
    entries: Vec<InputEntry>,
}

impl InputArchive {
    /// Build an archive from entries already in memory.
    ///
    /// Entry names are expected to be unique; the bundler rejects the
    /// archive as malformed otherwise.
    pub fn from_entries(label: impl Into<String>, entries: Vec<InputEntry>) -> Self {
        Self {
            label: label.into(),
            entries,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn entries(&self) -> &[InputEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<InputEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Where an input archive lives on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// A zip or jar file
    Archive(PathBuf),

    /// A directory tree whose files become entries
    Directory(PathBuf),
}

impl InputSource {
    /// Pick the source kind from what is on disk.
    ///
    /// Anything that is not a directory is treated as an archive, so a
    /// missing path fails later with an IO error naming it.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if path.is_dir() {
            InputSource::Directory(path)
        } else {
            InputSource::Archive(path)
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            InputSource::Archive(p) | InputSource::Directory(p) => p,
        }
    }

    /// Load every entry of this source into memory
    pub fn read(&self) -> Result<InputArchive, ReadError> {
        let entries = match self {
            InputSource::Archive(path) => read_zip(path)?,
            InputSource::Directory(path) => read_tree(path)?,
        };
        Ok(InputArchive::from_entries(
            self.path().display().to_string(),
            entries,
        ))
    }
}

fn read_zip(path: &Path) -> Result<Vec<InputEntry>, ReadError> {
    let file = File::open(path)?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))?;
    let mut entries = Vec::with_capacity(archive.len());

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_owned();
        if entry.is_dir() {
            entries.push(InputEntry::directory(name));
            continue;
        }

        // Header sizes are untrusted
        let hint = usize::try_from(entry.size()).unwrap_or(0).min(1 << 20);
        let mut payload = Vec::with_capacity(hint);
        entry
            .read_to_end(&mut payload)
            .map_err(ReadError::from_io)?;
        entries.push(InputEntry::file(name, payload));
    }

    Ok(entries)
}

fn read_tree(root: &Path) -> Result<Vec<InputEntry>, ReadError> {
    if !root.is_dir() {
        return Err(ReadError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("not a directory: {}", root.display()),
        )));
    }
    let mut entries = Vec::new();
    walk_tree(root, root, &mut entries)?;
    Ok(entries)
}

fn walk_tree(root: &Path, dir: &Path, entries: &mut Vec<InputEntry>) -> io::Result<()> {
    let mut children = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<io::Result<Vec<_>>>()?;
    // read_dir order is platform dependent
    children.sort();

    for path in children {
        let name = relative_name(root, &path);
        if path.is_dir() {
            entries.push(InputEntry::directory(name));
            walk_tree(root, &path, entries)?;
        } else {
            entries.push(InputEntry::file(name, fs::read(&path)?));
        }
    }
    Ok(())
}

fn relative_name(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Check that an entry name stays inside the archive root.
///
/// Returns the reason on failure.
pub fn validate_entry_name(name: &str) -> Result<(), String> {
    if name.is_empty() || name == "/" {
        return Err("empty entry name".to_string());
    }
    if name.starts_with('/') || name.starts_with('\\') {
        return Err(format!("absolute entry name: {}", name));
    }
    if name.split(['/', '\\']).any(|part| part == "..") {
        return Err(format!("entry name escapes archive root: {}", name));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_directory_entry_gets_trailing_slash() {
        let entry = InputEntry::directory("com/example");
        assert_eq!(entry.name, "com/example/");
        assert!(entry.is_dir());
        assert!(entry.payload.is_empty());
    }

    #[test]
    fn test_validate_entry_name() {
        assert!(validate_entry_name("com/example/Main.class").is_ok());
        assert!(validate_entry_name("META-INF/").is_ok());
        assert!(validate_entry_name("").is_err());
        assert!(validate_entry_name("/etc/passwd").is_err());
        assert!(validate_entry_name("a/../../b").is_err());
        assert!(validate_entry_name("a\\..\\b").is_err());
    }

    #[test]
    fn test_read_tree_sorted_with_directories() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("com/example")).unwrap();
        fs::write(root.join("com/example/Main.class"), b"main").unwrap();
        fs::write(root.join("app.properties"), b"k=v").unwrap();

        let archive = InputSource::from_path(root).read().unwrap();
        let names: Vec<&str> = archive.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["app.properties", "com/", "com/example/", "com/example/Main.class"]
        );
        assert_eq!(archive.entries()[3].payload, b"main");
    }

    #[test]
    fn test_read_zip() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("lib.jar");
        {
            let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
            let options = zip::write::SimpleFileOptions::default();
            zip.add_directory("lib/", options).unwrap();
            zip.start_file("lib/Util.class", options).unwrap();
            zip.write_all(b"util").unwrap();
            zip.finish().unwrap();
        }

        let source = InputSource::from_path(&path);
        assert!(matches!(source, InputSource::Archive(_)));
        let archive = source.read().unwrap();
        assert_eq!(archive.len(), 2);
        assert!(archive.entries()[0].is_dir());
        assert_eq!(archive.entries()[1], InputEntry::file("lib/Util.class", "util"));
    }

    #[test]
    fn test_read_missing_archive_is_io_error() {
        let temp = tempfile::tempdir().unwrap();
        let result = InputSource::Archive(temp.path().join("missing.jar")).read();
        assert!(matches!(result, Err(ReadError::Io(_))));
    }

    #[test]
    fn test_read_garbage_is_malformed() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("broken.jar");
        fs::write(&path, b"this is not a zip file").unwrap();
        let result = InputSource::Archive(path).read();
        assert!(matches!(result, Err(ReadError::Malformed(_))));
    }
}
