//! Archive bundler
//!
//! Merges an ordered list of input archives into one executable archive.
//! Input order decides which entry survives a name collision, so reading may
//! happen in parallel but resolution always runs in input order on a single
//! owner of the name table.

use crate::archive::{validate_entry_name, EntryKind, InputArchive, InputSource, ReadError};
use crate::manifest::{self, Manifest, ManifestError};
use crate::writer;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Signature files of signed jars; their digests never match a merged archive
pub const DEFAULT_EXCLUDES: &[&str] = &[
    "META-INF/*.SF",
    "META-INF/*.DSA",
    "META-INF/*.RSA",
    "META-INF/*.EC",
];

/// Errors that can occur while bundling
#[derive(Debug, Error)]
pub enum BundleError {
    /// No inputs were given
    #[error("No input archives given")]
    EmptyInput,

    /// Entry point is empty, padded with whitespace or contains a line break
    #[error("Invalid entry point {0:?}: must be a non-empty single-line class name without surrounding whitespace")]
    InvalidEntryPoint(String),

    /// An exclude pattern failed to compile
    #[error("Invalid exclude pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    /// An extra manifest attribute was rejected
    #[error("Invalid manifest attribute: {0}")]
    Manifest(#[from] ManifestError),

    /// An input could not be read
    #[error("Failed to read input #{index} ({}): {source}", .path.display())]
    Io {
        index: usize,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// An input is not a well-formed archive
    #[error("Malformed archive #{index} ({}): {reason}", .path.display())]
    MalformedArchive {
        index: usize,
        path: PathBuf,
        reason: String,
    },

    /// Two inputs contain the same file under the `Error` policy
    #[error("Duplicate entry {name:?} in input #{first} and input #{second}")]
    DuplicateEntry {
        name: String,
        first: usize,
        second: usize,
    },

    /// The output archive could not be written
    #[error("Failed to write output {}: {source}", .path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Coarse classification of [`BundleError`] for callers that map errors to
/// exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    EmptyInput,
    InvalidArgument,
    Io,
    DuplicateEntry,
}

impl BundleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BundleError::EmptyInput => ErrorKind::EmptyInput,
            BundleError::InvalidEntryPoint(_)
            | BundleError::InvalidPattern { .. }
            | BundleError::Manifest(_) => ErrorKind::InvalidArgument,
            BundleError::Io { .. }
            | BundleError::MalformedArchive { .. }
            | BundleError::Output { .. } => ErrorKind::Io,
            BundleError::DuplicateEntry { .. } => ErrorKind::DuplicateEntry,
        }
    }

    fn from_read(index: usize, path: PathBuf, err: ReadError) -> Self {
        match err {
            ReadError::Io(source) => BundleError::Io {
                index,
                path,
                source,
            },
            ReadError::Malformed(reason) => BundleError::MalformedArchive {
                index,
                path,
                reason,
            },
        }
    }
}

/// What to do when two inputs contain a file with the same name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// Keep the entry from the earliest input
    #[default]
    #[serde(alias = "exclude")]
    FirstWins,

    /// Keep the entry from the latest input
    LastWins,

    /// Fail the whole bundle
    Error,
}

impl DuplicatePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DuplicatePolicy::FirstWins => "first-wins",
            DuplicatePolicy::LastWins => "last-wins",
            DuplicatePolicy::Error => "error",
        }
    }
}

impl fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "first-wins" | "first" | "exclude" => Ok(DuplicatePolicy::FirstWins),
            "last-wins" | "last" => Ok(DuplicatePolicy::LastWins),
            "error" | "fail" => Ok(DuplicatePolicy::Error),
            other => Err(format!(
                "unknown duplicate policy '{}' (expected first-wins, last-wins or error)",
                other
            )),
        }
    }
}

/// Parameters of one bundle run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleOptions {
    /// Class bound to `Main-Class`
    pub entry_point: String,

    pub policy: DuplicatePolicy,

    /// Glob patterns of input entries to drop
    pub exclude: Vec<String>,

    /// Extra main-section manifest attributes
    pub attributes: Vec<(String, String)>,

    /// Read parallelism; 0 means one worker per CPU
    pub jobs: usize,
}

impl BundleOptions {
    pub fn new(entry_point: impl Into<String>) -> Self {
        Self {
            entry_point: entry_point.into(),
            policy: DuplicatePolicy::default(),
            exclude: DEFAULT_EXCLUDES.iter().map(|p| p.to_string()).collect(),
            attributes: Vec::new(),
            jobs: 1,
        }
    }

    pub fn with_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the exclude list, defaults included
    pub fn with_excludes(mut self, patterns: Vec<String>) -> Self {
        self.exclude = patterns;
        self
    }

    pub fn with_exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude.push(pattern.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }
}

/// An entry selected for the output archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedEntry {
    pub name: String,
    pub kind: EntryKind,
    pub payload: Vec<u8>,
    /// Index of the input the payload came from
    pub source: usize,
}

impl MergedEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Counters collected while merging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// File collisions settled by the policy
    pub duplicates_resolved: usize,

    /// Entries dropped by exclude patterns
    pub excluded: usize,

    /// Manifests found in inputs and replaced
    pub manifests_replaced: usize,
}

/// The in-memory result of merging, ready to be written
#[derive(Debug, Clone)]
pub struct MergedArchive {
    manifest: Manifest,
    entries: Vec<MergedEntry>,
    stats: MergeStats,
}

impl MergedArchive {
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Merged entries in first-insertion order, manifest excluded
    pub fn entries(&self) -> &[MergedEntry] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&MergedEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn stats(&self) -> MergeStats {
        self.stats
    }

    /// Serialize to zip bytes
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        writer::to_bytes(self)
    }
}

/// Summary of a successful bundle run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleReport {
    pub output: PathBuf,

    /// Entries written, manifest and its directory included
    pub entries: usize,

    pub stats: MergeStats,

    /// SHA-256 of the written archive
    pub sha256: [u8; 32],
}

impl BundleReport {
    pub fn checksum_hex(&self) -> String {
        hex::encode(self.sha256)
    }
}

/// Archive bundler
///
/// # Example
/// ```no_run
/// use jarpack::{BundleOptions, Bundler, DuplicatePolicy, InputSource};
/// use std::path::Path;
///
/// let options = BundleOptions::new("com.example.Main").with_policy(DuplicatePolicy::LastWins);
/// let bundler = Bundler::new(options).unwrap();
/// let inputs = vec![
///     InputSource::from_path("build/classes"),
///     InputSource::from_path("libs/visual.jar"),
/// ];
/// let report = bundler.bundle(&inputs, Path::new("build/libs/app.jar")).unwrap();
/// println!("{} entries, sha256 {}", report.entries, report.checksum_hex());
/// ```
#[derive(Debug, Clone)]
pub struct Bundler {
    options: BundleOptions,
    excludes: Vec<glob::Pattern>,
    manifest: Manifest,
}

impl Bundler {
    /// Validate options and prepare the manifest
    pub fn new(options: BundleOptions) -> Result<Self, BundleError> {
        let entry_point = options.entry_point.as_str();
        if entry_point.trim().is_empty()
            || entry_point.trim() != entry_point
            || entry_point.contains(['\r', '\n', '\0'])
        {
            return Err(BundleError::InvalidEntryPoint(options.entry_point.clone()));
        }

        let mut manifest = Manifest::executable(entry_point)?;
        for (name, value) in &options.attributes {
            if manifest::is_reserved_attribute(name) {
                return Err(ManifestError::Reserved(name.clone()).into());
            }
            manifest.set(name, value)?;
        }

        let excludes = options
            .exclude
            .iter()
            .map(|pattern| {
                glob::Pattern::new(pattern).map_err(|source| BundleError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            options,
            excludes,
            manifest,
        })
    }

    pub fn options(&self) -> &BundleOptions {
        &self.options
    }

    /// The manifest every output of this bundler carries
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Read, merge and write in one step
    pub fn bundle(&self, sources: &[InputSource], output: &Path) -> Result<BundleReport, BundleError> {
        if sources.is_empty() {
            return Err(BundleError::EmptyInput);
        }
        info!(
            inputs = sources.len(),
            output = %output.display(),
            policy = %self.options.policy,
            "bundling"
        );

        let inputs = self.read_inputs(sources)?;
        let merged = self.merge(inputs)?;
        self.write(&merged, output)
    }

    /// Merge in-memory inputs and write the result
    pub fn bundle_archives(
        &self,
        inputs: Vec<InputArchive>,
        output: &Path,
    ) -> Result<BundleReport, BundleError> {
        let merged = self.merge(inputs)?;
        self.write(&merged, output)
    }

    /// Load every source, in parallel when `jobs` allows it.
    ///
    /// Results come back in input order. On failure the error of the
    /// lowest-indexed failing input is returned, as a sequential read would.
    pub fn read_inputs(&self, sources: &[InputSource]) -> Result<Vec<InputArchive>, BundleError> {
        let jobs = effective_jobs(self.options.jobs, sources.len());

        if jobs <= 1 {
            let mut archives = Vec::with_capacity(sources.len());
            for (index, source) in sources.iter().enumerate() {
                debug!(index, path = %source.path().display(), "reading input");
                let archive = source
                    .read()
                    .map_err(|e| BundleError::from_read(index, source.path().to_path_buf(), e))?;
                archives.push(archive);
            }
            return Ok(archives);
        }

        debug!(jobs, inputs = sources.len(), "reading inputs in parallel");
        read_parallel(sources, jobs)
            .into_iter()
            .enumerate()
            .map(|(index, result)| {
                result.map_err(|e| {
                    BundleError::from_read(index, sources[index].path().to_path_buf(), e)
                })
            })
            .collect()
    }

    /// Resolve all inputs into one entry set under the configured policy
    pub fn merge(&self, inputs: Vec<InputArchive>) -> Result<MergedArchive, BundleError> {
        if inputs.is_empty() {
            return Err(BundleError::EmptyInput);
        }

        let mut entries: Vec<MergedEntry> = Vec::new();
        let mut slots: HashMap<String, usize> = HashMap::new();
        let mut stats = MergeStats::default();

        for (source, archive) in inputs.into_iter().enumerate() {
            let label = PathBuf::from(archive.label());
            let mut seen: HashSet<String> = HashSet::new();

            for entry in archive.into_entries() {
                let malformed = |reason: String| BundleError::MalformedArchive {
                    index: source,
                    path: label.clone(),
                    reason,
                };
                validate_entry_name(&entry.name).map_err(malformed)?;
                if !seen.insert(entry.name.clone()) {
                    return Err(malformed(format!("entry {} appears twice", entry.name)));
                }

                if manifest::is_manifest_path(&entry.name) {
                    self.note_replaced_manifest(source, &entry.payload);
                    stats.manifests_replaced += 1;
                    continue;
                }
                if entry.name.eq_ignore_ascii_case(manifest::MANIFEST_DIR) {
                    continue;
                }
                if self.is_excluded(&entry.name) {
                    debug!(name = %entry.name, source, "excluded");
                    stats.excluded += 1;
                    continue;
                }

                let Some(&slot) = slots.get(&entry.name) else {
                    slots.insert(entry.name.clone(), entries.len());
                    entries.push(MergedEntry {
                        name: entry.name,
                        kind: entry.kind,
                        payload: entry.payload,
                        source,
                    });
                    continue;
                };

                // Shared directories are not conflicts
                if entry.is_dir() {
                    continue;
                }

                let existing = &mut entries[slot];
                match self.options.policy {
                    DuplicatePolicy::FirstWins => {
                        debug!(name = %entry.name, kept = existing.source, dropped = source, "duplicate");
                        stats.duplicates_resolved += 1;
                    }
                    DuplicatePolicy::LastWins => {
                        debug!(name = %entry.name, kept = source, dropped = existing.source, "duplicate");
                        existing.payload = entry.payload;
                        existing.source = source;
                        stats.duplicates_resolved += 1;
                    }
                    DuplicatePolicy::Error => {
                        return Err(BundleError::DuplicateEntry {
                            name: entry.name,
                            first: existing.source,
                            second: source,
                        });
                    }
                }
            }
        }

        Ok(MergedArchive {
            manifest: self.manifest.clone(),
            entries,
            stats,
        })
    }

    /// Atomically write a merged archive to `output`
    pub fn write(&self, merged: &MergedArchive, output: &Path) -> Result<BundleReport, BundleError> {
        let sha256 = writer::write_atomic(merged, output).map_err(|source| BundleError::Output {
            path: output.to_path_buf(),
            source,
        })?;

        let report = BundleReport {
            output: output.to_path_buf(),
            entries: merged.entries.len() + 2,
            stats: merged.stats,
            sha256,
        };
        info!(
            output = %output.display(),
            entries = report.entries,
            duplicates = report.stats.duplicates_resolved,
            "bundle written"
        );
        Ok(report)
    }

    fn is_excluded(&self, name: &str) -> bool {
        self.excludes.iter().any(|pattern| pattern.matches(name))
    }

    fn note_replaced_manifest(&self, source: usize, payload: &[u8]) {
        let previous = Manifest::parse(payload)
            .ok()
            .and_then(|m| m.main_class().map(str::to_string));
        match previous {
            Some(main) if Some(main.as_str()) != self.manifest.main_class() => {
                warn!(source, previous = %main, "replacing input manifest with a different Main-Class");
            }
            _ => debug!(source, "replacing input manifest"),
        }
    }
}

fn effective_jobs(requested: usize, inputs: usize) -> usize {
    let jobs = if requested == 0 {
        num_cpus::get()
    } else {
        requested
    };
    jobs.min(inputs).max(1)
}

/// Read sources on `jobs` scoped workers and hand results back by index
fn read_parallel(sources: &[InputSource], jobs: usize) -> Vec<Result<InputArchive, ReadError>> {
    let next = AtomicUsize::new(0);
    let (tx, rx) = crossbeam::channel::unbounded();

    crossbeam::thread::scope(|scope| {
        for _ in 0..jobs {
            let tx = tx.clone();
            let next = &next;
            scope.spawn(move |_| loop {
                let index = next.fetch_add(1, Ordering::Relaxed);
                let Some(source) = sources.get(index) else {
                    break;
                };
                if tx.send((index, source.read())).is_err() {
                    break;
                }
            });
        }
    })
    .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
    drop(tx);

    let mut slots: Vec<Option<Result<InputArchive, ReadError>>> =
        (0..sources.len()).map(|_| None).collect();
    for (index, result) in rx {
        slots[index] = Some(result);
    }

    slots
        .into_iter()
        .map(|slot| {
            slot.unwrap_or_else(|| {
                Err(ReadError::Io(io::Error::new(
                    io::ErrorKind::Other,
                    "input was not read",
                )))
            })
        })
        .collect()
}
