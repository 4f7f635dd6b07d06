//! Content index for change detection
//!
//! The index records, for every synchronized file, the MD5 of its content
//! and its modification time. It lives in a plain text file, one entry per
//! line:
//!
//! ```text
//! <32 hex digits> <Www Mmm dd HH:MM:SS YYYY> <relative/path>
//! 9e107d9d372bb6826bd81d3542a419d6 Mon Aug 11 13:57:00 2013 docs/readme.txt
//! ```
//!
//! Comments start at `#` and blank lines are ignored. Lines that fail
//! validation are dropped with a diagnostic; the rest of the file still
//! loads. Saving replaces the file atomically.

use crate::error::{Result, SyncError};
use crate::pattern::FileSet;
use crate::types::{ContentHash, Diagnostics, IndexEntry, IssueStage, Timestamp, HASH_LEN, TIMESTAMP_LEN};
use crate::utils;
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, trace};

/// Default index file name, placed in the destination directory
pub const DEFAULT_INDEX_NAME: &str = ".sync_index";

/// Shortest valid line: hash, timestamp, separators and a one-character path
pub const MIN_LINE_LEN: usize = HASH_LEN + 1 + TIMESTAMP_LEN + 1 + 1;

const TIMESTAMP_START: usize = HASH_LEN + 1;
const PATH_START: usize = TIMESTAMP_START + TIMESTAMP_LEN + 1;

/// In-memory mapping of relative path to [`IndexEntry`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentIndex {
    entries: BTreeMap<String, IndexEntry>,
}

impl ContentIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash and stat every file in `files`
    ///
    /// Files that cannot be read are recorded in `diags` and get no entry.
    pub fn build(files: &FileSet, root: &Path, diags: &mut Diagnostics) -> Self {
        let mut index = Self::new();
        index.update(files.iter(), root, diags);
        index
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by relative path
    pub fn get(&self, path: &str) -> Option<&IndexEntry> {
        self.entries.get(path)
    }

    /// Whether `path` has an entry
    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Insert or replace an entry, returning the previous one
    pub fn insert(&mut self, entry: IndexEntry) -> Option<IndexEntry> {
        self.entries.insert(entry.path.clone(), entry)
    }

    /// Remove an entry
    pub fn remove(&mut self, path: &str) -> Option<IndexEntry> {
        self.entries.remove(path)
    }

    /// Entries in path order
    pub fn iter(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }

    /// Recompute hash and timestamp for `paths` and upsert them
    ///
    /// A path that cannot be read keeps its previous entry (if any), so it is
    /// detected as modified again on the next run. Returns the number of
    /// entries written.
    pub fn update<'a>(
        &mut self,
        paths: impl IntoIterator<Item = &'a str>,
        root: &Path,
        diags: &mut Diagnostics,
    ) -> usize {
        let mut updated = 0;
        for path in paths {
            match read_entry(root, path) {
                Ok(entry) => {
                    trace!("Indexed {} ({})", path, entry.content_hash);
                    self.insert(entry);
                    updated += 1;
                }
                Err(e) => diags.record(IssueStage::Reindex, Some(path), format!("unable to get info: {}", e)),
            }
        }
        updated
    }

    /// Parse a single index line
    ///
    /// `line` must already have its comment and surrounding whitespace
    /// removed. Returns `None` if the line is too short, the hash is not 32
    /// hex digits, or the timestamp does not have the fixed ctime layout.
    pub fn parse_line(line: &str) -> Option<IndexEntry> {
        if line.len() < MIN_LINE_LEN {
            return None;
        }
        let bytes = line.as_bytes();
        if bytes[HASH_LEN] != b' ' || bytes[PATH_START - 1] != b' ' {
            return None;
        }

        let content_hash = ContentHash::parse(line.get(..HASH_LEN)?)?;
        let modified = Timestamp::parse(line.get(TIMESTAMP_START..PATH_START - 1)?)?;
        let path = line.get(PATH_START..)?.trim();
        if path.is_empty() {
            return None;
        }

        Some(IndexEntry {
            path: path.to_string(),
            content_hash,
            modified,
        })
    }

    /// Parse index file content
    ///
    /// Invalid lines are recorded in `diags` and skipped. A path appearing
    /// more than once keeps its last entry.
    pub fn parse(content: &[u8], diags: &mut Diagnostics) -> Self {
        let mut index = Self::new();

        for (i, raw) in content.split(|b| *b == b'\n').enumerate() {
            let line_number = i + 1;
            let text = match std::str::from_utf8(raw) {
                Ok(text) => text,
                Err(_) => {
                    diags.record(
                        IssueStage::IndexLoad,
                        None,
                        SyncError::MalformedIndexLine {
                            line_number,
                            line: String::from_utf8_lossy(raw).into_owned(),
                        },
                    );
                    continue;
                }
            };

            let line = utils::strip_comment(text);
            if line.is_empty() {
                continue;
            }

            match Self::parse_line(line) {
                Some(entry) => {
                    index.insert(entry);
                }
                None => diags.record(
                    IssueStage::IndexLoad,
                    None,
                    SyncError::MalformedIndexLine {
                        line_number,
                        line: line.to_string(),
                    },
                ),
            }
        }

        index
    }

    /// Load an index file
    ///
    /// Returns `Ok(None)` when the file does not exist, which is the normal
    /// state before the first sync.
    ///
    /// # Errors
    ///
    /// - [`SyncError::IndexRead`] if the file exists but cannot be read
    pub fn load(path: &Path, diags: &mut Diagnostics) -> Result<Option<Self>> {
        let content = match fs::read(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No index at {:?}", path);
                return Ok(None);
            }
            Err(source) => {
                return Err(SyncError::IndexRead {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let index = Self::parse(&content, diags);
        info!("Loaded {} index entries from {:?}", index.len(), path);
        Ok(Some(index))
    }

    /// Write the index to `path`
    ///
    /// Parent directories are created as needed. Entries are written to a
    /// temporary file next to `path` which then replaces it, so readers see
    /// either the old or the new index. An entry that cannot be written is
    /// recorded in `diags` and skipped. Returns the number of entries written.
    ///
    /// # Errors
    ///
    /// - [`SyncError::IndexWrite`] if the file cannot be created, flushed or
    ///   moved into place; the previous index is left untouched
    pub fn save(&self, path: &Path, diags: &mut Diagnostics) -> Result<usize> {
        let write_err = |source: std::io::Error| SyncError::IndexWrite {
            path: path.to_path_buf(),
            source,
        };

        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(write_err)?;

        let mut temp = NamedTempFile::new_in(&parent).map_err(write_err)?;
        let mut written = 0;
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            for entry in self.entries.values() {
                if entry.path.contains(|c| matches!(c, '#' | '\n' | '\r')) {
                    diags.record(
                        IssueStage::Persist,
                        Some(&entry.path),
                        SyncError::UnrepresentablePath(entry.path.clone()),
                    );
                    continue;
                }
                match writeln!(writer, "{}", entry.to_line()) {
                    Ok(()) => written += 1,
                    Err(e) => diags.record(
                        IssueStage::Persist,
                        Some(&entry.path),
                        format!("unable to write entry: {}", e),
                    ),
                }
            }
            writer.flush().map_err(write_err)?;
        }
        temp.persist(path).map_err(|e| write_err(e.error))?;

        info!("Wrote {} index entries to {:?}", written, path);
        Ok(written)
    }
}

impl FromIterator<IndexEntry> for ContentIndex {
    fn from_iter<I: IntoIterator<Item = IndexEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|e| (e.path.clone(), e)).collect(),
        }
    }
}

/// Stat and hash one file under `root`
///
/// The timestamp is taken before hashing, so a write during hashing leaves
/// a newer mtime on disk and the file is picked up again next run.
pub fn read_entry(root: &Path, path: &str) -> Result<IndexEntry> {
    let full = root.join(path);
    let modified = utils::file_timestamp(&full)?;
    let content_hash = utils::hash_file_content(&full)?;
    Ok(IndexEntry {
        path: path.to_string(),
        content_hash,
        modified,
    })
}
