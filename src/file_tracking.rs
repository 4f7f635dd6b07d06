//! Change detection against a stored index
//!
//! Given the set of files discovered under the source root and the index
//! loaded from the last run, [`ChangeDetector`] decides which files need to
//! be copied again:
//!
//! - **new**: no index entry for the path
//! - **modified**: the current modification time, formatted like the index,
//!   differs from the stored one
//! - **unchanged**: timestamps are equal
//!
//! Content is not re-hashed to detect change in the default
//! [`DetectionMode::Timestamp`]. [`DetectionMode::Checksum`] additionally
//! hashes files whose timestamp is unchanged, which catches edits made
//! within the same second as the indexed state.
//!
//! ## Example
//!
//! ```rust,ignore
//! use crate::file_tracking::ChangeDetector;
//!
//! let changes = ChangeDetector::new(root).diff(&files, &index, &mut diags);
//! println!("{} new, {} modified, {} removed", changes.new, changes.modified, changes.missing);
//! ```

use crate::index::ContentIndex;
use crate::pattern::FileSet;
use crate::types::{DetectionMode, Diagnostics, IssueStage};
use crate::utils;
use std::path::PathBuf;
use tracing::{debug, trace};

/// Classification of a single discovered file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChange {
    /// No prior index entry
    New,
    /// Indexed, but changed since
    Modified,
    /// Indexed and unchanged
    Unchanged,
}

/// Outcome of comparing a file set with an index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// New and modified paths, in file set order
    pub changed: Vec<String>,
    /// Number of new files
    pub new: usize,
    /// Number of modified files
    pub modified: usize,
    /// Index entries not present in the file set
    pub missing: usize,
}

impl ChangeSet {
    /// Check if any file needs copying
    pub fn has_changes(&self) -> bool {
        !self.changed.is_empty()
    }

    /// Everything in `files` is new
    pub fn all_new(files: &FileSet) -> Self {
        Self {
            changed: files.iter().map(str::to_string).collect(),
            new: files.len(),
            modified: 0,
            missing: 0,
        }
    }
}

/// Compares discovered files with their index entries
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    /// Source root the file set is relative to
    root: PathBuf,
    /// How modification is decided
    mode: DetectionMode,
}

impl ChangeDetector {
    /// Create a detector using timestamp comparison
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            mode: DetectionMode::Timestamp,
        }
    }

    /// Set the detection mode
    pub fn with_mode(mut self, mode: DetectionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Classify one discovered file
    ///
    /// A file whose current timestamp cannot be read is treated as
    /// modified and an issue is recorded; reindexing will then report it
    /// again and leave its old entry in place.
    pub fn classify(&self, path: &str, index: &ContentIndex, diags: &mut Diagnostics) -> FileChange {
        let Some(entry) = index.get(path) else {
            return FileChange::New;
        };

        let full = self.root.join(path);
        let current = match utils::file_timestamp(&full) {
            Ok(ts) => ts,
            Err(e) => {
                diags.record(IssueStage::Detect, Some(path), format!("unable to read modification time: {}", e));
                return FileChange::Modified;
            }
        };

        if current != entry.modified {
            trace!("{}: {} -> {}", path, entry.modified, current);
            return FileChange::Modified;
        }

        if self.mode == DetectionMode::Checksum {
            match utils::hash_file_content(&full) {
                Ok(hash) if !hash.same_content(&entry.content_hash) => {
                    trace!("{}: same timestamp, content changed", path);
                    return FileChange::Modified;
                }
                Ok(_) => {}
                Err(e) => {
                    diags.record(IssueStage::Detect, Some(path), format!("unable to hash: {}", e));
                    return FileChange::Modified;
                }
            }
        }

        FileChange::Unchanged
    }

    /// Compare `files` with `index`
    ///
    /// `missing` is derived as `|index| + new - |files|`: the number of
    /// indexed paths that were not discovered this run. Those entries stay
    /// in the index.
    pub fn diff(&self, files: &FileSet, index: &ContentIndex, diags: &mut Diagnostics) -> ChangeSet {
        let mut changes = ChangeSet::default();

        for path in files.iter() {
            match self.classify(path, index, diags) {
                FileChange::New => {
                    debug!("new {}", path);
                    changes.new += 1;
                    changes.changed.push(path.to_string());
                }
                FileChange::Modified => {
                    debug!("modified {}", path);
                    changes.modified += 1;
                    changes.changed.push(path.to_string());
                }
                FileChange::Unchanged => {}
            }
        }

        changes.missing = (index.len() + changes.new).saturating_sub(files.len());
        debug!(
            "{} new, {} modified, {} missing",
            changes.new, changes.modified, changes.missing
        );
        changes
    }
}
