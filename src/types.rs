//! Core data types used throughout dirsync
//!
//! ## Overview
//!
//! The types in this module represent:
//! - **Index records**: [`IndexEntry`], [`ContentHash`], [`Timestamp`] - one line of the index file
//! - **Run results**: [`SyncResult`], [`SyncIssue`], [`Diagnostics`] - what a sync did and what went wrong
//! - **Configuration**: [`SyncConfig`], [`DetectionMode`] - how a sync behaves
//! - **Progress**: [`ProgressInfo`] - callbacks during long-running steps
//!
//! ## Examples
//!
//! ```rust
//! use dirsync::types::{DetectionMode, SyncConfig};
//!
//! let config = SyncConfig {
//!     dry_run: true,
//!     detection: DetectionMode::Checksum,
//!     ..Default::default()
//! };
//! assert!(config.index_file.is_none());
//! ```

use chrono::{DateTime, Local};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::SystemTime;
use tracing::warn;

/// Length of a hex-encoded content hash
pub const HASH_LEN: usize = 32;

/// Length of a formatted timestamp (`Www Mmm dd HH:MM:SS YYYY`)
pub const TIMESTAMP_LEN: usize = 24;

/// strftime format producing [`Timestamp`] text
pub const TIMESTAMP_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

static TIMESTAMP_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(Mon|Tue|Wed|Thu|Fri|Sat|Sun) (Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec) [ 123][0-9] [012][0-9]:[0-5][0-9]:[0-5][0-9] [12][0-9]{3}$",
    )
    .unwrap()
});

/// Hex digest of a file's content (MD5, 32 hex characters)
///
/// Case is preserved exactly as read so that rewriting an index does not
/// change lines that were not touched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(String);

impl ContentHash {
    /// Validate and wrap a hex digest
    ///
    /// Returns `None` unless `text` is exactly 32 ASCII hex digits.
    pub fn parse(text: &str) -> Option<Self> {
        if text.len() == HASH_LEN && text.bytes().all(|b| b.is_ascii_hexdigit()) {
            Some(Self(text.to_string()))
        } else {
            None
        }
    }

    /// Wrap raw digest bytes
    pub fn from_digest(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes))
    }

    /// Hex text of the digest
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison of two digests
    pub fn same_content(&self, other: &ContentHash) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Modification time in the fixed-width ctime layout
///
/// `Www Mmm dd HH:MM:SS YYYY` in local time, e.g. `Mon Aug 11 13:57:00 2013`.
/// Second granularity: two writes within the same second produce the same
/// timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timestamp(String);

impl Timestamp {
    /// Validate and wrap timestamp text read from an index
    pub fn parse(text: &str) -> Option<Self> {
        if TIMESTAMP_PATTERN.is_match(text) {
            Some(Self(text.to_string()))
        } else {
            None
        }
    }

    /// Format a filesystem time
    pub fn from_system_time(time: SystemTime) -> Self {
        let local: DateTime<Local> = time.into();
        Self(local.format(TIMESTAMP_FORMAT).to_string())
    }

    /// Timestamp text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One record of the content index
///
/// Hash and timestamp are always present together; a file whose hash or
/// timestamp cannot be obtained gets no entry at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Path relative to the source root, `/`-separated
    pub path: String,
    /// Content digest
    pub content_hash: ContentHash,
    /// Modification time when the entry was recorded
    pub modified: Timestamp,
}

impl IndexEntry {
    /// Render the entry as an index line (without newline)
    pub fn to_line(&self) -> String {
        format!("{} {} {}", self.content_hash, self.modified, self.path)
    }
}

/// How the change detector decides that an indexed file was modified
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMode {
    /// Compare formatted modification times only
    #[default]
    Timestamp,
    /// Compare modification times, re-hash on an equal timestamp
    Checksum,
}

/// Configuration for a sync run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Index file (defaults to `<dest>/.sync_index`)
    pub index_file: Option<PathBuf>,
    /// Pattern file (defaults to `<source>/.sync_pattern`)
    pub pattern_file: Option<PathBuf>,
    /// Update the index and report without copying
    pub dry_run: bool,
    /// Change detection strategy
    pub detection: DetectionMode,
}

/// Step of a sync run in which an issue occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueStage {
    /// Pattern expansion
    Discover,
    /// Reading the index file
    IndexLoad,
    /// Comparing files against the index
    Detect,
    /// Hashing changed files
    Reindex,
    /// Copying to the destination
    Copy,
    /// Writing the index file
    Persist,
}

impl fmt::Display for IssueStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IssueStage::Discover => "discover",
            IssueStage::IndexLoad => "index-load",
            IssueStage::Detect => "detect",
            IssueStage::Reindex => "reindex",
            IssueStage::Copy => "copy",
            IssueStage::Persist => "persist",
        };
        f.write_str(name)
    }
}

/// A recoverable, per-item failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncIssue {
    /// Where it happened
    pub stage: IssueStage,
    /// Affected path, if the issue concerns one file
    pub path: Option<String>,
    /// Human-readable description
    pub message: String,
}

impl fmt::Display for SyncIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "[{}] {}: {}", self.stage, path, self.message),
            None => write!(f, "[{}] {}", self.stage, self.message),
        }
    }
}

/// Collector for recoverable issues
///
/// Passed explicitly through every component so that nothing depends on
/// process-wide verbosity state. Each recorded issue is also logged.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    issues: Vec<SyncIssue>,
}

impl Diagnostics {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an issue
    pub fn record(&mut self, stage: IssueStage, path: Option<&str>, error: impl fmt::Display) {
        let message = error.to_string();
        warn!(%stage, path = path.unwrap_or(""), "{}", message);
        self.issues.push(SyncIssue {
            stage,
            path: path.map(str::to_string),
            message,
        });
    }

    /// Issues recorded so far
    pub fn issues(&self) -> &[SyncIssue] {
        &self.issues
    }

    /// Number of recorded issues
    pub fn len(&self) -> usize {
        self.issues.len()
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Issues recorded during one stage
    pub fn in_stage(&self, stage: IssueStage) -> impl Iterator<Item = &SyncIssue> {
        self.issues.iter().filter(move |i| i.stage == stage)
    }

    /// Consume the collector
    pub fn into_issues(self) -> Vec<SyncIssue> {
        self.issues
    }
}

/// Result of a sync run
///
/// Counts are always accurate for what happened in memory, even when the
/// index could not be written (see `persist_error`).
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncResult {
    /// Files with no prior index entry
    pub new: usize,
    /// Indexed files whose timestamp (or hash) changed
    pub modified: usize,
    /// Index entries no longer present in the discovered file set
    pub missing: usize,
    /// Files successfully copied
    pub copied: usize,
    /// Paths classified as new or modified, sorted
    pub changed: Vec<String>,
    /// Whether copying was skipped
    pub dry_run: bool,
    /// Whether the index file was rewritten
    pub index_written: bool,
    /// Why the index could not be written, if it could not
    pub persist_error: Option<String>,
    /// Recoverable problems encountered during the run
    pub issues: Vec<SyncIssue>,
    /// Time taken in milliseconds
    pub duration_ms: u64,
}

impl SyncResult {
    /// Number of files that needed copying
    pub fn changed_count(&self) -> usize {
        self.new + self.modified
    }

    /// Whether any file was new or modified
    pub fn has_changes(&self) -> bool {
        self.changed_count() > 0
    }

    /// Whether the run completed without issues and persisted its index
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty() && self.persist_error.is_none()
    }
}

/// Information passed to progress callbacks
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Operation being performed
    pub operation: String,
    /// Current item being processed
    pub current_item: Option<String>,
    /// Items processed so far
    pub processed: usize,
    /// Total items to process (if known)
    pub total: Option<usize>,
}
