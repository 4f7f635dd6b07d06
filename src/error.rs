//! Error types for dirsync
//!
//! Only categorical failures unwind a sync run: an invalid source directory
//! or a destination that cannot be used. Everything else, including an
//! unreadable pattern or index file, is recorded as a
//! [`SyncIssue`](crate::types::SyncIssue) and the run carries on.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the dirsync library
pub type Result<T> = std::result::Result<T, SyncError>;

/// Main error type for all dirsync operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Source path is missing or not a directory
    #[error("source {0:?} is not a directory")]
    InvalidSource(PathBuf),

    /// No destination was given while copying is enabled
    #[error("no destination specified")]
    MissingDestination,

    /// Source and destination resolve to the same directory
    #[error("source and destination directory cannot be the same: {0:?}")]
    SameSourceAndDestination(PathBuf),

    /// Destination root could not be created
    #[error("could not ensure destination {path:?} exists: {source}")]
    DestinationUnavailable {
        /// Destination root
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Pattern file exists but could not be read
    #[error("unable to read pattern file {path:?}: {source}")]
    PatternFile {
        /// Pattern file path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Index file exists but could not be read
    #[error("unable to read index {path:?}: {source}")]
    IndexRead {
        /// Index file path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Index file could not be written
    #[error("unable to write index {path:?}: {source}")]
    IndexWrite {
        /// Index file path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Glob pattern could not be compiled
    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern {
        /// Pattern as written in the pattern file
        pattern: String,
        /// Parser message
        reason: String,
    },

    /// A pattern expanded to a path outside the source directory
    #[error("file {path:?} is not in directory {root:?}")]
    OutsideRoot {
        /// Offending path (canonical)
        path: PathBuf,
        /// Source root (canonical)
        root: PathBuf,
    },

    /// Path is not valid UTF-8 and cannot be stored in the index
    #[error("path is not valid UTF-8: {0:?}")]
    PathConversion(std::ffi::OsString),

    /// Index line failed validation
    #[error("invalid entry on line {line_number}: {line:?}")]
    MalformedIndexLine {
        /// 1-based line number in the index file
        line_number: usize,
        /// Line content after comment stripping
        line: String,
    },

    /// Path cannot be written to the line-oriented index format
    #[error("path {0:?} cannot be represented in the index")]
    UnrepresentablePath(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        SyncError::Internal(msg.into())
    }

    /// Create an invalid-pattern error
    pub fn invalid_pattern(pattern: impl Into<String>, reason: impl ToString) -> Self {
        SyncError::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.to_string(),
        }
    }

    /// Check if this error is a usage or precondition failure
    ///
    /// These are raised before anything is read from or written to the
    /// destination, so the caller can abort without cleanup.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidSource(_)
                | SyncError::MissingDestination
                | SyncError::SameSourceAndDestination(_)
                | SyncError::DestinationUnavailable { .. }
        )
    }

    /// Process exit code for this error when it aborts the CLI
    pub fn exit_code(&self) -> i32 {
        if self.is_precondition() {
            2
        } else {
            1
        }
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            SyncError::MissingDestination => {
                "no destination specified... aborting. Pass a DESTINATION or use --nocopy.".to_string()
            }
            SyncError::SameSourceAndDestination(path) => {
                format!("source and destination directory cannot be the same ({:?}).", path)
            }
            SyncError::DestinationUnavailable { path, source } => {
                format!(
                    "could not create destination {:?} ({}). Check that its parent exists and is writable.",
                    path, source
                )
            }
            _ => self.to_string(),
        }
    }
}
