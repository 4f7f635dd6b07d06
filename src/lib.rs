//! # dirsync - one-way directory synchronization
//!
//! dirsync copies new and modified files from a source directory to a
//! destination directory and records what it copied in a plain-text index,
//! so the next run only copies what changed since.
//!
//! ## Overview
//!
//! - Files to sync are selected by a pattern file of shell globs, where a
//!   leading `!` excludes (think of it as a reverse `.gitignore`)
//! - Change detection compares modification times against the index, with
//!   an opt-in content checksum mode
//! - Files are never deleted at the destination; files that disappeared
//!   from the source are only counted
//! - The index is rewritten atomically at the end of a run, so an
//!   interrupted run is simply repeated next time
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dirsync::SyncEngine;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = SyncEngine::new("./notes", "/mnt/usb/notes")?;
//! let result = engine.run()?;
//! println!("{} new, {} modified, {} copied", result.new, result.modified, result.copied);
//! for issue in &result.issues {
//!     eprintln!("{}", issue);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Index format
//!
//! One entry per line: 32 hex digits of MD5, a 24-character ctime-style
//! timestamp, and the `/`-separated path relative to the source:
//!
//! ```text
//! 9e107d9d372bb6826bd81d3542a419d6 Mon Aug 11 13:57:00 2013 docs/readme.txt
//! ```
//!
//! ## Error Handling
//!
//! Operations that can abort return `Result<T, SyncError>`. Problems with
//! individual files never abort a run; they are collected as
//! [`SyncIssue`]s in the [`SyncResult`].
//!
//! ## Module Organization
//!
//! - [`engine`]: the sync state machine and its builder
//! - [`pattern`]: pattern files and file discovery
//! - [`index`]: the content index and its file format
//! - [`file_tracking`]: change detection
//! - [`copy`]: copying into the destination
//! - [`types`]: shared data types
//! - [`error`]: error types

pub mod copy;
pub mod engine;
pub mod error;
pub mod file_tracking;
pub mod index;
pub mod pattern;
pub mod types;

mod utils;

pub use engine::{SyncEngine, SyncEngineBuilder};
pub use error::{Result, SyncError};
pub use file_tracking::{ChangeDetector, ChangeSet, FileChange};
pub use index::ContentIndex;
pub use pattern::{FileSet, Pattern, PatternList, PatternMatcher};
pub use types::*;

/// Hash a file's content the way index entries are hashed
pub use utils::hash_file_content;
