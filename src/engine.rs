//! Sync engine
//!
//! [`SyncEngine`] runs one synchronization from a source directory to a
//! destination directory:
//!
//! 1. **Discover**: read the pattern file and expand it under the source.
//!    An empty result ends the run without touching the index.
//! 2. **Load index**: read the index file; a missing index means every
//!    discovered file is new.
//! 3. **Detect**: compare discovered files with the index.
//! 4. **Reindex**: hash and stat every new or modified file.
//! 5. **Copy**: copy new and modified files to the destination.
//! 6. **Persist**: write the updated index back.
//!
//! Per-file failures in any step are collected in [`SyncResult::issues`].
//! Only an unusable source or destination aborts the run, and that happens
//! before any file is copied or the index is rewritten. A file that fails
//! to copy keeps its previous index entry (or none), so the next run
//! tries it again. Because the index is written last, an
//! interrupted run leaves the old index in place and the next run copies
//! whatever is still outstanding.
//!
//! ## Example
//!
//! ```rust,no_run
//! use dirsync::SyncEngineBuilder;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = SyncEngineBuilder::new().build("./project", "/mnt/backup/project")?;
//! let result = engine.run()?;
//! println!("{} new, {} modified, {} copied", result.new, result.modified, result.copied);
//! # Ok(())
//! # }
//! ```

use crate::copy::FileCopier;
use crate::error::{Result, SyncError};
use crate::file_tracking::{ChangeDetector, ChangeSet};
use crate::index::{ContentIndex, DEFAULT_INDEX_NAME};
use crate::pattern::{PatternList, PatternMatcher, DEFAULT_PATTERN_NAME};
use crate::types::*;
use crate::utils;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// One-way synchronizer between two directories
#[derive(Debug, Clone)]
pub struct SyncEngine {
    /// Canonical source directory
    source: PathBuf,
    /// Absolute destination directory (may not exist yet)
    dest: PathBuf,
    /// Resolved index file
    index_file: PathBuf,
    /// Resolved pattern file
    pattern_file: PathBuf,
    /// Configuration the engine was built with
    config: SyncConfig,
    /// Relative paths under the source that are never synced
    implicit_excludes: Vec<String>,
}

impl SyncEngine {
    /// Create an engine with default configuration
    ///
    /// See [`SyncEngineBuilder::build`] for the checks performed.
    pub fn new(source: impl Into<PathBuf>, dest: impl Into<PathBuf>) -> Result<Self> {
        SyncEngineBuilder::new().build(source, dest)
    }

    /// Canonical source directory
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Destination directory
    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// Index file read and written by this engine
    pub fn index_file(&self) -> &Path {
        &self.index_file
    }

    /// Pattern file read by this engine
    pub fn pattern_file(&self) -> &Path {
        &self.pattern_file
    }

    /// Configuration
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Run a sync
    pub fn run(&self) -> Result<SyncResult> {
        self.run_with_progress::<fn(ProgressInfo)>(None)
    }

    /// Run a sync, reporting progress during reindexing and copying
    ///
    /// # Errors
    ///
    /// - [`SyncError::DestinationUnavailable`] if the destination cannot be created
    ///
    /// A pattern or index file that exists but cannot be read is recorded
    /// as an issue and treated as absent. A failure to write the index is
    /// not an error either; it is reported in [`SyncResult::persist_error`].
    #[instrument(skip(self, progress), fields(source = ?self.source, dest = ?self.dest))]
    pub fn run_with_progress<F>(&self, progress: Option<F>) -> Result<SyncResult>
    where
        F: Fn(ProgressInfo),
    {
        let start = Instant::now();
        let mut diags = Diagnostics::new();
        let mut result = SyncResult {
            dry_run: self.config.dry_run,
            ..Default::default()
        };

        // Discover
        let patterns = match PatternList::load_or_default(&self.pattern_file) {
            Ok(patterns) => patterns,
            Err(e) => {
                diags.record(IssueStage::Discover, None, &e);
                PatternList::catch_all()
            }
        };
        let mut matcher = PatternMatcher::new(&patterns, &self.source, &mut diags)?;
        for relative in &self.implicit_excludes {
            matcher.exclude_subtree(relative.clone());
        }
        let files = matcher.resolve(&mut diags);
        if files.is_empty() {
            info!("no files matching pattern(s)");
            return Ok(finish(result, diags, start));
        }

        if !self.config.dry_run {
            fs::create_dir_all(&self.dest).map_err(|source| SyncError::DestinationUnavailable {
                path: self.dest.clone(),
                source,
            })?;
        }

        // Load index, detect
        let loaded = ContentIndex::load(&self.index_file, &mut diags).unwrap_or_else(|e| {
            diags.record(IssueStage::IndexLoad, None, &e);
            None
        });
        let (mut index, changes) = match loaded {
            Some(index) => {
                info!("checking for modified files");
                let detector = ChangeDetector::new(self.source.clone()).with_mode(self.config.detection);
                let changes = detector.diff(&files, &index, &mut diags);
                (index, changes)
            }
            None => {
                info!("creating index");
                (ContentIndex::new(), ChangeSet::all_new(&files))
            }
        };

        result.new = changes.new;
        result.modified = changes.modified;
        result.missing = changes.missing;

        if !changes.has_changes() {
            info!("index up to date");
            return Ok(finish(result, diags, start));
        }

        // Reindex
        info!("updating index");
        let total = changes.changed.len();
        let mut previous = Vec::with_capacity(total);
        for (i, path) in changes.changed.iter().enumerate() {
            report(&progress, "Indexing", path, i, total);
            previous.push(index.get(path).cloned());
            index.update(std::iter::once(path.as_str()), &self.source, &mut diags);
        }

        // Copy
        if self.config.dry_run {
            debug!("dry run, not copying");
        } else {
            info!("copying files");
            let copier = FileCopier::new(self.source.clone(), self.dest.clone());
            let mut processed = 0;
            let copy_report = copier.copy_all(changes.changed.iter().map(String::as_str), &mut diags, |path| {
                report(&progress, "Copying", path, processed, total);
                processed += 1;
            });
            result.copied = copy_report.copied;

            // A file missing at the destination must look changed next run
            for (path, old) in changes.changed.iter().zip(previous) {
                if !copy_report.failed.contains(path) {
                    continue;
                }
                debug!("keeping {} out of the index until it is copied", path);
                match old {
                    Some(entry) => {
                        index.insert(entry);
                    }
                    None => {
                        index.remove(path);
                    }
                }
            }
        }

        // Persist
        info!("writing index");
        match index.save(&self.index_file, &mut diags) {
            Ok(_) => result.index_written = true,
            Err(e) => {
                warn!("{}", e);
                result.persist_error = Some(e.to_string());
            }
        }

        result.changed = changes.changed;
        Ok(finish(result, diags, start))
    }
}

fn report<F: Fn(ProgressInfo)>(progress: &Option<F>, operation: &str, item: &str, processed: usize, total: usize) {
    if let Some(callback) = progress {
        callback(ProgressInfo {
            operation: operation.to_string(),
            current_item: Some(item.to_string()),
            processed,
            total: Some(total),
        });
    }
}

fn finish(mut result: SyncResult, diags: Diagnostics, start: Instant) -> SyncResult {
    result.issues = diags.into_issues();
    result.duration_ms = start.elapsed().as_millis() as u64;
    info!(
        "{} new, {} modified, {} removed, {} copied in {}ms",
        result.new, result.modified, result.missing, result.copied, result.duration_ms
    );
    result
}

/// Builder for [`SyncEngine`]
///
/// # Examples
///
/// ```rust,no_run
/// use dirsync::{DetectionMode, SyncEngineBuilder};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let engine = SyncEngineBuilder::new()
///     .index_file("/var/lib/dirsync/photos.idx")
///     .pattern_file("./photos.patterns")
///     .detection(DetectionMode::Checksum)
///     .build("./photos", "/mnt/backup/photos")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct SyncEngineBuilder {
    config: SyncConfig,
}

impl SyncEngineBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration
    pub fn from_config(config: SyncConfig) -> Self {
        Self { config }
    }

    /// Set the index file (defaults to `<dest>/.sync_index`)
    pub fn index_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.index_file = Some(path.into());
        self
    }

    /// Set the pattern file (defaults to `<source>/.sync_pattern`)
    pub fn pattern_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pattern_file = Some(path.into());
        self
    }

    /// Update the index and report without copying
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.config.dry_run = dry_run;
        self
    }

    /// Set the change detection mode
    pub fn detection(mut self, mode: DetectionMode) -> Self {
        self.config.detection = mode;
        self
    }

    /// Validate paths and build the engine
    ///
    /// Nothing is created or written here.
    ///
    /// # Errors
    ///
    /// - [`SyncError::InvalidSource`] if `source` is not a directory
    /// - [`SyncError::MissingDestination`] if `dest` is empty and copying is enabled
    /// - [`SyncError::SameSourceAndDestination`] if both resolve to the same
    ///   directory and copying is enabled
    pub fn build(self, source: impl Into<PathBuf>, dest: impl Into<PathBuf>) -> Result<SyncEngine> {
        let source = source.into();
        let dest = dest.into();

        if !source.is_dir() {
            return Err(SyncError::InvalidSource(source));
        }
        let source = utils::canonicalize(&source).map_err(|_| SyncError::InvalidSource(source.clone()))?;

        if dest.as_os_str().is_empty() && !self.config.dry_run {
            return Err(SyncError::MissingDestination);
        }
        let dest = if dest.as_os_str().is_empty() {
            std::env::current_dir()?
        } else {
            utils::absolutize(&dest)?
        };

        if !self.config.dry_run && dest == source {
            return Err(SyncError::SameSourceAndDestination(dest));
        }

        let index_file = match &self.config.index_file {
            Some(path) => utils::absolutize(path)?,
            None => dest.join(DEFAULT_INDEX_NAME),
        };
        let pattern_file = match &self.config.pattern_file {
            Some(path) => utils::absolutize(path)?,
            None => source.join(DEFAULT_PATTERN_NAME),
        };

        let mut implicit_excludes = Vec::new();
        for inner in [&dest, &index_file] {
            if utils::is_strictly_inside(inner, &source) {
                let relative = utils::make_relative(inner, &source).and_then(|rel| utils::to_index_path(&rel))?;
                debug!("excluding {} from sync", relative);
                implicit_excludes.push(relative);
            }
        }

        Ok(SyncEngine {
            source,
            dest,
            index_file,
            pattern_file,
            config: self.config,
            implicit_excludes,
        })
    }
}
