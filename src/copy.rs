//! Copying changed files into the destination tree
//!
//! Each file is copied to the same relative location under the destination
//! root. Missing parent directories are created, permissions are carried
//! over by [`std::fs::copy`], and access/modification times are set to
//! the source's so a copy looks like the original to later runs.

use crate::error::Result;
use crate::types::{Diagnostics, IssueStage};
use filetime::FileTime;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, trace};

/// Copies files from a source root to a destination root
#[derive(Debug, Clone)]
pub struct FileCopier {
    source_root: PathBuf,
    dest_root: PathBuf,
}

impl FileCopier {
    /// Create a copier between two roots
    pub fn new(source_root: PathBuf, dest_root: PathBuf) -> Self {
        Self { source_root, dest_root }
    }

    /// Copy one relative path, preserving timestamps
    ///
    /// Returns `Ok(false)` without copying if the source is a directory.
    pub fn copy_file(&self, relative: &str) -> Result<bool> {
        let source = self.source_root.join(relative);
        let metadata = fs::metadata(&source)?;
        if metadata.is_dir() {
            trace!("skipping directory {}", relative);
            return Ok(false);
        }

        let target = self.dest_root.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::copy(&source, &target)?;
        filetime::set_file_times(
            &target,
            FileTime::from_last_access_time(&metadata),
            FileTime::from_last_modification_time(&metadata),
        )?;
        Ok(true)
    }

    /// Copy every path, recording failures in `diags`
    ///
    /// Failures do not stop the batch; the failed paths are returned in
    /// the report so the caller can keep them out of the index.
    pub fn copy_all<'a, F>(
        &self,
        paths: impl IntoIterator<Item = &'a str>,
        diags: &mut Diagnostics,
        mut on_file: F,
    ) -> CopyReport
    where
        F: FnMut(&str),
    {
        let mut report = CopyReport::default();
        for path in paths {
            on_file(path);
            debug!("copying {}", path);
            match self.copy_file(path) {
                Ok(true) => report.copied += 1,
                Ok(false) => {}
                Err(e) => {
                    diags.record(
                        IssueStage::Copy,
                        Some(path),
                        format!("could not copy to {:?}: {}", self.dest_root.join(path), e),
                    );
                    report.failed.push(path.to_string());
                }
            }
        }
        report
    }
}

/// Outcome of [`FileCopier::copy_all`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyReport {
    /// Files copied
    pub copied: usize,
    /// Paths that could not be copied, in input order
    pub failed: Vec<String>,
}
