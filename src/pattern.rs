//! Pattern lists and file discovery
//!
//! A pattern file is a reverse `.gitignore`: each line is a shell glob naming
//! files to sync, and a leading `!` turns it into an exclusion.
//!
//! ```text
//! # sync sources and docs
//! *.rs
//! docs
//! !docs/drafts*    # but not drafts
//! ```
//!
//! Inclusion globs are expanded against the filesystem relative to the
//! source root. A match that is a directory is expanded to its children
//! breadth-first, so `docs` pulls in the whole tree below it. Exclusion
//! globs are matched against the `/`-separated relative path of every
//! candidate, including directories, and `*` in an exclusion may cross
//! directory boundaries.

use crate::error::{Result, SyncError};
use crate::types::{Diagnostics, IssueStage};
use crate::utils;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Default pattern file name, looked up in the source directory
pub const DEFAULT_PATTERN_NAME: &str = ".sync_pattern";

/// Pattern used when no pattern file exists or it is empty
pub const CATCH_ALL: &str = "*";

/// Marker turning a pattern into an exclusion
pub const EXCLUDE_PREFIX: char = '!';

/// A single line of a pattern file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    /// Files to sync
    Include(String),
    /// Files to leave out even if included
    Exclude(String),
}

impl Pattern {
    /// Classify a cleaned-up pattern line
    pub fn parse(text: &str) -> Self {
        match text.strip_prefix(EXCLUDE_PREFIX) {
            Some(rest) => Pattern::Exclude(rest.to_string()),
            None => Pattern::Include(text.to_string()),
        }
    }
}

/// Ordered list of patterns read from a pattern file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternList {
    patterns: Vec<Pattern>,
}

impl PatternList {
    /// A list matching every file under the root
    pub fn catch_all() -> Self {
        Self {
            patterns: vec![Pattern::Include(CATCH_ALL.to_string())],
        }
    }

    /// Parse pattern file text
    ///
    /// Comments run from `#` to end of line, blank lines are skipped and
    /// backslashes are treated as path separators.
    pub fn parse(text: &str) -> Self {
        let patterns = text
            .lines()
            .map(utils::strip_comment)
            .filter(|line| !line.is_empty())
            .map(|line| Pattern::parse(&line.replace('\\', "/")))
            .collect();
        Self { patterns }
    }

    /// Read a pattern file
    ///
    /// Returns `Ok(None)` if the file does not exist.
    ///
    /// # Errors
    ///
    /// - [`SyncError::PatternFile`] if the file exists but cannot be read
    pub fn load(path: &Path) -> Result<Option<Self>> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Some(Self::parse(&text))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(SyncError::PatternFile {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Read a pattern file, falling back to [`PatternList::catch_all`]
    /// when it is missing or contains no patterns
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path)? {
            Some(list) if !list.is_empty() => Ok(list),
            Some(_) => {
                debug!("Pattern file {:?} is empty, matching everything", path);
                Ok(Self::catch_all())
            }
            None => {
                debug!("No pattern file at {:?}, matching everything", path);
                Ok(Self::catch_all())
            }
        }
    }

    /// All patterns in file order
    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    /// Inclusion patterns in file order
    pub fn includes(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().filter_map(|p| match p {
            Pattern::Include(s) => Some(s.as_str()),
            Pattern::Exclude(_) => None,
        })
    }

    /// Exclusion patterns (without the `!` marker) in file order
    pub fn excludes(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().filter_map(|p| match p {
            Pattern::Exclude(s) => Some(s.as_str()),
            Pattern::Include(_) => None,
        })
    }

    /// Number of patterns
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether the list has no patterns
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Deduplicated, sorted set of `/`-separated paths relative to the source root
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSet {
    paths: BTreeSet<String>,
}

impl FileSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a path; returns `false` if it was already present
    pub fn insert(&mut self, path: impl Into<String>) -> bool {
        self.paths.insert(path.into())
    }

    /// Whether the set contains `path`
    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    /// Number of paths
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Paths in lexicographic order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    /// Paths in lexicographic order
    pub fn into_sorted_vec(self) -> Vec<String> {
        self.paths.into_iter().collect()
    }
}

impl FromIterator<String> for FileSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            paths: iter.into_iter().collect(),
        }
    }
}

/// Expands a [`PatternList`] into a [`FileSet`] under a root directory
#[derive(Debug)]
pub struct PatternMatcher {
    /// Canonical source root
    root: PathBuf,
    /// Inclusion globs as written
    includes: Vec<String>,
    /// Compiled exclusion globs
    excludes: GlobSet,
    /// Relative paths excluded along with everything below them
    excluded_subtrees: Vec<String>,
}

impl PatternMatcher {
    /// Compile a pattern list for `root`
    ///
    /// Exclusion patterns that fail to compile are recorded in `diags` and
    /// ignored.
    ///
    /// # Errors
    ///
    /// - [`SyncError::InvalidSource`] if `root` cannot be resolved
    /// - [`SyncError::PathConversion`] if `root` is not valid UTF-8
    pub fn new(patterns: &PatternList, root: &Path, diags: &mut Diagnostics) -> Result<Self> {
        let root = utils::canonicalize(root).map_err(|_| SyncError::InvalidSource(root.to_path_buf()))?;
        if root.to_str().is_none() {
            return Err(SyncError::PathConversion(root.into_os_string()));
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in patterns.excludes() {
            let normalized = normalize_exclude(pattern, &root);
            match Glob::new(&normalized) {
                Ok(glob) => {
                    trace!("Exclusion pattern: {}", normalized);
                    builder.add(glob);
                }
                Err(e) => diags.record(
                    IssueStage::Discover,
                    None,
                    SyncError::invalid_pattern(format!("{}{}", EXCLUDE_PREFIX, pattern), e.kind()),
                ),
            }
        }
        let excludes = builder
            .build()
            .map_err(|e| SyncError::internal(format!("failed to build exclusion set: {}", e)))?;

        Ok(Self {
            root,
            includes: patterns.includes().map(str::to_string).collect(),
            excludes,
            excluded_subtrees: Vec::new(),
        })
    }

    /// Exclude a relative path and everything below it
    pub fn exclude_subtree(&mut self, relative: impl Into<String>) {
        self.excluded_subtrees.push(relative.into());
    }

    /// Whether a relative path is removed by an exclusion
    pub fn is_excluded(&self, relative: &str) -> bool {
        self.excluded_subtrees
            .iter()
            .any(|sub| relative == sub || relative.strip_prefix(sub.as_str()).is_some_and(|rest| rest.starts_with('/')))
            || self.excludes.is_match(relative)
    }

    /// Whether an absolute path outside the root is removed by an exclusion
    ///
    /// Absolute exclusions keep their path minus the leading `/`, so the
    /// path is matched in that form.
    fn is_excluded_absolute(&self, path: &Path) -> bool {
        path.to_str()
            .is_some_and(|p| self.excludes.is_match(p.trim_start_matches('/')))
    }

    /// Expand all inclusion patterns into the set of matching files
    ///
    /// Every match is canonicalised. Matches outside the root, the root
    /// itself, unreadable directories and special files are recorded in
    /// `diags` and left out.
    pub fn resolve(&self, diags: &mut Diagnostics) -> FileSet {
        let options = glob::MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: true,
        };
        // Checked in new()
        let root_str = self.root.to_str().unwrap_or_default();
        let escaped_root = glob::Pattern::escape(root_str);

        let mut queue: VecDeque<PathBuf> = VecDeque::new();
        for pattern in &self.includes {
            let full = if Path::new(pattern).is_absolute() {
                pattern.clone()
            } else {
                format!("{}/{}", escaped_root.trim_end_matches('/'), pattern)
            };

            let paths = match glob::glob_with(&full, options) {
                Ok(paths) => paths,
                Err(e) => {
                    diags.record(IssueStage::Discover, None, SyncError::invalid_pattern(pattern.as_str(), e.msg));
                    continue;
                }
            };

            let before = queue.len();
            for entry in paths {
                match entry {
                    Ok(path) => queue.push_back(path),
                    Err(e) => {
                        let path = e.path().display().to_string();
                        diags.record(IssueStage::Discover, Some(&path), e.error());
                    }
                }
            }
            if queue.len() == before {
                debug!("Pattern {:?} matched nothing", pattern);
            }
        }

        let mut files = FileSet::new();
        let mut visited_dirs: HashSet<PathBuf> = HashSet::new();

        while let Some(candidate) = queue.pop_front() {
            let canonical = match utils::canonicalize(&candidate) {
                Ok(path) => path,
                Err(e) => {
                    diags.record(IssueStage::Discover, Some(&candidate.display().to_string()), e);
                    continue;
                }
            };

            let key = match utils::make_relative(&canonical, &self.root).and_then(|rel| utils::to_index_path(&rel)) {
                Ok(key) => key,
                Err(_) if self.is_excluded_absolute(&canonical) => {
                    debug!("ignoring {}", canonical.display());
                    continue;
                }
                Err(e) => {
                    diags.record(IssueStage::Discover, Some(&canonical.display().to_string()), e);
                    continue;
                }
            };

            if self.is_excluded(&key) {
                debug!("ignoring {}", key);
                continue;
            }

            if canonical.is_dir() {
                if !visited_dirs.insert(canonical.clone()) {
                    continue;
                }
                trace!("Expanding directory {}", key);
                match fs::read_dir(&canonical) {
                    Ok(entries) => {
                        for entry in entries {
                            match entry {
                                Ok(entry) => queue.push_back(entry.path()),
                                Err(e) => diags.record(IssueStage::Discover, Some(&key), e),
                            }
                        }
                    }
                    Err(e) => diags.record(IssueStage::Discover, Some(&key), e),
                }
            } else if canonical.is_file() {
                if files.insert(key.clone()) {
                    trace!("matched {}", key);
                }
            } else {
                diags.record(IssueStage::Discover, Some(&key), "not a regular file");
            }
        }

        debug!("Resolved {} files under {:?}", files.len(), self.root);
        files
    }
}

/// Resolve `patterns` under `root` in one call
pub fn resolve(patterns: &PatternList, root: &Path, diags: &mut Diagnostics) -> Result<FileSet> {
    Ok(PatternMatcher::new(patterns, root, diags)?.resolve(diags))
}

/// Bring an exclusion into the root-relative form candidates are matched in
fn normalize_exclude(pattern: &str, root: &Path) -> String {
    let mut pattern = pattern;
    if Path::new(pattern).is_absolute() {
        if let Some(rest) = root.to_str().and_then(|r| pattern.strip_prefix(r)) {
            pattern = rest;
        }
    }
    let pattern = pattern.trim_start_matches('/');
    let pattern = pattern.strip_prefix("./").unwrap_or(pattern);
    pattern.trim_end_matches('/').to_string()
}
