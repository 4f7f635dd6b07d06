//! Integration tests for dirsync
//!
//! Multi-run scenarios with pattern files, custom index locations and
//! failures in individual steps.

use ::dirsync::*;
use filetime::FileTime;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::info;

/// Test harness owning a source tree and a destination
pub struct SyncTestHarness {
    pub source: TempDir,
    pub dest: TempDir,
    /// Seconds added to the base mtime for each write, so every write gets
    /// a distinct timestamp
    clock: i64,
}

impl SyncTestHarness {
    pub fn new() -> Self {
        Self {
            source: TempDir::new().unwrap(),
            dest: TempDir::new().unwrap(),
            clock: 0,
        }
    }

    /// Write a file under the source with a fresh modification time
    pub fn write(&mut self, relative: &str, content: &str) {
        let path = self.source.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        self.clock += 10;
        filetime::set_file_mtime(&path, FileTime::from_unix_time(1_600_000_000 + self.clock, 0)).unwrap();
    }

    pub fn pattern(&self, text: &str) {
        fs::write(self.source.path().join(".sync_pattern"), text).unwrap();
    }

    pub fn engine(&self) -> SyncEngine {
        SyncEngine::new(self.source.path(), self.dest.path()).unwrap()
    }

    pub fn run(&self) -> SyncResult {
        let result = self.engine().run().unwrap();
        info!("run: {} new, {} modified, {} missing", result.new, result.modified, result.missing);
        result
    }

    pub fn dest_file(&self, relative: &str) -> PathBuf {
        self.dest.path().join(relative)
    }

    pub fn dest_content(&self, relative: &str) -> Option<String> {
        fs::read_to_string(self.dest_file(relative)).ok()
    }

    pub fn index(&self) -> ContentIndex {
        load_index(&self.dest.path().join(".sync_index"))
    }
}

impl Default for SyncTestHarness {
    fn default() -> Self {
        Self::new()
    }
}

pub fn load_index(path: &Path) -> ContentIndex {
    let mut diags = Diagnostics::new();
    let index = ContentIndex::load(path, &mut diags).unwrap().unwrap();
    assert!(diags.is_empty(), "unexpected index issues: {:?}", diags.issues());
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_pattern_file_selects_files() {
        let mut h = SyncTestHarness::new();
        h.write("notes.txt", "n");
        h.write("image.png", "p");
        h.write("docs/guide.md", "g");
        h.write("docs/drafts/wip.md", "w");
        h.write("docs/.hidden", "h");
        h.write("build/out.log", "o");
        h.pattern(
            "# what to back up\n\
             *.txt\n\
             docs          # whole directory\n\
             !docs/drafts\n\
             !*.log\n",
        );

        let result = h.run();
        assert_eq!(result.changed, vec!["docs/.hidden", "docs/guide.md", "notes.txt"]);
        assert!(h.dest_content("image.png").is_none());
        assert!(h.dest_content("docs/drafts/wip.md").is_none());
        assert_eq!(h.index().len(), 3);
    }

    #[test]
    fn test_backslash_patterns_are_separators() {
        let mut h = SyncTestHarness::new();
        h.write("docs/sub/a.txt", "a");
        h.write("docs/b.txt", "b");
        h.pattern("docs\n!docs\\sub\n");

        let result = h.run();
        assert_eq!(result.changed, vec!["docs/b.txt"]);
    }

    #[test]
    fn test_exclusion_crosses_directories() {
        let mut h = SyncTestHarness::new();
        h.write("a.log", "1");
        h.write("deep/er/b.log", "2");
        h.write("deep/er/c.txt", "3");
        h.pattern("*\n!*.log\n");

        let result = h.run();
        assert_eq!(result.changed, vec!["deep/er/c.txt"]);
    }

    #[test]
    fn test_many_runs_copy_only_changes() {
        let mut h = SyncTestHarness::new();
        for i in 0..20 {
            h.write(&format!("dir{}/file{}.txt", i % 4, i), &format!("v1 {}", i));
        }
        assert_eq!(h.run().copied, 20);

        for round in 2..5 {
            let touched: Vec<String> = (0..20)
                .filter(|i| i % round == 0)
                .map(|i| format!("dir{}/file{}.txt", i % 4, i))
                .collect();
            for path in &touched {
                h.write(path, &format!("v{} {}", round, path));
            }

            let result = h.run();
            assert_eq!(result.modified, touched.len());
            assert_eq!(result.new, 0);
            assert_eq!(result.copied, touched.len());
            for path in &touched {
                assert_eq!(h.dest_content(path).unwrap(), format!("v{} {}", round, path));
            }
        }

        assert_eq!(h.run().changed_count(), 0);
    }

    #[test]
    fn test_empty_index_recopies_everything() {
        let mut h = SyncTestHarness::new();
        h.write("a.txt", "original");
        h.run();

        // Only the source side is compared with the index
        fs::write(h.dest_file("a.txt"), "edited at destination").unwrap();
        assert_eq!(h.run().changed_count(), 0);
        assert_eq!(h.dest_content("a.txt").unwrap(), "edited at destination");

        fs::write(h.dest_file(".sync_index"), "").unwrap();
        let result = h.run();
        assert_eq!(result.new, 1);
        assert_eq!(h.dest_content("a.txt").unwrap(), "original");
    }

    #[test]
    fn test_copies_preserve_modification_time() {
        let mut h = SyncTestHarness::new();
        h.write("a.txt", "a");
        h.run();

        let src = fs::metadata(h.source.path().join("a.txt")).unwrap();
        let dst = fs::metadata(h.dest_file("a.txt")).unwrap();
        assert_eq!(
            FileTime::from_last_modification_time(&src),
            FileTime::from_last_modification_time(&dst)
        );
    }

    #[test]
    fn test_checksum_mode_catches_same_timestamp_edits() {
        let mut h = SyncTestHarness::new();
        h.write("a.txt", "before");
        h.run();

        // Same length, same mtime, different bytes
        let path = h.source.path().join("a.txt");
        let mtime = FileTime::from_last_modification_time(&fs::metadata(&path).unwrap());
        fs::write(&path, "after!").unwrap();
        filetime::set_file_mtime(&path, mtime).unwrap();

        assert_eq!(h.run().modified, 0);

        let engine = SyncEngineBuilder::new()
            .detection(DetectionMode::Checksum)
            .build(h.source.path(), h.dest.path())
            .unwrap();
        let result = engine.run().unwrap();
        assert_eq!(result.modified, 1);
        assert_eq!(h.dest_content("a.txt").unwrap(), "after!");
    }

    #[test]
    fn test_custom_index_and_pattern_locations() {
        let mut h = SyncTestHarness::new();
        let meta = TempDir::new().unwrap();
        h.write("keep.txt", "k");
        h.write("skip.bin", "s");
        let pattern_file = meta.path().join("patterns");
        let index_file = meta.path().join("nested/state.idx");
        fs::write(&pattern_file, "*.txt\n").unwrap();

        let engine = SyncEngineBuilder::new()
            .pattern_file(&pattern_file)
            .index_file(&index_file)
            .build(h.source.path(), h.dest.path())
            .unwrap();
        let result = engine.run().unwrap();

        assert_eq!(result.changed, vec!["keep.txt"]);
        assert!(!h.dest_file(".sync_index").exists());
        assert_eq!(load_index(&index_file).len(), 1);
    }

    #[test]
    fn test_index_inside_source_is_not_synced() {
        let mut h = SyncTestHarness::new();
        h.write("a.txt", "a");
        h.pattern("*\n.*\n");
        let index_file = h.source.path().join("state.idx");

        let engine = SyncEngineBuilder::new()
            .index_file(&index_file)
            .build(h.source.path(), h.dest.path())
            .unwrap();
        engine.run().unwrap();
        let second = engine.run().unwrap();

        assert_eq!(second.changed_count(), 0);
        assert!(!h.dest_file("state.idx").exists());
        // The pattern file matches `.*` and is synced like any other file
        assert!(h.dest_file(".sync_pattern").exists());
    }

    #[traced_test]
    #[test]
    fn test_unreadable_index_is_treated_as_absent() {
        let mut h = SyncTestHarness::new();
        h.write("a.txt", "a");
        // A directory where the index should be cannot be read
        fs::create_dir(h.dest_file(".sync_index")).unwrap();

        let result = h.run();
        let load_issues: Vec<_> = result.issues.iter().filter(|i| i.stage == IssueStage::IndexLoad).collect();
        assert_eq!(load_issues.len(), 1);
        assert!(logs_contain("creating index"));
        assert_eq!(result.new, 1);
        assert_eq!(result.copied, 1);
        assert_eq!(h.dest_content("a.txt").unwrap(), "a");

        // The directory is still in the way of the new index
        assert!(!result.index_written);
        assert!(result.persist_error.is_some());
    }

    #[test]
    fn test_unreadable_pattern_file_falls_back_to_catch_all() {
        let mut h = SyncTestHarness::new();
        h.write("a.txt", "a");
        h.write("sub/b.txt", "b");
        fs::create_dir(h.source.path().join(".sync_pattern")).unwrap();

        let result = h.run();
        let discover_issues: Vec<_> = result.issues.iter().filter(|i| i.stage == IssueStage::Discover).collect();
        assert_eq!(discover_issues.len(), 1);
        assert_eq!(discover_issues[0].path, None);
        assert_eq!(result.changed, vec!["a.txt", "sub/b.txt"]);
        assert_eq!(h.dest_content("a.txt").unwrap(), "a");
        assert_eq!(h.index().len(), 2);
    }

    #[traced_test]
    #[test]
    fn test_copy_failure_does_not_stop_the_run() {
        let mut h = SyncTestHarness::new();
        h.write("a.txt", "a");
        h.write("b.txt", "b");
        // A directory in the way of a.txt
        fs::create_dir(h.dest_file("a.txt")).unwrap();

        let result = h.run();
        assert_eq!(result.new, 2);
        assert_eq!(result.copied, 1);
        assert_eq!(h.dest_content("b.txt").unwrap(), "b");

        let copy_issues: Vec<_> = result.issues.iter().filter(|i| i.stage == IssueStage::Copy).collect();
        assert_eq!(copy_issues.len(), 1);
        assert_eq!(copy_issues[0].path.as_deref(), Some("a.txt"));
        assert!(logs_contain("could not copy"));

        // The index is written, without the file that was not copied
        assert!(result.index_written);
        let index = h.index();
        assert_eq!(index.len(), 1);
        assert!(index.get("a.txt").is_none());
        assert!(index.get("b.txt").is_some());
    }

    #[test]
    fn test_failed_copy_is_retried_next_run() {
        let mut h = SyncTestHarness::new();
        h.write("a.txt", "a");
        h.write("b.txt", "b");
        fs::create_dir(h.dest_file("a.txt")).unwrap();
        assert_eq!(h.run().copied, 1);

        fs::remove_dir(h.dest_file("a.txt")).unwrap();
        let result = h.run();
        assert_eq!(result.changed, vec!["a.txt"]);
        assert_eq!(result.new, 1);
        assert_eq!(result.copied, 1);
        assert_eq!(h.dest_content("a.txt").unwrap(), "a");
        assert_eq!(h.index().len(), 2);
    }

    #[test]
    fn test_failed_copy_of_modified_file_keeps_previous_entry() {
        let mut h = SyncTestHarness::new();
        h.write("a.txt", "v1");
        h.run();
        let before = h.index().get("a.txt").cloned().unwrap();

        h.write("a.txt", "v2");
        fs::remove_file(h.dest_file("a.txt")).unwrap();
        fs::create_dir(h.dest_file("a.txt")).unwrap();
        let result = h.run();
        assert_eq!(result.modified, 1);
        assert_eq!(result.copied, 0);
        assert_eq!(h.index().get("a.txt"), Some(&before));

        // Still modified until the copy goes through
        fs::remove_dir(h.dest_file("a.txt")).unwrap();
        let result = h.run();
        assert_eq!(result.modified, 1);
        assert_eq!(result.copied, 1);
        assert_eq!(h.dest_content("a.txt").unwrap(), "v2");
    }

    #[traced_test]
    #[test]
    fn test_failed_index_write_keeps_copies() {
        let mut h = SyncTestHarness::new();
        h.write("a.txt", "a");
        let meta = TempDir::new().unwrap();
        let state_dir = meta.path().join("state");
        fs::create_dir(&state_dir).unwrap();

        let engine = SyncEngineBuilder::new()
            .index_file(state_dir.join("index"))
            .build(h.source.path(), h.dest.path())
            .unwrap();

        // Replace the index directory with a file while the run is copying
        let result = engine
            .run_with_progress(Some(|info: ProgressInfo| {
                if info.operation == "Copying" && state_dir.is_dir() {
                    fs::remove_dir(&state_dir).unwrap();
                    fs::write(&state_dir, "in the way").unwrap();
                }
            }))
            .unwrap();

        assert_eq!(result.copied, 1);
        assert!(!result.index_written);
        assert!(result.persist_error.is_some());
        assert!(!result.is_clean());
        assert_eq!(h.dest_content("a.txt").unwrap(), "a");
        assert!(logs_contain("unable to write index"));
    }

    #[traced_test]
    #[test]
    fn test_interrupted_run_is_repeated() {
        let mut h = SyncTestHarness::new();
        h.write("a.txt", "a");
        h.write("b.txt", "b");
        h.run();

        // Simulate a run that copied but never wrote its index
        let old_index = fs::read(h.dest_file(".sync_index")).unwrap();
        h.write("a.txt", "a2");
        h.run();
        fs::write(h.dest_file(".sync_index"), old_index).unwrap();

        let result = h.run();
        assert_eq!(result.changed, vec!["a.txt"]);
        assert_eq!(h.dest_content("a.txt").unwrap(), "a2");
        assert!(logs_contain("checking for modified files"));
    }

    #[traced_test]
    #[test]
    fn test_malformed_index_lines_are_logged() {
        let mut h = SyncTestHarness::new();
        h.write("a.txt", "a");
        h.write("b.txt", "b");
        h.run();

        let text = fs::read_to_string(h.dest_file(".sync_index")).unwrap();
        let damaged = format!("garbage line\n{}", text.replace("b.txt", ""));
        fs::write(h.dest_file(".sync_index"), damaged).unwrap();

        let result = h.run();
        assert_eq!(result.new, 1);
        assert_eq!(result.changed, vec!["b.txt"]);
        assert_eq!(result.issues.iter().filter(|i| i.stage == IssueStage::IndexLoad).count(), 2);
        assert!(logs_contain("invalid entry on line 1"));
    }
}
