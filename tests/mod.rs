//! Main test module for dirsync
//!
//! This module includes all test suites:
//! - Integration tests for multi-run sync scenarios
//! - Property-based tests for index and pattern invariants

pub mod integration;

#[cfg(test)]
mod edge_cases {
    use ::dirsync::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_empty_source_directory() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();

        let engine = SyncEngine::new(src.path(), dst.path()).unwrap();
        let result = engine.run().unwrap();
        assert_eq!(result.new, 0);
        assert!(!engine.index_file().exists());

        // Add a file and it shows up as new
        fs::write(src.path().join("file.txt"), "content").unwrap();
        let result = engine.run().unwrap();
        assert_eq!(result.new, 1);
        assert_eq!(result.copied, 1);
    }

    #[test]
    fn test_empty_pattern_file_matches_everything() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::write(src.path().join(".sync_pattern"), "# nothing here\n\n   \n").unwrap();
        fs::write(src.path().join("a.txt"), "a").unwrap();

        let result = SyncEngine::new(src.path(), dst.path()).unwrap().run().unwrap();
        // The pattern file itself is a dotfile at the root, so `*` skips it
        assert_eq!(result.changed, vec!["a.txt"]);
    }

    #[test]
    fn test_empty_files_are_synced() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::write(src.path().join("empty"), "").unwrap();

        let engine = SyncEngine::new(src.path(), dst.path()).unwrap();
        engine.run().unwrap();

        let mut diags = Diagnostics::new();
        let index = ContentIndex::load(engine.index_file(), &mut diags).unwrap().unwrap();
        assert_eq!(index.get("empty").unwrap().content_hash.as_str(), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(fs::metadata(dst.path().join("empty")).unwrap().len(), 0);
    }

    #[test]
    fn test_unicode_and_space_filenames() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let names = ["hello world.txt", "日本語.txt", "émoji 🦀.md"];
        for name in &names {
            fs::write(src.path().join(name), name).unwrap();
        }

        let engine = SyncEngine::new(src.path(), dst.path()).unwrap();
        let result = engine.run().unwrap();
        assert_eq!(result.new, names.len());
        for name in &names {
            assert_eq!(fs::read_to_string(dst.path().join(name)).unwrap(), *name);
        }

        // Paths survive the index round trip
        let again = engine.run().unwrap();
        assert_eq!(again.changed_count(), 0);
    }

    #[test]
    fn test_hash_character_in_filename_is_not_indexed() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::write(src.path().join("issue#12.txt"), "x").unwrap();
        fs::write(src.path().join("plain.txt"), "y").unwrap();

        let engine = SyncEngine::new(src.path(), dst.path()).unwrap();
        let result = engine.run().unwrap();
        assert_eq!(result.copied, 2);
        assert_eq!(
            result
                .issues
                .iter()
                .filter(|i| i.stage == IssueStage::Persist && i.path.as_deref() == Some("issue#12.txt"))
                .count(),
            1
        );

        let index = fs::read_to_string(engine.index_file()).unwrap();
        assert_eq!(index.lines().count(), 1);
        assert!(index.ends_with("plain.txt\n"));
    }

    #[test]
    fn test_deeply_nested_paths() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let deep = (0..12).map(|i| format!("level{}", i)).collect::<Vec<_>>().join("/");
        fs::create_dir_all(src.path().join(&deep)).unwrap();
        fs::write(src.path().join(&deep).join("leaf.txt"), "leaf").unwrap();

        let result = SyncEngine::new(src.path(), dst.path()).unwrap().run().unwrap();
        assert_eq!(result.changed, vec![format!("{}/leaf.txt", deep)]);
        assert!(dst.path().join(&deep).join("leaf.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_to_synced_file_is_not_duplicated() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::write(src.path().join("target.txt"), "target").unwrap();
        std::os::unix::fs::symlink(src.path().join("target.txt"), src.path().join("link.txt")).unwrap();

        let result = SyncEngine::new(src.path(), dst.path()).unwrap().run().unwrap();
        // The link resolves to a path already in the set
        assert_eq!(result.changed, vec!["target.txt"]);
        assert!(!dst.path().join("link.txt").exists());
    }

    #[test]
    fn test_dry_run_without_destination() {
        let src = TempDir::new().unwrap();
        let meta = TempDir::new().unwrap();
        fs::write(src.path().join("a.txt"), "a").unwrap();

        let index = meta.path().join("a.idx");
        let engine = SyncEngineBuilder::new()
            .dry_run(true)
            .index_file(&index)
            .build(src.path(), "")
            .unwrap();
        let result = engine.run().unwrap();

        assert_eq!(result.new, 1);
        assert_eq!(result.copied, 0);
        assert!(index.exists());
    }
}
