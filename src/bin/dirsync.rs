//! # dirsync CLI - one-way directory sync
//!
//! Copies new and modified files from SOURCE to DESTINATION and keeps an
//! index of what was copied.
//!
//! ## Usage
//! ```bash
//! # Sync the current directory into a backup
//! dirsync /mnt/backup/notes
//!
//! # Explicit source, with a summary
//! dirsync -s ~/notes /mnt/backup/notes
//!
//! # See what would be copied, keeping the index next to the source
//! dirsync -n -i ~/notes.idx ~/notes
//! ```

use clap::Parser;
use colored::*;
use dirsync::{DetectionMode, SyncConfig, SyncEngineBuilder, SyncError, SyncResult};
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Takes all files that match the pattern file and copies the ones that are
/// new or modified since the last run to DESTINATION
#[derive(Parser)]
#[command(name = "dirsync")]
#[command(version)]
#[command(about = "One-way directory sync driven by a pattern file and a content index")]
#[command(long_about = None)]
struct Cli {
    /// Source directory (defaults to current), or the destination if only one path is given
    #[arg(value_name = "SOURCE")]
    first: Option<PathBuf>,

    /// Destination directory
    #[arg(value_name = "DESTINATION")]
    second: Option<PathBuf>,

    /// Index file (defaults to DESTINATION/.sync_index)
    #[arg(short, long, value_name = "FILE")]
    index: Option<PathBuf>,

    /// Pattern file (defaults to SOURCE/.sync_pattern)
    #[arg(short, long, value_name = "FILE")]
    pattern: Option<PathBuf>,

    /// Only update the index and report, do not copy
    #[arg(short = 'n', long, visible_alias = "dry-run")]
    nocopy: bool,

    /// Log every step
    #[arg(short, long)]
    verbose: bool,

    /// Print a summary of the changes
    #[arg(short, long)]
    summary: bool,

    /// Hide error messages
    #[arg(short, long, visible_alias = "quiet-errors")]
    repress: bool,

    /// Re-hash files whose timestamp is unchanged
    #[arg(long)]
    checksum: bool,

    /// Print the run result as JSON
    #[arg(long)]
    json: bool,

    /// Show a progress bar while indexing and copying
    #[arg(long)]
    progress: bool,
}

impl Cli {
    /// Source and destination from the positional arguments
    ///
    /// An empty destination is passed through so the builder can reject it
    /// unless copying is disabled.
    fn locations(&self) -> (PathBuf, PathBuf) {
        match (&self.first, &self.second) {
            (Some(source), Some(dest)) => (source.clone(), dest.clone()),
            (Some(dest), None) => (PathBuf::from("."), dest.clone()),
            _ => (PathBuf::from("."), PathBuf::new()),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    // Set up logging
    if cli.verbose {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dirsync=debug"));
        tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
    }

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    match run(&cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            if !cli.repress {
                eprintln!("{}: {}", "Error".red().bold(), e.user_message());
            }
            std::process::exit(e.exit_code());
        }
    }
}

fn run(cli: &Cli) -> Result<i32, SyncError> {
    let (source, dest) = cli.locations();

    let config = SyncConfig {
        index_file: cli.index.clone(),
        pattern_file: cli.pattern.clone(),
        dry_run: cli.nocopy,
        detection: if cli.checksum {
            DetectionMode::Checksum
        } else {
            DetectionMode::Timestamp
        },
    };
    let engine = SyncEngineBuilder::from_config(config).build(source, dest)?;

    let result = if cli.progress {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {prefix:.bold} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        let result = engine.run_with_progress(Some(|info: dirsync::ProgressInfo| {
            if let Some(total) = info.total {
                pb.set_length(total as u64);
            }
            pb.set_prefix(info.operation);
            pb.set_position(info.processed as u64);
            pb.set_message(info.current_item.unwrap_or_default());
        }));
        pb.finish_and_clear();
        result?
    } else {
        engine.run()?
    };

    if !cli.repress {
        for issue in &result.issues {
            eprintln!("{}: {}", "Error".red().bold(), issue);
        }
        if let Some(reason) = &result.persist_error {
            eprintln!("{}: {}", "Error".red().bold(), reason);
        }
    }

    if cli.json {
        match serde_json::to_string_pretty(&result) {
            Ok(json) => println!("{}", json),
            Err(e) => return Err(SyncError::internal(format!("cannot serialize result: {}", e))),
        }
    } else if cli.summary || cli.verbose {
        print_summary(&result);
    }

    if cli.verbose {
        println!(
            "{}",
            format!("Total time: {}", format_duration(Duration::from_millis(result.duration_ms))).dimmed()
        );
    }

    Ok(if result.persist_error.is_some() { 1 } else { 0 })
}

fn print_summary(result: &SyncResult) {
    println!(
        "{} new, {} modified, {} removed (will keep in index)",
        result.new.to_string().green(),
        result.modified.to_string().yellow(),
        result.missing.to_string().red()
    );
    if !result.has_changes() {
        return;
    }
    println!(
        "{}/{} copied{}",
        result.copied.to_string().cyan(),
        result.changed_count(),
        if result.dry_run {
            " (no copy mode, so files not copied)"
        } else {
            ""
        }
    );
}
