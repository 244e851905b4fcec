//! # bitrot CLI - scrub a directory tree for silent corruption
//!
//! Walks a directory, digests every regular file, and compares the result with
//! the previous run. Files whose content changed while their size, mode and
//! modification time did not are printed to stdout, one line each.
//!
//! ## Usage
//! ```bash
//! # First run records a baseline
//! bitrot /srv/archive
//!
//! # Later runs report corruption
//! bitrot -v /srv/archive
//!
//! # Skip scratch files, keep state somewhere else
//! bitrot --exclude '*.tmp' --exclude 'cache' --state-dir /var/lib/bitrot /srv/archive
//! ```

use bitrot::{
    utils, BitrotError, Result, ScanSummary, ScrubConfig, Scrubber, StateDirectory, WriterSink,
};
use clap::Parser;
use colored::*;
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Detect silent data corruption in a directory tree
#[derive(Parser)]
#[command(name = "bitrot")]
#[command(version)]
#[command(about = "Detect files whose content changed while their metadata did not")]
#[command(long_about = None)]
struct Cli {
    /// Directory to scrub
    root: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// State directory (defaults to $BITROT_STATE_DIR, then ~/.bitrot)
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Exclude paths matching this glob, relative to the root (repeatable)
    #[arg(short, long = "exclude", value_name = "GLOB")]
    exclude: Vec<String>,

    /// Show a progress spinner on stderr
    #[arg(long)]
    progress: bool,

    /// Scan and report, but do not save the updated state
    #[arg(long)]
    dry_run: bool,
}

fn main() {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries only mismatch reports
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.verbose { "bitrot=debug" } else { "warn" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli) {
        eprintln!("{}: {}", "Error".red().bold(), e.user_message());
        std::process::exit(1);
    }
}

/// Load state, scrub, save state
///
/// Everything that can fail before the walk (root, state directory, exclusion
/// patterns, saved state) is checked first, so a bad invocation never touches
/// the state file.
fn run(cli: Cli) -> Result<()> {
    let config = ScrubConfig {
        root_path: utils::resolve_root(&cli.root)?,
        exclude_patterns: cli.exclude,
        state_dir: cli.state_dir,
    };
    let state_dir = StateDirectory::resolve(config.state_dir.as_deref())?;
    info!("Using state file {:?}", state_dir.state_file_for(&config.root_path));

    let mut scrubber = Scrubber::from_config(&config)?;

    let progress = if cli.progress {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .map_err(|e| BitrotError::internal(e.to_string()))?,
        );
        pb.enable_steady_tick(Duration::from_millis(120));
        pb.set_message("Scanning files...");

        let pb_clone = pb.clone();
        scrubber = scrubber.with_progress_callback(Arc::new(move |info| {
            pb_clone.set_message(format!(
                "{} files, {}",
                info.processed,
                utils::format_bytes(info.bytes_processed)
            ));
        }));
        Some(pb)
    } else {
        None
    };

    let stdout = std::io::stdout();
    let mut sink = WriterSink::new(stdout.lock());
    let result = scrubber.run(&state_dir, &mut sink, cli.dry_run);

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }
    let summary = result?;

    if cli.verbose {
        print_summary(&summary);
    }

    Ok(())
}

/// Print scan counters to stderr
fn print_summary(summary: &ScanSummary) {
    let status = if summary.has_mismatches() {
        "✗".red().bold()
    } else {
        "✓".green().bold()
    };

    eprintln!(
        "{} Scrubbed {} files ({})",
        status,
        summary.files_seen.to_string().cyan(),
        utils::format_bytes(summary.bytes_hashed).cyan()
    );
    eprintln!("  New: {}", summary.new.to_string().cyan());
    eprintln!("  Updated: {}", summary.updated.to_string().cyan());
    eprintln!("  Unchanged: {}", summary.unchanged.to_string().cyan());
    if summary.mismatched > 0 {
        eprintln!("  Corrupted: {}", summary.mismatched.to_string().red().bold());
    }
    if summary.skipped > 0 {
        eprintln!("  Skipped: {}", summary.skipped.to_string().yellow());
    }
    if summary.excluded > 0 {
        eprintln!("  Excluded: {}", summary.excluded.to_string().dimmed());
    }
    if summary.stale > 0 {
        eprintln!("  Missing since recorded: {}", summary.stale.to_string().dimmed());
    }
    eprintln!(
        "  Time: {}",
        format_duration(Duration::from_millis(summary.duration_ms))
            .to_string()
            .cyan()
    );
}
