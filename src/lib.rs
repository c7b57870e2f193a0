//! dupreport - duplicate file report generator
//!
//! Finds duplicate files below a directory in two steps: files are first
//! grouped by size, and only files sharing a size are hashed (MD5). File
//! metadata lives in a SQLite store, so an interrupted run resumes hashing
//! where it stopped. Duplicates are written as a CSV report.

pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod logging;
pub mod output;
pub mod progress;
pub mod scanner;
pub mod signal;
pub mod store;

use std::io;
use std::sync::Arc;

use anyhow::Context;

use crate::cli::Cli;
use crate::config::Config;
use crate::duplicates::{DuplicateFinder, ScanSummary};
use crate::error::ExitCode;
use crate::output::csv::CsvOutput;
use crate::progress::Progress;
use crate::store::COLUMNS;

/// Run a scan for the parsed command line and write the report.
///
/// Logging is expected to be initialized by the caller.
///
/// # Errors
///
/// Returns an error if configuration is invalid, the scan fails or is
/// interrupted, or the report cannot be written. Files that cannot be read
/// are logged and listed in the summary; a completed run always yields
/// [`ExitCode::Success`].
pub fn run_app(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = Config::load(&cli).context("Failed to load configuration")?;

    let handler = signal::install_handler().context("Failed to install Ctrl+C handler")?;

    let show_progress = !cli.quiet && !cli.no_progress;
    let mut finder_config = config
        .finder_config()
        .with_recreate(cli.recreate)
        .with_verbose(cli.verbose > 0)
        .with_shutdown_flag(handler.flag());
    if show_progress {
        finder_config = finder_config.with_progress_callback(Arc::new(Progress::new(false)));
    }
    if !config.writes_to_stdout() {
        finder_config = finder_config.with_excluded_path(&config.output);
    }

    let finder = DuplicateFinder::new(finder_config);
    let report = finder
        .find_duplicates(&cli.path, &config.db_path)
        .with_context(|| format!("Scan of {} failed", cli.path.display()))?;

    let output = CsvOutput::new(&report.records, &COLUMNS)?.with_dialect(config.csv_dialect());
    if config.writes_to_stdout() {
        output
            .write_to(io::stdout().lock())
            .context("Failed to write report to stdout")?;
    } else {
        output
            .write_file(&config.output)
            .with_context(|| format!("Failed to write report {}", config.output.display()))?;
        log::info!(
            "Wrote {} rows to {}",
            report.records.len(),
            config.output.display()
        );
    }

    print_summary(&report.summary, cli.quiet);
    Ok(ExitCode::Success)
}

fn print_summary(summary: &ScanSummary, quiet: bool) {
    if quiet {
        return;
    }

    eprintln!(
        "{} files ({}), {} size collisions hashed, {} duplicate groups, {} reclaimable{}",
        summary.files_in_store,
        summary.total_size_display(),
        summary.hashed_files,
        summary.duplicate_groups,
        summary.reclaimable_display(),
        if summary.store_reused {
            " [existing store]"
        } else {
            ""
        }
    );
    if summary.skipped_files > 0 {
        eprintln!(
            "{} files skipped: path is not valid UTF-8",
            summary.skipped_files
        );
    }
    if summary.has_failures() {
        eprintln!("{} files could not be hashed:", summary.failed_files);
        for error in &summary.errors {
            eprintln!("  {error}");
        }
    }
}
