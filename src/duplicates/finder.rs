//! Duplicate finder implementation with a store-backed size/hash funnel.
//!
//! # Overview
//!
//! This module orchestrates the duplicate detection pipeline:
//! 1. **Populate** - Walk the tree and bulk-insert one record per file
//! 2. **Hash** - Digest only files whose size collides with another file,
//!    writing each batch of digests back in one transaction
//! 3. **Report** - Query records sharing a digest and size
//!
//! Each step is a transition of [`PipelineState`]; calling one out of order
//! is an error rather than a silent re-run.
//!
//! # Example
//!
//! ```no_run
//! use dupreport::duplicates::{DuplicateFinder, FinderConfig};
//! use std::path::Path;
//!
//! let finder = DuplicateFinder::new(FinderConfig::default().with_io_threads(2));
//! let report = finder
//!     .find_duplicates(Path::new("."), Path::new("duplicates.sqlite3"))
//!     .unwrap();
//!
//! println!("{} duplicate groups", report.summary.duplicate_groups);
//! println!("Reclaimable space: {}", report.summary.reclaimable_display());
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytesize::ByteSize;
use rayon::prelude::*;

use super::groups::{collect_groups, reclaimable_space, DuplicateGroup};
use crate::progress::{Phase, ProgressCallback};
use crate::scanner::{Digest, HashError, Hasher, Walker, DEFAULT_CHUNK_SIZE};
use crate::store::{
    store_file_paths, FileRecord, FileStore, GroupOrder, RecordError, StoreError, StoreState,
};

/// Default number of hashing threads.
pub const DEFAULT_IO_THREADS: usize = 4;

/// Default number of digests committed per transaction.
pub const DEFAULT_BATCH_SIZE: usize = 256;

/// Configuration for the duplicate finder.
#[derive(Clone)]
pub struct FinderConfig {
    /// Remove any existing store and rescan.
    pub recreate: bool,
    /// Echo every directory and hashed location at info level.
    pub verbose: bool,
    /// Row order of the report.
    pub order: GroupOrder,
    /// Read buffer size for hashing.
    pub chunk_size: usize,
    /// Number of I/O threads for parallel hashing.
    /// Default is 4 to avoid disk thrashing. `1` hashes strictly in order.
    pub io_threads: usize,
    /// Number of files hashed between store commits.
    pub batch_size: usize,
    /// Shutdown flag for graceful termination.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Progress callback for reporting.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
    /// Files below the root that are never stored, such as the report.
    pub excluded_paths: Vec<PathBuf>,
}

impl fmt::Debug for FinderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FinderConfig")
            .field("recreate", &self.recreate)
            .field("verbose", &self.verbose)
            .field("order", &self.order)
            .field("chunk_size", &self.chunk_size)
            .field("io_threads", &self.io_threads)
            .field("batch_size", &self.batch_size)
            .field("shutdown_flag", &self.shutdown_flag.is_some())
            .field("progress_callback", &self.progress_callback.is_some())
            .field("excluded_paths", &self.excluded_paths)
            .finish()
    }
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            recreate: false,
            verbose: false,
            order: GroupOrder::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            io_threads: DEFAULT_IO_THREADS,
            batch_size: DEFAULT_BATCH_SIZE,
            shutdown_flag: None,
            progress_callback: None,
            excluded_paths: Vec::new(),
        }
    }
}

impl FinderConfig {
    /// Discard any existing store before scanning.
    #[must_use]
    pub fn with_recreate(mut self, recreate: bool) -> Self {
        self.recreate = recreate;
        self
    }

    /// Echo traversed directories and hashed locations.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Set the report order.
    #[must_use]
    pub fn with_order(mut self, order: GroupOrder) -> Self {
        self.order = order;
        self
    }

    /// Set the hashing read buffer size.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Set the number of I/O threads.
    #[must_use]
    pub fn with_io_threads(mut self, threads: usize) -> Self {
        self.io_threads = threads.max(1);
        self
    }

    /// Set the number of files hashed per committed batch.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set the shutdown flag.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Leave `path` out of the walk.
    #[must_use]
    pub fn with_excluded_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.excluded_paths.push(path.into());
        self
    }

    /// Check if shutdown has been requested.
    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// Where a [`DuplicatePipeline`] is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Store holds no records yet.
    Empty,
    /// Records are stored; some size collisions may lack a digest.
    Populated,
    /// Every size collision that could be read has a digest.
    Hashed,
    /// The duplicate query has run.
    Reported,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Empty => "empty",
            Self::Populated => "populated",
            Self::Hashed => "hashed",
            Self::Reported => "reported",
        };
        f.write_str(name)
    }
}

/// Summary statistics from a duplicate scan.
#[derive(Debug, Clone, Default)]
pub struct ScanSummary {
    /// Records in the store at the end of the run
    pub files_in_store: u64,
    /// Records inserted by this run's traversal (0 when the store was reused)
    pub files_inserted: usize,
    /// Files left out of the store because their path is not valid UTF-8
    pub skipped_files: usize,
    /// Total size of all stored files in bytes
    pub total_size: u64,
    /// Size-colliding files that still needed a digest
    pub size_collisions: usize,
    /// Files hashed successfully by this run
    pub hashed_files: usize,
    /// Files that could not be hashed
    pub failed_files: usize,
    /// Number of confirmed duplicate groups
    pub duplicate_groups: usize,
    /// Total number of duplicate files (excluding one original per group)
    pub duplicate_files: usize,
    /// Total space that can be reclaimed by removing duplicates
    pub reclaimable_space: u64,
    /// Whether an existing store was used without rescanning
    pub store_reused: bool,
    /// Duration of the entire scan
    pub scan_duration: Duration,
    /// Hash failures, each naming its file
    pub errors: Vec<HashError>,
}

impl ScanSummary {
    /// Whether some files could not be hashed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failed_files > 0
    }

    /// Format reclaimable space as human-readable string.
    #[must_use]
    pub fn reclaimable_display(&self) -> String {
        ByteSize::b(self.reclaimable_space).to_string()
    }

    /// Format total size as human-readable string.
    #[must_use]
    pub fn total_size_display(&self) -> String {
        ByteSize::b(self.total_size).to_string()
    }
}

/// Result of a completed pipeline run.
#[derive(Debug, Clone)]
pub struct ScanReport {
    /// Duplicate records in report order
    pub records: Vec<FileRecord>,
    /// The same records folded into groups
    pub groups: Vec<DuplicateGroup>,
    /// Run statistics
    pub summary: ScanSummary,
}

/// Errors that can occur during duplicate finding.
#[derive(thiserror::Error, Debug)]
pub enum FinderError {
    /// The scan was interrupted by user (Ctrl+C or shutdown signal).
    #[error("Scan interrupted by user")]
    Interrupted,

    /// The provided path does not exist.
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// The provided path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// A pipeline step was called out of order.
    #[error("Cannot {step} a pipeline in state {state}")]
    InvalidState {
        /// The step that was attempted
        step: &'static str,
        /// The state the pipeline was in
        state: PipelineState,
    },

    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A scanned file could not be turned into a record.
    #[error(transparent)]
    Record(#[from] RecordError),

    /// The hashing thread pool could not be built.
    #[error("Failed to build hashing thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

fn validate_root(root: &Path) -> Result<(), FinderError> {
    if !root.exists() {
        return Err(FinderError::PathNotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(FinderError::NotADirectory(root.to_path_buf()));
    }
    Ok(())
}

/// One run of the populate/hash/report sequence against a store.
pub struct DuplicatePipeline<'a> {
    store: &'a mut FileStore,
    root: PathBuf,
    config: &'a FinderConfig,
    hasher: Hasher,
    state: PipelineState,
    summary: ScanSummary,
}

impl<'a> DuplicatePipeline<'a> {
    /// Start a pipeline over `store`.
    ///
    /// A reused store starts at [`PipelineState::Populated`], so traversal
    /// is skipped and only missing digests are computed.
    #[must_use]
    pub fn new(
        store: &'a mut FileStore,
        root: &Path,
        config: &'a FinderConfig,
        store_state: StoreState,
    ) -> Self {
        let mut hasher = Hasher::new().with_chunk_size(config.chunk_size);
        if let Some(ref flag) = config.shutdown_flag {
            hasher = hasher.with_shutdown_flag(flag.clone());
        }

        let reused = store_state == StoreState::Reused;
        if reused {
            let location = store
                .path()
                .map_or_else(|| "in-memory store".to_string(), |p| p.display().to_string());
            if config.verbose {
                log::info!("Using existing {location}; pass --recreate to rescan");
            } else {
                log::debug!("Reusing populated store {location}");
            }
        }

        Self {
            store,
            root: root.to_path_buf(),
            config,
            hasher,
            state: if reused {
                PipelineState::Populated
            } else {
                PipelineState::Empty
            },
            summary: ScanSummary {
                store_reused: reused,
                ..ScanSummary::default()
            },
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Statistics gathered so far.
    #[must_use]
    pub fn summary(&self) -> &ScanSummary {
        &self.summary
    }

    fn expect_state(&self, step: &'static str, expected: PipelineState) -> Result<(), FinderError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(FinderError::InvalidState {
                step,
                state: self.state,
            })
        }
    }

    /// Walk the root and insert every regular file in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`FinderError::Interrupted`] if shutdown was requested during
    /// the walk, in which case nothing is inserted.
    pub fn populate(&mut self) -> Result<usize, FinderError> {
        self.expect_state("populate", PipelineState::Empty)?;

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_start(Phase::Walking, 0);
            callback.on_message(&format!("Walking {}", self.root.display()));
        }

        let mut walker = Walker::new(&self.root)
            .with_verbose(self.config.verbose)
            .with_excluded(&self.config.excluded_paths);
        if let Some(ref flag) = self.config.shutdown_flag {
            walker = walker.with_shutdown_flag(flag.clone());
        }

        let mut records = Vec::new();
        for entry in walker.walk() {
            let record = match FileRecord::from_entry(&self.root, &entry) {
                Ok(record) => record,
                Err(RecordError::NonUtf8Location { path }) => {
                    log::warn!("Skipping {}: name is not valid UTF-8", path.display());
                    self.summary.skipped_files += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if let Some(ref callback) = self.config.progress_callback {
                callback.on_progress(records.len() + 1, record.location());
            }
            records.push(record);
        }

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_end(Phase::Walking);
        }

        if self.config.is_shutdown_requested() {
            log::info!("Walk interrupted; store left unpopulated");
            return Err(FinderError::Interrupted);
        }

        let inserted = self.store.bulk_insert(&records)?;
        log::info!("Stored {} files from {}", inserted, self.root.display());

        self.summary.files_inserted = inserted;
        self.state = PipelineState::Populated;
        Ok(inserted)
    }

    /// Hash every size-colliding file that has no digest yet.
    ///
    /// Files are taken in ascending location order in batches; each batch
    /// is hashed on the I/O pool and committed before the next starts.
    /// Unreadable files keep a null digest and are recorded in the summary.
    ///
    /// # Errors
    ///
    /// Returns [`FinderError::Interrupted`] on shutdown, after committing
    /// every digest already computed.
    pub fn hash_candidates(&mut self) -> Result<usize, FinderError> {
        self.expect_state("hash", PipelineState::Populated)?;

        let candidates = self.store.select_unhashed_size_collisions()?;
        self.summary.size_collisions = candidates.len();

        if candidates.is_empty() {
            log::debug!("No size collisions left to hash");
            self.state = PipelineState::Hashed;
            return Ok(0);
        }

        log::info!("Hashing {} size-colliding files", candidates.len());

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.io_threads.max(1))
            .build()?;

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_start(Phase::Hashing, candidates.len());
        }

        let processed = AtomicUsize::new(0);
        let mut hashed = 0;
        let mut interrupted = false;

        for batch in candidates.chunks(self.config.batch_size.max(1)) {
            if self.config.is_shutdown_requested() {
                interrupted = true;
                break;
            }

            let results: Vec<(&String, Result<Digest, HashError>)> = pool.install(|| {
                batch
                    .par_iter()
                    .map(|location| {
                        let result = self.hasher.hash_file(&self.root.join(location));
                        if let Some(ref callback) = self.config.progress_callback {
                            let current = processed.fetch_add(1, Ordering::SeqCst) + 1;
                            callback.on_progress(current, location);
                        }
                        (location, result)
                    })
                    .collect()
            });

            let mut digests = Vec::with_capacity(results.len());
            for (location, result) in results {
                match result {
                    Ok(digest) => {
                        if self.config.verbose {
                            log::info!("{location}");
                        } else {
                            log::trace!("Hashed {location}: {digest}");
                        }
                        digests.push((location.clone(), digest));
                    }
                    Err(HashError::Interrupted(_)) => interrupted = true,
                    Err(e) => {
                        log::warn!("Failed to hash {location}: {e}");
                        self.summary.failed_files += 1;
                        self.summary.errors.push(e);
                    }
                }
            }

            hashed += self.store.update_hashes(&digests)?;
            if interrupted {
                break;
            }
        }

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_end(Phase::Hashing);
        }

        self.summary.hashed_files += hashed;
        if interrupted {
            log::info!("Hashing interrupted after {hashed} files; progress saved");
            return Err(FinderError::Interrupted);
        }

        log::debug!(
            "Hashed {} files, {} failed",
            hashed,
            self.summary.failed_files
        );
        self.state = PipelineState::Hashed;
        Ok(hashed)
    }

    /// Query duplicate records in the configured order.
    ///
    /// # Errors
    ///
    /// Returns [`FinderError::Store`] if the query fails.
    pub fn report(&mut self) -> Result<Vec<FileRecord>, FinderError> {
        self.expect_state("report", PipelineState::Hashed)?;

        let records = self.store.select_duplicate_groups(self.config.order)?;
        self.state = PipelineState::Reported;
        Ok(records)
    }

    /// Run every remaining step and return the report.
    ///
    /// # Errors
    ///
    /// Returns the first error of any step.
    pub fn run(mut self) -> Result<ScanReport, FinderError> {
        let start_time = Instant::now();

        if self.state == PipelineState::Empty {
            self.populate()?;
        }
        self.hash_candidates()?;
        let records = self.report()?;
        let groups = collect_groups(&records);

        let mut summary = self.summary;
        summary.files_in_store = self.store.count()?;
        summary.total_size = self.store.total_size()?;
        summary.duplicate_groups = groups.len();
        summary.duplicate_files = groups.iter().map(DuplicateGroup::duplicate_count).sum();
        summary.reclaimable_space = reclaimable_space(&groups);
        summary.scan_duration = start_time.elapsed();

        log::info!(
            "Scan complete: {} groups, {} duplicates, {} reclaimable",
            summary.duplicate_groups,
            summary.duplicate_files,
            summary.reclaimable_display()
        );

        Ok(ScanReport {
            records,
            groups,
            summary,
        })
    }
}

/// Duplicate finder that opens the store and drives a [`DuplicatePipeline`].
#[derive(Debug)]
pub struct DuplicateFinder {
    config: FinderConfig,
}

impl DuplicateFinder {
    /// Create a new duplicate finder with the given configuration.
    #[must_use]
    pub fn new(config: FinderConfig) -> Self {
        Self { config }
    }

    /// Create a new duplicate finder with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(FinderConfig::default())
    }

    /// The finder's configuration.
    #[must_use]
    pub fn config(&self) -> &FinderConfig {
        &self.config
    }

    /// Find duplicates below `root`, keeping metadata in the store at
    /// `db_path`.
    ///
    /// The root is checked before the store is touched, so a bad root never
    /// creates a database file. The store's own files are left out of the
    /// walk when they lie below `root`.
    ///
    /// # Errors
    ///
    /// Returns `FinderError` if:
    /// - The path does not exist or is not a directory
    /// - The store cannot be opened, written or closed
    /// - The scan is interrupted by shutdown signal
    pub fn find_duplicates(&self, root: &Path, db_path: &Path) -> Result<ScanReport, FinderError> {
        validate_root(root)?;
        if self.config.is_shutdown_requested() {
            return Err(FinderError::Interrupted);
        }

        log::info!("Starting duplicate scan of {}", root.display());

        let config = store_file_paths(db_path)
            .into_iter()
            .fold(self.config.clone(), |config, path| config.with_excluded_path(path));

        let (mut store, state) = FileStore::rebuild_or_reuse(db_path, config.recreate)?;
        let report = DuplicatePipeline::new(&mut store, root, &config, state).run()?;
        store.close()?;
        Ok(report)
    }

    /// Run the pipeline against an already opened store.
    ///
    /// # Errors
    ///
    /// See [`DuplicateFinder::find_duplicates`].
    pub fn find_duplicates_in_store(
        &self,
        root: &Path,
        store: &mut FileStore,
        state: StoreState,
    ) -> Result<ScanReport, FinderError> {
        validate_root(root)?;
        DuplicatePipeline::new(store, root, &self.config, state).run()
    }
}
