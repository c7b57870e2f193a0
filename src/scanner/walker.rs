//! Directory walker built on walkdir.
//!
//! # Overview
//!
//! [`Walker`] traverses a directory tree and yields one [`FileEntry`] per
//! regular file. walkdir keeps its own stack of open directories instead of
//! recursing, so tree depth is bounded only by memory, and sorting each
//! listing by file name makes the order identical for an unchanged tree.
//!
//! - Symbolic links are never followed and never yielded.
//! - A directory that cannot be listed is logged and skipped; the rest of
//!   the tree is still walked.
//! - Each call to [`Walker::walk`] re-reads the filesystem.
//! - Files passed to [`Walker::with_excluded`] are never yielded, so the
//!   store and report of a scan rooted above them stay out of it.
//!
//! # Example
//!
//! ```no_run
//! use dupreport::scanner::Walker;
//! use std::path::Path;
//!
//! let walker = Walker::new(Path::new("/home/user/Downloads")).with_verbose(true);
//! let total: u64 = walker.walk().map(|f| f.size).sum();
//! println!("{total} bytes");
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use walkdir::{DirEntry, WalkDir};

use super::path_utils::resolve_path;
use super::FileEntry;

/// Depth-first walker over regular files.
#[derive(Debug)]
pub struct Walker {
    /// Root path to walk
    root: PathBuf,
    /// Log every directory at info level instead of debug
    verbose: bool,
    /// Optional shutdown flag for graceful termination
    shutdown_flag: Option<Arc<AtomicBool>>,
    /// Resolved paths of files never yielded
    excluded: HashSet<PathBuf>,
    /// Resolved root, used to match entries against `excluded`
    resolved_root: Option<PathBuf>,
}

impl Walker {
    /// Create a new walker for the given root.
    #[must_use]
    pub fn new(path: &Path) -> Self {
        Self {
            root: path.to_path_buf(),
            verbose: false,
            shutdown_flag: None,
            excluded: HashSet::new(),
            resolved_root: None,
        }
    }

    /// Echo each directory as it is entered.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Set the shutdown flag for graceful termination.
    ///
    /// When the flag is set to `true`, iteration ends at the next entry.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Never yield the given files.
    ///
    /// Paths may be relative to the working directory and need not exist
    /// yet; they are resolved once, here.
    #[must_use]
    pub fn with_excluded(mut self, paths: &[PathBuf]) -> Self {
        self.excluded = paths.iter().filter_map(|p| resolve_path(p)).collect();
        self.resolved_root = if self.excluded.is_empty() {
            None
        } else {
            fs::canonicalize(&self.root).ok()
        };
        self
    }

    fn is_excluded(&self, path: &Path) -> bool {
        let Some(ref root) = self.resolved_root else {
            return false;
        };
        path.strip_prefix(&self.root)
            .is_ok_and(|relative| self.excluded.contains(&root.join(relative)))
    }

    /// The root this walker starts from.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Walk the tree, yielding regular files.
    ///
    /// Unreadable directories and files whose metadata cannot be read are
    /// skipped, so the iterator never yields an error.
    pub fn walk(&self) -> impl Iterator<Item = FileEntry> + '_ {
        WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .take_while(move |_| {
                let stop = self.is_shutdown_requested();
                if stop {
                    log::debug!("Walker: Shutdown requested, stopping iteration");
                }
                !stop
            })
            .filter_map(move |entry| match entry {
                Ok(entry) => self.process_entry(&entry),
                Err(e) => {
                    let path = e.path().map_or_else(|| self.root.clone(), Path::to_path_buf);
                    log::warn!("Skipping unreadable entry {}: {}", path.display(), e);
                    None
                }
            })
    }

    fn process_entry(&self, entry: &DirEntry) -> Option<FileEntry> {
        let file_type = entry.file_type();

        if file_type.is_dir() {
            if self.verbose {
                log::info!("{}", entry.path().display());
            } else {
                log::debug!("Entering {}", entry.path().display());
            }
            return None;
        }

        if !file_type.is_file() {
            log::trace!("Skipping non-regular file: {}", entry.path().display());
            return None;
        }

        if self.is_excluded(entry.path()) {
            log::debug!("Skipping excluded {}", entry.path().display());
            return None;
        }

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                log::warn!("Skipping {}: {}", entry.path().display(), e);
                return None;
            }
        };

        Some(FileEntry::new(
            entry.path().to_path_buf(),
            metadata.len(),
            metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        ))
    }
}
