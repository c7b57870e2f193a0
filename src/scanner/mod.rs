//! Scanner module for directory traversal and file hashing.
//!
//! This module provides functionality for:
//! - Deterministic, iterative directory walking using walkdir
//! - Streaming MD5 content digests
//! - Root-relative, forward-slash location strings
//!
//! # Architecture
//!
//! The scanner is divided into submodules:
//! - [`walker`]: Directory traversal and file discovery
//! - [`hasher`]: Chunked MD5 file hashing (streaming)
//! - [`path_utils`]: Location, name and extension derivation
//!
//! # Example
//!
//! ```no_run
//! use dupreport::scanner::Walker;
//! use std::path::Path;
//!
//! let walker = Walker::new(Path::new("."));
//! for file in walker.walk() {
//!     println!("{}: {} bytes", file.path.display(), file.size);
//! }
//! ```

pub mod hasher;
pub mod path_utils;
pub mod walker;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

// Re-export main types
pub use hasher::{Digest, Hasher, DEFAULT_CHUNK_SIZE, DIGEST_HEX_LEN};
pub use walker::Walker;

/// Metadata for a discovered regular file.
///
/// This is what the walker yields; the store turns it into a
/// [`FileRecord`](crate::store::FileRecord) keyed by its root-relative location.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Path to the file (the scan root joined with the relative path)
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modification time
    pub modified: SystemTime,
}

impl FileEntry {
    /// Create a new FileEntry.
    #[must_use]
    pub fn new(path: PathBuf, size: u64, modified: SystemTime) -> Self {
        Self {
            path,
            size,
            modified,
        }
    }
}

/// Errors that can occur while hashing one file.
///
/// Every variant carries the path that failed so a failure is always
/// attributable to a single location.
#[derive(thiserror::Error, Debug, Clone)]
pub enum HashError {
    /// The file disappeared between traversal and hashing.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Hashing was abandoned because shutdown was requested.
    #[error("Hashing interrupted: {0}")]
    Interrupted(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: Arc<std::io::Error>,
    },
}

impl HashError {
    /// Classify an I/O error raised while reading `path`.
    #[must_use]
    pub fn from_io(path: &std::path::Path, error: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match error.kind() {
            ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: Arc::new(error),
            },
        }
    }

    /// The path this error is attributed to.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::NotFound(path) | Self::PermissionDenied(path) | Self::Interrupted(path) => path,
            Self::Io { path, .. } => path,
        }
    }
}
