//! Streaming MD5 file hasher.
//!
//! Files are read in fixed-size chunks and fed through an incremental
//! [`md5::Context`], so memory use is bounded by the chunk size no matter
//! how large the file is.

use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::HashError;

/// Default read buffer size (32 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 32 * 1024;

/// Length of a hex-encoded 128-bit digest.
pub const DIGEST_HEX_LEN: usize = 32;

/// A content digest: exactly 32 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest(String);

impl Digest {
    /// Parse a hex digest, accepting only 32 lowercase hex characters.
    ///
    /// # Example
    ///
    /// ```
    /// use dupreport::scanner::Digest;
    ///
    /// assert!(Digest::parse("5d41402abc4b2a76b9719d911017c592").is_some());
    /// assert!(Digest::parse("not-a-digest").is_none());
    /// ```
    #[must_use]
    pub fn parse(hex: &str) -> Option<Self> {
        if is_valid_hex_digest(hex) {
            Some(Self(hex.to_string()))
        } else {
            None
        }
    }

    /// Digest of an in-memory byte slice.
    #[must_use]
    pub fn of_bytes(data: &[u8]) -> Self {
        Self(format!("{:x}", md5::compute(data)))
    }

    /// The hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Check that `s` is a 32-character lowercase hex string.
#[must_use]
pub fn is_valid_hex_digest(s: &str) -> bool {
    s.len() == DIGEST_HEX_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Chunked file hasher.
///
/// A `Hasher` is cheap to share across rayon workers: it holds only the
/// chunk size and an optional shutdown flag.
#[derive(Debug, Clone)]
pub struct Hasher {
    chunk_size: usize,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher {
    /// Create a hasher with the default 32 KiB chunk size.
    #[must_use]
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            shutdown_flag: None,
        }
    }

    /// Set the read chunk size (clamped to at least one byte).
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Set the shutdown flag; hashing stops between chunks once it is raised.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Configured chunk size in bytes.
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Stream the file at `path` and return its digest.
    ///
    /// # Errors
    ///
    /// Returns a [`HashError`] naming `path` if the file cannot be opened or
    /// a read fails part-way, or [`HashError::Interrupted`] on shutdown.
    pub fn hash_file(&self, path: &Path) -> Result<Digest, HashError> {
        let mut file = File::open(path).map_err(|e| HashError::from_io(path, e))?;
        let mut context = md5::Context::new();
        let mut buffer = vec![0u8; self.chunk_size];

        loop {
            if self.is_shutdown_requested() {
                return Err(HashError::Interrupted(path.to_path_buf()));
            }
            let n = match file.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(HashError::from_io(path, e)),
            };
            context.consume(&buffer[..n]);
        }

        Ok(Digest(format!("{:x}", context.compute())))
    }
}
