//! File record definitions.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SubsecRound, Utc};

use crate::scanner::path_utils::{extension_of, file_name_of, relative_location};
use crate::scanner::{Digest, FileEntry};

/// Timestamp layout used in the store and the report.
///
/// Fixed-width with microseconds, so text order equals time order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Violations of the record invariants.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// The location was empty.
    #[error("Record location is empty")]
    EmptyLocation,

    /// The scanned path does not lie below the scan root.
    #[error("Path {path} is not below scan root {root}")]
    OutsideRoot {
        /// The scan root
        root: PathBuf,
        /// The offending path
        path: PathBuf,
    },

    /// The path below the scan root is not valid UTF-8.
    #[error("Path {path} is not valid UTF-8")]
    NonUtf8Location {
        /// The offending path
        path: PathBuf,
    },

    /// The name was empty.
    #[error("Record {location} has an empty name")]
    EmptyName {
        /// Location of the record
        location: String,
    },

    /// The name is not a suffix of the location.
    #[error("Name '{name}' is not a suffix of location {location}")]
    NameNotSuffix {
        /// Location of the record
        location: String,
        /// The offending name
        name: String,
    },

    /// The extension is neither empty nor a suffix of the location.
    #[error("Extension '{ext}' is not a suffix of location {location}")]
    ExtNotSuffix {
        /// Location of the record
        location: String,
        /// The offending extension
        ext: String,
    },

    /// The size does not fit the store's signed 64-bit column.
    #[error("Size {size} of {location} is out of range")]
    SizeOutOfRange {
        /// Location of the record
        location: String,
        /// The offending size
        size: i128,
    },

    /// A stored digest is not 32 lowercase hex characters.
    #[error("Invalid digest '{digest}' for {location}")]
    InvalidDigest {
        /// Location of the record
        location: String,
        /// The offending digest
        digest: String,
    },

    /// A stored timestamp could not be parsed.
    #[error("Invalid timestamp '{value}' for {location}")]
    InvalidTimestamp {
        /// Location of the record
        location: String,
        /// The offending value
        value: String,
    },
}

/// One regular file observed during a scan.
///
/// Fields are private so every value in circulation has passed
/// [`FileRecord::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    location: String,
    content_hash: Option<Digest>,
    size: u64,
    modified_at: DateTime<Utc>,
    name: String,
    ext: String,
}

impl FileRecord {
    /// Create a record for `location`, deriving name and extension from it.
    ///
    /// The timestamp is truncated to microseconds, the precision kept by
    /// the store.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError`] if the location is empty, ends in `/`, or the
    /// size cannot be stored.
    pub fn new(
        location: impl Into<String>,
        size: u64,
        modified_at: DateTime<Utc>,
    ) -> Result<Self, RecordError> {
        let location = location.into();
        let name = file_name_of(&location).to_string();
        let ext = extension_of(&name).to_string();
        let record = Self {
            location,
            content_hash: None,
            size,
            modified_at: modified_at.trunc_subsecs(6),
            name,
            ext,
        };
        record.validate()?;
        Ok(record)
    }

    /// Build a record from a walker entry below `root`.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::OutsideRoot`] if the entry is not below `root`,
    /// or [`RecordError::NonUtf8Location`] if its path below `root` is not
    /// valid UTF-8.
    pub fn from_entry(root: &Path, entry: &FileEntry) -> Result<Self, RecordError> {
        if entry.path.strip_prefix(root).is_err() {
            return Err(RecordError::OutsideRoot {
                root: root.to_path_buf(),
                path: entry.path.clone(),
            });
        }
        let location = relative_location(root, &entry.path).ok_or_else(|| {
            RecordError::NonUtf8Location {
                path: entry.path.clone(),
            }
        })?;
        Self::new(location, entry.size, DateTime::<Utc>::from(entry.modified))
    }

    /// Rebuild a record from stored column values, re-checking every invariant.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError`] for any value that violates the invariants.
    pub fn from_columns(
        location: String,
        md5sum: Option<String>,
        size: i64,
        modified_at: &str,
        name: String,
        ext: String,
    ) -> Result<Self, RecordError> {
        let content_hash = match md5sum {
            Some(hex) => Some(Digest::parse(&hex).ok_or_else(|| RecordError::InvalidDigest {
                location: location.clone(),
                digest: hex,
            })?),
            None => None,
        };
        let size = u64::try_from(size).map_err(|_| RecordError::SizeOutOfRange {
            location: location.clone(),
            size: i128::from(size),
        })?;
        let modified_at = parse_timestamp(modified_at).ok_or_else(|| {
            RecordError::InvalidTimestamp {
                location: location.clone(),
                value: modified_at.to_string(),
            }
        })?;

        let record = Self {
            location,
            content_hash,
            size,
            modified_at,
            name,
            ext,
        };
        record.validate()?;
        Ok(record)
    }

    /// Attach a digest.
    #[must_use]
    pub fn with_content_hash(mut self, digest: Digest) -> Self {
        self.content_hash = Some(digest);
        self
    }

    /// Check every invariant of the record.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.location.is_empty() {
            return Err(RecordError::EmptyLocation);
        }
        if self.name.is_empty() {
            return Err(RecordError::EmptyName {
                location: self.location.clone(),
            });
        }
        if !self.location.ends_with(&self.name) {
            return Err(RecordError::NameNotSuffix {
                location: self.location.clone(),
                name: self.name.clone(),
            });
        }
        if !self.ext.is_empty() && !self.location.ends_with(&self.ext) {
            return Err(RecordError::ExtNotSuffix {
                location: self.location.clone(),
                ext: self.ext.clone(),
            });
        }
        if i64::try_from(self.size).is_err() {
            return Err(RecordError::SizeOutOfRange {
                location: self.location.clone(),
                size: i128::from(self.size),
            });
        }
        Ok(())
    }

    /// Root-relative, forward-slash path; the primary key.
    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Content digest, if it has been computed.
    #[must_use]
    pub fn content_hash(&self) -> Option<&Digest> {
        self.content_hash.as_ref()
    }

    /// Size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Last modification time in UTC.
    #[must_use]
    pub fn modified_at(&self) -> DateTime<Utc> {
        self.modified_at
    }

    /// Modification time in the stored text layout.
    #[must_use]
    pub fn modified_at_text(&self) -> String {
        format_timestamp(self.modified_at)
    }

    /// Base file name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Extension without the leading dot, possibly empty.
    #[must_use]
    pub fn ext(&self) -> &str {
        &self.ext
    }
}

/// Format a timestamp with [`TIMESTAMP_FORMAT`].
#[must_use]
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored RFC 3339 timestamp into UTC.
#[must_use]
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}
