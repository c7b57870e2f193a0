//! SQLite-backed file metadata store.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};

use super::record::{FileRecord, RecordError};
use crate::scanner::Digest;

/// Default database file name, created in the working directory.
pub const DEFAULT_DB_FILE: &str = "duplicates.sqlite3";

/// Column names of the `file` table, in report order.
pub const COLUMNS: [&str; 6] = ["location", "md5sum", "size", "modified_at", "name", "ext"];

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS file (
    location    TEXT PRIMARY KEY NOT NULL CHECK (location <> ''),
    md5sum      TEXT CHECK (md5sum IS NULL OR (length(md5sum) = 32 AND md5sum NOT GLOB '*[^0-9a-f]*')),
    size        INTEGER NOT NULL CHECK (size >= 0),
    modified_at TEXT NOT NULL,
    name        TEXT NOT NULL CHECK (name <> '' AND substr(location, -length(name)) = name),
    ext         TEXT NOT NULL CHECK (ext = '' OR substr(location, -length(ext)) = ext)
);
CREATE INDEX IF NOT EXISTS idx_file_size ON file(size);
CREATE INDEX IF NOT EXISTS idx_file_md5sum ON file(md5sum);
";

const SELECT_RECORD: &str = "SELECT location, md5sum, size, modified_at, name, ext FROM file";

/// Files sharing a size with at least one other file.
const SIZE_COLLISIONS: &str = "
SELECT location FROM file
WHERE size IN (SELECT size FROM file GROUP BY size HAVING COUNT(*) > 1)";

/// Errors that can occur during store operations.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// SQLite reported an error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A store file could not be removed.
    #[error("Failed to remove {path}: {source}")]
    Io {
        /// The file that could not be removed
        path: PathBuf,
        /// The underlying error
        #[source]
        source: io::Error,
    },

    /// A record violated the data invariants and was not persisted.
    #[error("Integrity violation: {0}")]
    Integrity(#[from] RecordError),

    /// A hash update named a location that is not in the store.
    #[error("No record for location {0}")]
    UnknownLocation(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// How [`FileStore::rebuild_or_reuse`] found the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    /// Empty store; needs a traversal.
    Fresh,
    /// Populated store from an earlier run, used as-is.
    Reused,
}

/// Row order for [`FileStore::select_duplicate_groups`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GroupOrder {
    /// By digest, then location; members of a group are contiguous.
    #[default]
    HashThenLocation,
    /// By location only.
    Location,
}

impl GroupOrder {
    fn order_by(self) -> &'static str {
        match self {
            Self::HashThenLocation => "f.md5sum, f.location",
            Self::Location => "f.location",
        }
    }
}

type RawRow = (String, Option<String>, i64, String, String, String);

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn into_record(raw: RawRow) -> Result<FileRecord, RecordError> {
    let (location, md5sum, size, modified_at, name, ext) = raw;
    FileRecord::from_columns(location, md5sum, size, &modified_at, name, ext)
}

fn size_param(record: &FileRecord) -> Result<i64, RecordError> {
    i64::try_from(record.size()).map_err(|_| RecordError::SizeOutOfRange {
        location: record.location().to_string(),
        size: i128::from(record.size()),
    })
}

/// Persistent table of file records keyed by location.
///
/// One handle owns one connection and is scoped to a single run. Concurrent
/// writers are not supported.
pub struct FileStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore").field("path", &self.path).finish()
    }
}

impl FileStore {
    /// Open (or create) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] if the file cannot be opened or is not
    /// a SQLite database.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        store.initialize()?;
        log::debug!("Opened store at {}", path.display());
        Ok(store)
    }

    /// Open a private in-memory store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] if SQLite cannot allocate the database.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn, path: None };
        store.initialize()?;
        Ok(store)
    }

    /// Open the store at `path`, starting over when `recreate` is set.
    ///
    /// An existing populated store is returned as [`StoreState::Reused`]
    /// without checking it against the filesystem. With `recreate` the
    /// database file and its journal siblings are removed first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if an old file cannot be removed, or
    /// [`StoreError::Sqlite`] if the store cannot be opened.
    pub fn rebuild_or_reuse(path: &Path, recreate: bool) -> StoreResult<(Self, StoreState)> {
        if recreate {
            remove_store_files(path)?;
        }

        let store = Self::open(path)?;
        let existing = store.count()?;
        if existing > 0 {
            log::debug!(
                "Store {} already holds {} records",
                path.display(),
                existing
            );
            Ok((store, StoreState::Reused))
        } else {
            Ok((store, StoreState::Fresh))
        }
    }

    fn initialize(&self) -> StoreResult<()> {
        self.conn.busy_timeout(Duration::from_secs(5))?;
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Path of the database file, `None` for in-memory stores.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Insert all records in one transaction.
    ///
    /// Every record is validated before anything is written; any failure
    /// leaves the store unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Integrity`] for an invalid record, or
    /// [`StoreError::Sqlite`] if SQLite rejects a row (e.g. a duplicate
    /// location).
    pub fn bulk_insert(&mut self, records: &[FileRecord]) -> StoreResult<usize> {
        for record in records {
            record.validate()?;
        }

        let tx = self.conn.transaction()?;
        let mut count = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO file (location, md5sum, size, modified_at, name, ext) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for record in records {
                count += stmt.execute(params![
                    record.location(),
                    record.content_hash().map(Digest::as_str),
                    size_param(record)?,
                    record.modified_at_text(),
                    record.name(),
                    record.ext(),
                ])?;
            }
        }
        tx.commit()?;

        log::debug!("Inserted {count} records");
        Ok(count)
    }

    /// Locations whose size is shared by at least one other record,
    /// ascending.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] on query failure.
    pub fn select_size_collisions(&self) -> StoreResult<Vec<String>> {
        self.select_locations(&format!("{SIZE_COLLISIONS} ORDER BY location"))
    }

    /// Like [`Self::select_size_collisions`], restricted to records that
    /// have no digest yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] on query failure.
    pub fn select_unhashed_size_collisions(&self) -> StoreResult<Vec<String>> {
        self.select_locations(&format!(
            "{SIZE_COLLISIONS} AND md5sum IS NULL ORDER BY location"
        ))
    }

    fn select_locations(&self, sql: &str) -> StoreResult<Vec<String>> {
        let mut stmt = self.conn.prepare(sql)?;
        let locations = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(locations)
    }

    /// Set the digest of one record. Writing the same digest again is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownLocation`] if no record has `location`.
    pub fn update_hash(&self, location: &str, digest: &Digest) -> StoreResult<()> {
        let changed = self.conn.execute(
            "UPDATE file SET md5sum = ?1 WHERE location = ?2",
            params![digest.as_str(), location],
        )?;
        if changed == 0 {
            return Err(StoreError::UnknownLocation(location.to_string()));
        }
        Ok(())
    }

    /// Write a batch of digests in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownLocation`] if any location is missing, in
    /// which case none of the batch is written.
    pub fn update_hashes(&mut self, batch: &[(String, Digest)]) -> StoreResult<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached("UPDATE file SET md5sum = ?1 WHERE location = ?2")?;
            for (location, digest) in batch {
                if stmt.execute(params![digest.as_str(), location])? == 0 {
                    return Err(StoreError::UnknownLocation(location.clone()));
                }
            }
        }
        tx.commit()?;
        Ok(batch.len())
    }

    /// Records whose digest and size are shared with at least one other
    /// record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] on query failure, or
    /// [`StoreError::Integrity`] if a stored row is malformed.
    pub fn select_duplicate_groups(&self, order: GroupOrder) -> StoreResult<Vec<FileRecord>> {
        let sql = format!(
            "SELECT f.location, f.md5sum, f.size, f.modified_at, f.name, f.ext \
             FROM file f \
             JOIN (SELECT md5sum, size FROM file \
                   WHERE md5sum IS NOT NULL \
                   GROUP BY md5sum, size HAVING COUNT(*) > 1) d \
               ON f.md5sum = d.md5sum AND f.size = d.size \
             ORDER BY {}",
            order.order_by()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], read_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let records = rows
            .into_iter()
            .map(into_record)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Look up one record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] on query failure.
    pub fn get(&self, location: &str) -> StoreResult<Option<FileRecord>> {
        let raw = self
            .conn
            .query_row(
                &format!("{SELECT_RECORD} WHERE location = ?1"),
                params![location],
                read_row,
            )
            .optional()?;
        match raw {
            Some(raw) => Ok(Some(into_record(raw)?)),
            None => Ok(None),
        }
    }

    /// Number of records.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] on query failure.
    pub fn count(&self) -> StoreResult<u64> {
        self.count_where("1 = 1")
    }

    /// Number of records that have a digest.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] on query failure.
    pub fn count_hashed(&self) -> StoreResult<u64> {
        self.count_where("md5sum IS NOT NULL")
    }

    fn count_where(&self, condition: &str) -> StoreResult<u64> {
        let n: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM file WHERE {condition}"),
            [],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(n).unwrap_or(0))
    }

    /// Sum of all record sizes in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] on query failure.
    pub fn total_size(&self) -> StoreResult<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COALESCE(SUM(size), 0) FROM file", [], |row| {
                row.get(0)
            })?;
        Ok(u64::try_from(n).unwrap_or(0))
    }

    /// Close the connection, reporting any error SQLite raises on close.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] if the connection cannot be closed.
    pub fn close(self) -> StoreResult<()> {
        self.conn.close().map_err(|(_, e)| StoreError::Sqlite(e))
    }
}

/// The database file at `path` and the journal files SQLite may create
/// next to it.
#[must_use]
pub fn store_file_paths(path: &Path) -> Vec<PathBuf> {
    let mut paths = vec![path.to_path_buf()];
    for suffix in ["-wal", "-shm", "-journal"] {
        let mut name = path.as_os_str().to_owned();
        name.push(suffix);
        paths.push(PathBuf::from(name));
    }
    paths
}

/// Remove the database file and any journal files next to it.
fn remove_store_files(path: &Path) -> StoreResult<()> {
    for target in store_file_paths(path) {
        match fs::remove_file(&target) {
            Ok(()) => log::debug!("Removed {}", target.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(StoreError::Io { path: target, source }),
        }
    }
    Ok(())
}
