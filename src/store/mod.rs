//! Persistent file metadata store.
//!
//! # Architecture
//!
//! * [`record`]: the [`FileRecord`] type and its invariants.
//! * [`database`]: the SQLite table holding one row per scanned file, and
//!   the size and digest queries the duplicate pipeline runs against it.
//!
//! Invariants are enforced twice: [`FileRecord`] validates on construction,
//! and the `file` table repeats them as `CHECK` constraints.

pub mod database;
pub mod record;

pub use database::{
    store_file_paths, FileStore, GroupOrder, StoreError, StoreResult, StoreState, COLUMNS,
    DEFAULT_DB_FILE,
};
pub use record::{FileRecord, RecordError, TIMESTAMP_FORMAT};
