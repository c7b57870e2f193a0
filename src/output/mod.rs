//! Report writers for duplicate scan results.
//!
//! The report is a CSV file with one row per duplicate file, in the order
//! returned by the store's duplicate query.

pub mod csv;

pub use self::csv::{CsvDialect, CsvOutput, CsvOutputError, ReportEncoding, DEFAULT_OUTPUT_FILE};
