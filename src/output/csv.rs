//! CSV report writer.
//!
//! Writes one header row, then one row per duplicate record in the order
//! given. The default dialect matches what spreadsheet applications expect:
//! comma separated, quoted only when needed, CRLF line endings.
//!
//! # Columns
//!
//! - `location`: Path relative to the scan root
//! - `md5sum`: Content digest (hexadecimal), empty if absent
//! - `size`: File size in bytes
//! - `modified_at`: Last modified time (RFC 3339, UTC, microseconds)
//! - `name`: Base file name
//! - `ext`: Extension without the dot
//!
//! # Example
//!
//! ```no_run
//! use dupreport::duplicates::DuplicateFinder;
//! use dupreport::output::csv::CsvOutput;
//! use dupreport::store::COLUMNS;
//! use std::path::Path;
//!
//! let finder = DuplicateFinder::with_defaults();
//! let report = finder
//!     .find_duplicates(Path::new("."), Path::new("duplicates.sqlite3"))
//!     .unwrap();
//!
//! let output = CsvOutput::new(&report.records, &COLUMNS).unwrap();
//! output.write_to(std::io::stdout()).unwrap();
//! ```

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use csv::{QuoteStyle, Terminator, WriterBuilder};
use thiserror::Error;

use crate::store::FileRecord;

/// Default report file name.
pub const DEFAULT_OUTPUT_FILE: &str = "duplicates.csv";

/// Errors that can occur during CSV output generation.
#[derive(Debug, Error)]
pub enum CsvOutputError {
    /// I/O error during writing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The report file could not be created.
    #[error("Failed to create {path}: {source}")]
    Create {
        /// The report path
        path: PathBuf,
        /// The underlying error
        #[source]
        source: io::Error,
    },

    /// Error during CSV serialization.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A requested column does not exist on a record.
    #[error("Unknown column: {0}")]
    UnknownColumn(String),
}

/// Text encoding of the report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportEncoding {
    /// Plain UTF-8.
    #[default]
    Utf8,
    /// UTF-8 with a leading byte order mark.
    Utf8Bom,
}

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Delimiter, quoting, line ending and encoding of the report.
#[derive(Debug, Clone, Copy)]
pub struct CsvDialect {
    /// Field separator
    pub delimiter: u8,
    /// When fields are quoted
    pub quote_style: QuoteStyle,
    /// Record terminator
    pub terminator: Terminator,
    /// Text encoding
    pub encoding: ReportEncoding,
}

impl Default for CsvDialect {
    fn default() -> Self {
        Self::excel()
    }
}

impl CsvDialect {
    /// Comma separated, minimal quoting, CRLF, UTF-8.
    #[must_use]
    pub fn excel() -> Self {
        Self {
            delimiter: b',',
            quote_style: QuoteStyle::Necessary,
            terminator: Terminator::CRLF,
            encoding: ReportEncoding::Utf8,
        }
    }

    /// Set the delimiter.
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Set the quoting style.
    #[must_use]
    pub fn with_quote_style(mut self, quote_style: QuoteStyle) -> Self {
        self.quote_style = quote_style;
        self
    }

    /// Set the encoding.
    #[must_use]
    pub fn with_encoding(mut self, encoding: ReportEncoding) -> Self {
        self.encoding = encoding;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Location,
    Md5sum,
    Size,
    ModifiedAt,
    Name,
    Ext,
}

impl Column {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "location" => Some(Self::Location),
            "md5sum" => Some(Self::Md5sum),
            "size" => Some(Self::Size),
            "modified_at" => Some(Self::ModifiedAt),
            "name" => Some(Self::Name),
            "ext" => Some(Self::Ext),
            _ => None,
        }
    }

    fn value(self, record: &FileRecord) -> String {
        match self {
            Self::Location => record.location().to_string(),
            Self::Md5sum => record
                .content_hash()
                .map(ToString::to_string)
                .unwrap_or_default(),
            Self::Size => record.size().to_string(),
            Self::ModifiedAt => record.modified_at_text(),
            Self::Name => record.name().to_string(),
            Self::Ext => record.ext().to_string(),
        }
    }
}

/// CSV output formatter.
pub struct CsvOutput<'a> {
    records: &'a [FileRecord],
    header: Vec<&'a str>,
    columns: Vec<Column>,
    dialect: CsvDialect,
}

impl<'a> CsvOutput<'a> {
    /// Create a formatter for `records` with the given columns.
    ///
    /// # Errors
    ///
    /// Returns [`CsvOutputError::UnknownColumn`] if a column is not a record
    /// field.
    pub fn new(
        records: &'a [FileRecord],
        columns: &'a [&'a str],
    ) -> Result<Self, CsvOutputError> {
        let parsed = columns
            .iter()
            .map(|name| {
                Column::parse(name)
                    .ok_or_else(|| CsvOutputError::UnknownColumn((*name).to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            records,
            header: columns.to_vec(),
            columns: parsed,
            dialect: CsvDialect::default(),
        })
    }

    /// Use a different dialect.
    #[must_use]
    pub fn with_dialect(mut self, dialect: CsvDialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Write the CSV output to the given writer.
    ///
    /// # Errors
    ///
    /// Returns `CsvOutputError` if writing or serialization fails.
    pub fn write_to<W: io::Write>(&self, mut writer: W) -> Result<(), CsvOutputError> {
        if self.dialect.encoding == ReportEncoding::Utf8Bom {
            writer.write_all(UTF8_BOM)?;
        }

        let mut csv_writer = WriterBuilder::new()
            .delimiter(self.dialect.delimiter)
            .quote_style(self.dialect.quote_style)
            .terminator(self.dialect.terminator)
            .from_writer(writer);

        csv_writer.write_record(&self.header)?;
        for record in self.records {
            csv_writer.write_record(self.columns.iter().map(|c| c.value(record)))?;
        }

        csv_writer.flush()?;
        Ok(())
    }

    /// Generate CSV output as a string.
    ///
    /// # Errors
    ///
    /// Returns `CsvOutputError` if serialization fails.
    pub fn to_string(&self) -> Result<String, CsvOutputError> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }

    /// Write the report to `path`, replacing any existing file.
    ///
    /// # Errors
    ///
    /// Returns [`CsvOutputError::Create`] if the file cannot be created.
    pub fn write_file(&self, path: &Path) -> Result<(), CsvOutputError> {
        let file = File::create(path).map_err(|source| CsvOutputError::Create {
            path: path.to_path_buf(),
            source,
        })?;
        self.write_to(BufWriter::new(file))?;
        log::debug!("Wrote {} rows to {}", self.records.len(), path.display());
        Ok(())
    }
}
