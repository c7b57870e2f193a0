//! Command-line interface definitions.
//!
//! Every tuning option is an `Option` so that, when absent, the value from
//! the config file or environment applies instead of a CLI default.
//!
//! # Example
//!
//! ```bash
//! # Scan the current directory into duplicates.sqlite3 / duplicates.csv
//! dupreport
//!
//! # Rescan from scratch, echoing every directory and hashed file
//! dupreport --recreate -v ~/Downloads
//!
//! # Print the report to stdout, ordered by location
//! dupreport ~/Downloads --order-by-location -o -
//! ```

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::output::ReportEncoding;

/// Find duplicate files by size, then MD5 digest, and write a CSV report.
///
/// File metadata is kept in a SQLite database so that an interrupted scan
/// can resume hashing where it stopped.
#[derive(Debug, Parser)]
#[command(name = "dupreport")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v echoes directories and hashed files plus debug logs, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, env = "NO_COLOR")]
    pub no_color: bool,

    /// Directory to scan
    #[arg(value_name = "PATH", default_value = ".")]
    pub path: PathBuf,

    /// SQLite database holding file metadata [default: duplicates.sqlite3]
    #[arg(long, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// CSV report file, `-` for stdout [default: duplicates.csv]
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Delete an existing database and rescan
    ///
    /// Without this flag a populated database is reused as-is, even if the
    /// directory changed since it was built.
    #[arg(long)]
    pub recreate: bool,

    /// Order report rows by location instead of by digest
    #[arg(long)]
    pub order_by_location: bool,

    /// Read buffer size for hashing (e.g., 32KiB, 1MiB)
    ///
    /// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub chunk_size: Option<u64>,

    /// Number of I/O threads for hashing [default: 4]
    ///
    /// Lower values reduce disk thrashing on HDDs; 1 hashes strictly in order.
    #[arg(long, value_name = "N")]
    pub io_threads: Option<usize>,

    /// Files hashed per database commit [default: 256]
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// CSV field delimiter (a single ASCII character, or `tab`)
    #[arg(long, value_name = "CHAR", value_parser = parse_delimiter)]
    pub delimiter: Option<char>,

    /// When to quote CSV fields
    #[arg(long, value_enum)]
    pub quote_style: Option<QuoteStyleArg>,

    /// Text encoding of the CSV report [default: utf-8]
    #[arg(long, value_enum)]
    pub encoding: Option<EncodingArg>,

    /// Disable progress bars
    #[arg(long)]
    pub no_progress: bool,

    /// Print errors as JSON on stderr
    #[arg(long)]
    pub json_errors: bool,

    /// Config file (TOML) [default: platform config dir]
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Quoting behaviour of the CSV report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuoteStyleArg {
    /// Quote fields only when needed
    #[default]
    Necessary,
    /// Quote every field
    Always,
    /// Quote every field that is not a number
    NonNumeric,
    /// Never quote
    Never,
}

impl QuoteStyleArg {
    /// The matching `csv` writer setting.
    #[must_use]
    pub fn to_csv(self) -> csv::QuoteStyle {
        match self {
            Self::Necessary => csv::QuoteStyle::Necessary,
            Self::Always => csv::QuoteStyle::Always,
            Self::NonNumeric => csv::QuoteStyle::NonNumeric,
            Self::Never => csv::QuoteStyle::Never,
        }
    }
}

impl std::fmt::Display for QuoteStyleArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Necessary => write!(f, "necessary"),
            Self::Always => write!(f, "always"),
            Self::NonNumeric => write!(f, "non-numeric"),
            Self::Never => write!(f, "never"),
        }
    }
}

/// Text encoding of the CSV report.
///
/// Only UTF-8 is supported; `utf-8-sig` prepends a byte order mark.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum EncodingArg {
    /// UTF-8
    #[default]
    #[value(name = "utf-8", alias = "utf8")]
    #[serde(rename = "utf-8", alias = "utf8")]
    Utf8,
    /// UTF-8 with a byte order mark
    #[value(name = "utf-8-sig", alias = "utf8-sig")]
    #[serde(rename = "utf-8-sig", alias = "utf8-sig")]
    Utf8Sig,
}

impl EncodingArg {
    /// The matching report encoding.
    #[must_use]
    pub fn to_output(self) -> ReportEncoding {
        match self {
            Self::Utf8 => ReportEncoding::Utf8,
            Self::Utf8Sig => ReportEncoding::Utf8Bom,
        }
    }
}

impl std::fmt::Display for EncodingArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Utf8 => write!(f, "utf-8"),
            Self::Utf8Sig => write!(f, "utf-8-sig"),
        }
    }
}

/// Parse a human-readable size string into bytes.
///
/// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
/// Case-insensitive. Numbers without suffix are treated as bytes.
///
/// # Examples
///
/// ```
/// use dupreport::cli::parse_size;
///
/// assert_eq!(parse_size("32768").unwrap(), 32768);
/// assert_eq!(parse_size("32KiB").unwrap(), 32768);
/// assert_eq!(parse_size("1MB").unwrap(), 1_000_000);
/// ```
///
/// # Errors
///
/// Returns an error if the string is empty, contains an invalid number,
/// a negative number, or an unknown size suffix.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }
    if s.starts_with('-') {
        return Err("Size cannot be negative".to_string());
    }

    let (num_str, suffix) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => (&s[..idx], s[idx..].trim().to_uppercase()),
        None => (s, String::new()),
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number: '{num_str}'"))?;

    let multiplier: u64 = match suffix.as_str() {
        "" | "B" => 1,
        "KB" | "K" => 1_000,
        "KIB" => 1_024,
        "MB" | "M" => 1_000_000,
        "MIB" => 1_048_576,
        "GB" | "G" => 1_000_000_000,
        "GIB" => 1_073_741_824,
        "TB" | "T" => 1_000_000_000_000,
        "TIB" => 1_099_511_627_776,
        _ => return Err(format!("Unknown size suffix: '{suffix}'")),
    };

    Ok((num * multiplier as f64) as u64)
}

/// Parse a CSV delimiter: one ASCII character, or `tab` / `\t`.
///
/// # Errors
///
/// Returns an error for empty, multi-character or non-ASCII input.
pub fn parse_delimiter(s: &str) -> Result<char, String> {
    if s.eq_ignore_ascii_case("tab") || s == "\\t" {
        return Ok('\t');
    }

    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii() => Ok(c),
        (Some(_), None) => Err(format!("Delimiter must be ASCII: '{s}'")),
        _ => Err(format!("Delimiter must be a single character: '{s}'")),
    }
}
