//! Layered application configuration.
//!
//! Values are merged with `figment`, later layers winning:
//!
//! 1. Built-in defaults
//! 2. TOML file: `--config PATH`, else `config.toml` in the platform config
//!    directory (skipped if absent)
//! 3. Environment variables prefixed `DUPREPORT_` (e.g. `DUPREPORT_IO_THREADS=8`)
//! 4. Command-line flags

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::cli::{Cli, EncodingArg, QuoteStyleArg};
use crate::duplicates::{FinderConfig, DEFAULT_BATCH_SIZE, DEFAULT_IO_THREADS};
use crate::output::csv::{CsvDialect, DEFAULT_OUTPUT_FILE};
use crate::scanner::DEFAULT_CHUNK_SIZE;
use crate::store::{GroupOrder, DEFAULT_DB_FILE};

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "DUPREPORT_";

/// Errors raised while loading or checking configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An explicitly named config file does not exist.
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// A layer could not be parsed or had the wrong type.
    #[error("Invalid configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// A numeric setting was zero.
    #[error("{0} must be at least 1")]
    Zero(&'static str),

    /// The delimiter is not a single ASCII character.
    #[error("Delimiter must be a single ASCII character, got {0:?}")]
    InvalidDelimiter(char),
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite metadata store.
    pub db_path: PathBuf,
    /// CSV report path, `-` for stdout.
    pub output: PathBuf,
    /// Hash read buffer size in bytes.
    pub chunk_size: usize,
    /// Hashing threads.
    pub io_threads: usize,
    /// Files hashed per commit.
    pub batch_size: usize,
    /// CSV field delimiter.
    pub delimiter: char,
    /// CSV quoting.
    pub quote_style: QuoteStyleArg,
    /// CSV text encoding.
    pub encoding: EncodingArg,
    /// Order the report by location instead of digest.
    pub order_by_location: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_FILE),
            output: PathBuf::from(DEFAULT_OUTPUT_FILE),
            chunk_size: DEFAULT_CHUNK_SIZE,
            io_threads: DEFAULT_IO_THREADS,
            batch_size: DEFAULT_BATCH_SIZE,
            delimiter: ',',
            quote_style: QuoteStyleArg::Necessary,
            encoding: EncodingArg::Utf8,
            order_by_location: false,
        }
    }
}

impl Config {
    /// Platform-specific default config file path.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "dupreport", "dupreport")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Defaults merged with a TOML file, without the environment layer.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] if `file` is given but missing.
    pub fn file_figment(file: Option<&Path>) -> Result<Figment, ConfigError> {
        let figment = Figment::from(Serialized::defaults(Self::default()));
        match file {
            Some(path) if !path.exists() => Err(ConfigError::NotFound(path.to_path_buf())),
            Some(path) => Ok(figment.merge(Toml::file(path))),
            None => Ok(match Self::default_path() {
                Some(path) => figment.merge(Toml::file(path)),
                None => figment,
            }),
        }
    }

    /// Defaults, TOML file and `DUPREPORT_*` environment.
    ///
    /// # Errors
    ///
    /// See [`Config::file_figment`].
    pub fn figment(file: Option<&Path>) -> Result<Figment, ConfigError> {
        Ok(Self::file_figment(file)?.merge(Env::prefixed(ENV_PREFIX)))
    }

    /// Load configuration for a CLI invocation, applying its flags last.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a layer is malformed or the result fails
    /// [`Config::validate`].
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let config: Self = Self::figment(cli.config.as_deref())?
            .extract()
            .map_err(Box::new)?;
        let config = config.merge_cli(cli);
        config.validate()?;
        log::debug!("Effective configuration: {config:?}");
        Ok(config)
    }

    /// Override values with flags given on the command line.
    #[must_use]
    pub fn merge_cli(mut self, cli: &Cli) -> Self {
        if let Some(ref db) = cli.db {
            self.db_path.clone_from(db);
        }
        if let Some(ref output) = cli.output {
            self.output.clone_from(output);
        }
        if let Some(chunk_size) = cli.chunk_size {
            self.chunk_size = usize::try_from(chunk_size).unwrap_or(usize::MAX);
        }
        if let Some(io_threads) = cli.io_threads {
            self.io_threads = io_threads;
        }
        if let Some(batch_size) = cli.batch_size {
            self.batch_size = batch_size;
        }
        if let Some(delimiter) = cli.delimiter {
            self.delimiter = delimiter;
        }
        if let Some(quote_style) = cli.quote_style {
            self.quote_style = quote_style;
        }
        if let Some(encoding) = cli.encoding {
            self.encoding = encoding;
        }
        if cli.order_by_location {
            self.order_by_location = true;
        }
        self
    }

    /// Reject values the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Zero`] or [`ConfigError::InvalidDelimiter`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Zero("chunk_size"));
        }
        if self.io_threads == 0 {
            return Err(ConfigError::Zero("io_threads"));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Zero("batch_size"));
        }
        if !self.delimiter.is_ascii() {
            return Err(ConfigError::InvalidDelimiter(self.delimiter));
        }
        Ok(())
    }

    /// Report order.
    #[must_use]
    pub fn group_order(&self) -> GroupOrder {
        if self.order_by_location {
            GroupOrder::Location
        } else {
            GroupOrder::HashThenLocation
        }
    }

    /// Finder settings derived from this configuration.
    #[must_use]
    pub fn finder_config(&self) -> FinderConfig {
        FinderConfig::default()
            .with_chunk_size(self.chunk_size)
            .with_io_threads(self.io_threads)
            .with_batch_size(self.batch_size)
            .with_order(self.group_order())
    }

    /// CSV dialect derived from this configuration.
    #[must_use]
    pub fn csv_dialect(&self) -> CsvDialect {
        let mut buf = [0u8; 4];
        let delimiter = self.delimiter.encode_utf8(&mut buf).as_bytes()[0];
        CsvDialect::excel()
            .with_delimiter(delimiter)
            .with_quote_style(self.quote_style.to_csv())
            .with_encoding(self.encoding.to_output())
    }

    /// Whether the report goes to stdout.
    #[must_use]
    pub fn writes_to_stdout(&self) -> bool {
        self.output.as_os_str() == "-"
    }
}
