use dupreport::cli::{EncodingArg, QuoteStyleArg};
use dupreport::output::ReportEncoding;
use dupreport::config::{Config, ConfigError};
use dupreport::store::GroupOrder;
use figment::providers::{Env, Serialized};
use figment::Figment;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

#[test]
fn test_config_load_defaults() {
    // Use figment directly without Env to avoid interference from other tests
    let figment = Figment::from(Serialized::defaults(Config::default()));
    let config: Config = figment.extract().unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.quote_style, QuoteStyleArg::Necessary);
}

#[test]
fn test_config_load_from_toml() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
db_path = "/var/tmp/scan.sqlite3"
io_threads = 2
delimiter = ";"
quote_style = "non-numeric"
encoding = "utf-8-sig"
order_by_location = true
"#,
    )
    .unwrap();

    let config: Config = Config::file_figment(Some(&path))
        .unwrap()
        .extract()
        .unwrap();

    assert_eq!(config.db_path, PathBuf::from("/var/tmp/scan.sqlite3"));
    assert_eq!(config.io_threads, 2);
    assert_eq!(config.delimiter, ';');
    assert_eq!(config.quote_style, QuoteStyleArg::NonNumeric);
    assert_eq!(config.encoding, EncodingArg::Utf8Sig);
    assert_eq!(config.csv_dialect().encoding, ReportEncoding::Utf8Bom);
    assert_eq!(config.group_order(), GroupOrder::Location);
    // Untouched keys keep their defaults
    assert_eq!(config.batch_size, 256);
    assert_eq!(config.output, PathBuf::from("duplicates.csv"));
}

#[test]
fn test_config_rejects_wrong_type() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "io_threads = \"many\"\n").unwrap();

    let result: Result<Config, _> = Config::file_figment(Some(&path)).unwrap().extract();
    assert!(result.is_err());
}

#[test]
fn test_config_load_from_env() {
    std::env::set_var("DUPREPORT_BATCH_SIZE", "17");
    std::env::set_var("DUPREPORT_OUTPUT", "-");

    let figment =
        Figment::from(Serialized::defaults(Config::default())).merge(Env::prefixed("DUPREPORT_"));
    let config: Config = figment.extract().unwrap();

    assert_eq!(config.batch_size, 17);
    assert!(config.writes_to_stdout());

    // Clean up
    std::env::remove_var("DUPREPORT_BATCH_SIZE");
    std::env::remove_var("DUPREPORT_OUTPUT");
}

#[test]
fn test_finder_config_from_config() {
    let config = Config {
        chunk_size: 4096,
        io_threads: 1,
        batch_size: 8,
        order_by_location: true,
        ..Config::default()
    };
    let finder = config.finder_config();

    assert_eq!(finder.chunk_size, 4096);
    assert_eq!(finder.io_threads, 1);
    assert_eq!(finder.batch_size, 8);
    assert_eq!(finder.order, GroupOrder::Location);
}

#[test]
fn test_missing_config_file_is_an_error() {
    let dir = tempdir().unwrap();
    let result = Config::file_figment(Some(&dir.path().join("absent.toml")));
    assert!(matches!(result, Err(ConfigError::NotFound(_))));
}
