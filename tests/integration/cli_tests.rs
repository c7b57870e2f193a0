use clap::Parser;
use dupreport::cli::Cli;
use dupreport::error::ExitCode;
use dupreport::run_app;
use dupreport::store::FileStore;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn cli_for(root: &Path, work: &Path, extra: &[&str]) -> Cli {
    let db = work.join("db.sqlite3");
    let output = work.join("report.csv");
    let mut args = vec![
        "dupreport".to_string(),
        root.display().to_string(),
        "--db".to_string(),
        db.display().to_string(),
        "-o".to_string(),
        output.display().to_string(),
        "--quiet".to_string(),
        "--no-progress".to_string(),
    ];
    args.extend(extra.iter().map(|s| (*s).to_string()));
    Cli::try_parse_from(args).unwrap()
}

#[test]
fn test_run_app_writes_report() {
    let root = tempdir().unwrap();
    let work = tempdir().unwrap();
    fs::write(root.path().join("one.txt"), "same").unwrap();
    fs::write(root.path().join("two.txt"), "same").unwrap();
    fs::write(root.path().join("other.txt"), "diff").unwrap();

    let code = run_app(cli_for(root.path(), work.path(), &[])).unwrap();

    assert_eq!(code, ExitCode::Success);
    let report = fs::read_to_string(work.path().join("report.csv")).unwrap();
    let rows: Vec<&str> = report.lines().collect();
    assert_eq!(rows.len(), 3);
    assert!(rows[0].starts_with("location,md5sum,size"));
    assert!(rows[1].starts_with("one.txt,"));
    assert!(rows[2].starts_with("two.txt,"));
}

#[test]
fn test_run_app_without_duplicates() {
    let root = tempdir().unwrap();
    let work = tempdir().unwrap();
    fs::write(root.path().join("a"), "1").unwrap();
    fs::write(root.path().join("b"), "22").unwrap();

    let code = run_app(cli_for(root.path(), work.path(), &[])).unwrap();

    // A clean scan with nothing to report still succeeds
    assert_eq!(code, ExitCode::Success);
    let report = fs::read_to_string(work.path().join("report.csv")).unwrap();
    assert_eq!(report.lines().count(), 1);
}

#[test]
fn test_run_app_is_idempotent() {
    let root = tempdir().unwrap();
    let work = tempdir().unwrap();
    fs::write(root.path().join("x.bin"), [0u8; 64]).unwrap();
    fs::write(root.path().join("y.bin"), [0u8; 64]).unwrap();

    run_app(cli_for(root.path(), work.path(), &[])).unwrap();
    let first = fs::read(work.path().join("report.csv")).unwrap();
    run_app(cli_for(root.path(), work.path(), &[])).unwrap();
    let second = fs::read(work.path().join("report.csv")).unwrap();
    run_app(cli_for(root.path(), work.path(), &["--recreate"])).unwrap();
    let third = fs::read(work.path().join("report.csv")).unwrap();

    assert_eq!(first, second);
    assert_eq!(first, third);
}

#[test]
fn test_run_app_rejects_missing_root() {
    let work = tempdir().unwrap();
    let root = work.path().join("missing");

    let err = run_app(cli_for(&root, work.path(), &[])).unwrap_err();

    assert_eq!(ExitCode::for_error(&err), ExitCode::GeneralError);
    assert!(format!("{err:#}").contains("Path not found"));
    assert!(!work.path().join("db.sqlite3").exists());
}

#[test]
fn test_run_app_rejects_zero_batch_size() {
    let root = tempdir().unwrap();
    let work = tempdir().unwrap();

    let err = run_app(cli_for(root.path(), work.path(), &["--batch-size", "0"])).unwrap_err();
    assert!(format!("{err:#}").contains("batch_size must be at least 1"));
}

#[cfg(unix)]
#[test]
fn test_run_app_succeeds_when_a_file_cannot_be_read() {
    use std::os::unix::fs::PermissionsExt;

    let root = tempdir().unwrap();
    let work = tempdir().unwrap();
    fs::write(root.path().join("a"), "same").unwrap();
    fs::write(root.path().join("b"), "same").unwrap();
    let locked = root.path().join("c");
    fs::write(&locked, "diff").unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    let result = run_app(cli_for(root.path(), work.path(), &[]));
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();

    assert_eq!(result.unwrap(), ExitCode::Success);
    let report = fs::read_to_string(work.path().join("report.csv")).unwrap();
    assert_eq!(report.lines().count(), 3);
}

#[test]
fn test_run_app_leaves_its_own_files_out_of_the_scan() {
    let root = tempdir().unwrap();
    fs::write(root.path().join("one.txt"), "same").unwrap();
    fs::write(root.path().join("two.txt"), "same").unwrap();

    // Store and report live inside the scanned tree
    run_app(cli_for(root.path(), root.path(), &[])).unwrap();
    let first = fs::read_to_string(root.path().join("report.csv")).unwrap();
    run_app(cli_for(root.path(), root.path(), &["--recreate"])).unwrap();
    let second = fs::read_to_string(root.path().join("report.csv")).unwrap();

    assert_eq!(first, second);
    let store = FileStore::open(&root.path().join("db.sqlite3")).unwrap();
    assert_eq!(store.count().unwrap(), 2);
    assert!(store.get("report.csv").unwrap().is_none());
    assert!(store.get("db.sqlite3").unwrap().is_none());
}

#[test]
fn test_run_app_writes_byte_order_mark() {
    let root = tempdir().unwrap();
    let work = tempdir().unwrap();
    fs::write(root.path().join("x"), "1").unwrap();

    run_app(cli_for(root.path(), work.path(), &["--encoding", "utf-8-sig"])).unwrap();

    let bytes = fs::read(work.path().join("report.csv")).unwrap();
    assert!(bytes.starts_with(b"\xEF\xBB\xBFlocation,"));
}
