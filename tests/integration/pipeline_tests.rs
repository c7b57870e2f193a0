use dupreport::duplicates::{
    DuplicateFinder, DuplicatePipeline, FinderConfig, FinderError, PipelineState,
};
use dupreport::store::{FileStore, GroupOrder, StoreState};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tempfile::tempdir;

const HELLO_MD5: &str = "5d41402abc4b2a76b9719d911017c592";

fn write_file(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    File::create(path).unwrap().write_all(content).unwrap();
}

fn scenario(root: &Path) {
    write_file(&root.join("a.txt"), b"hello");
    write_file(&root.join("b.txt"), b"hello");
    write_file(&root.join("c.txt"), b"world");
    write_file(&root.join("d.txt"), b"unique!!!");
}

fn locations(report: &dupreport::duplicates::ScanReport) -> Vec<&str> {
    report.records.iter().map(|r| r.location()).collect()
}

#[test]
fn test_scan_empty_directory() {
    let root = tempdir().unwrap();
    let db_dir = tempdir().unwrap();

    let report = DuplicateFinder::with_defaults()
        .find_duplicates(root.path(), &db_dir.path().join("db.sqlite3"))
        .unwrap();

    assert!(report.records.is_empty());
    assert_eq!(report.summary.files_in_store, 0);
    assert_eq!(report.summary.duplicate_groups, 0);
}

#[test]
fn test_scan_reports_only_equal_content() {
    let root = tempdir().unwrap();
    let db_dir = tempdir().unwrap();
    let db_path = db_dir.path().join("db.sqlite3");
    scenario(root.path());

    let report = DuplicateFinder::with_defaults()
        .find_duplicates(root.path(), &db_path)
        .unwrap();

    assert_eq!(locations(&report), vec!["a.txt", "b.txt"]);
    for record in &report.records {
        assert_eq!(record.content_hash().unwrap().as_str(), HELLO_MD5);
        assert_eq!(record.size(), 5);
        assert_eq!(record.ext(), "txt");
    }
    assert_eq!(report.summary.files_in_store, 4);
    assert_eq!(report.summary.hashed_files, 3);
    assert_eq!(report.summary.duplicate_groups, 1);
    assert_eq!(report.summary.duplicate_files, 1);
    assert_eq!(report.summary.reclaimable_space, 5);

    // c.txt collides on size and is hashed, d.txt is never read
    let store = FileStore::open(&db_path).unwrap();
    assert!(store.get("c.txt").unwrap().unwrap().content_hash().is_some());
    assert!(store.get("d.txt").unwrap().unwrap().content_hash().is_none());
}

#[test]
fn test_nested_locations_use_forward_slashes() {
    let root = tempdir().unwrap();
    let db_dir = tempdir().unwrap();
    write_file(&root.path().join("x").join("y").join("copy.bin"), b"same bytes");
    write_file(&root.path().join("orig.bin"), b"same bytes");

    let report = DuplicateFinder::with_defaults()
        .find_duplicates(root.path(), &db_dir.path().join("db.sqlite3"))
        .unwrap();

    assert_eq!(locations(&report), vec!["orig.bin", "x/y/copy.bin"]);
    assert_eq!(report.records[1].name(), "copy.bin");
}

#[test]
fn test_order_by_location_interleaves_groups() {
    let root = tempdir().unwrap();
    let db_dir = tempdir().unwrap();
    write_file(&root.path().join("a1"), b"zzzz");
    write_file(&root.path().join("a2"), b"aaaa");
    write_file(&root.path().join("b1"), b"zzzz");
    write_file(&root.path().join("b2"), b"aaaa");

    let by_hash = DuplicateFinder::new(FinderConfig::default().with_recreate(true))
        .find_duplicates(root.path(), &db_dir.path().join("hash.sqlite3"))
        .unwrap();
    let by_location = DuplicateFinder::new(
        FinderConfig::default()
            .with_recreate(true)
            .with_order(GroupOrder::Location),
    )
    .find_duplicates(root.path(), &db_dir.path().join("loc.sqlite3"))
    .unwrap();

    assert_eq!(locations(&by_location), vec!["a1", "a2", "b1", "b2"]);

    // Digest order keeps each group contiguous
    let hashes: Vec<_> = by_hash
        .records
        .iter()
        .map(|r| r.content_hash().unwrap().clone())
        .collect();
    assert_eq!(hashes[0], hashes[1]);
    assert_eq!(hashes[2], hashes[3]);
    assert!(hashes[1] < hashes[2]);
}

#[test]
fn test_second_run_reuses_store() {
    let root = tempdir().unwrap();
    let db_dir = tempdir().unwrap();
    let db_path = db_dir.path().join("db.sqlite3");
    scenario(root.path());

    let finder = DuplicateFinder::with_defaults();
    let first = finder.find_duplicates(root.path(), &db_path).unwrap();
    let second = finder.find_duplicates(root.path(), &db_path).unwrap();

    assert!(!first.summary.store_reused);
    assert!(second.summary.store_reused);
    assert_eq!(second.summary.hashed_files, 0);
    assert_eq!(locations(&first), locations(&second));
}

#[test]
fn test_reused_store_ignores_new_files_until_recreate() {
    let root = tempdir().unwrap();
    let db_dir = tempdir().unwrap();
    let db_path = db_dir.path().join("db.sqlite3");
    scenario(root.path());

    DuplicateFinder::with_defaults()
        .find_duplicates(root.path(), &db_path)
        .unwrap();
    write_file(&root.path().join("e.txt"), b"hello");

    let stale = DuplicateFinder::with_defaults()
        .find_duplicates(root.path(), &db_path)
        .unwrap();
    assert_eq!(locations(&stale), vec!["a.txt", "b.txt"]);

    let fresh = DuplicateFinder::new(FinderConfig::default().with_recreate(true))
        .find_duplicates(root.path(), &db_path)
        .unwrap();
    assert_eq!(locations(&fresh), vec!["a.txt", "b.txt", "e.txt"]);
    assert!(!fresh.summary.store_reused);
}

#[test]
fn test_interrupted_walk_leaves_store_empty() {
    let root = tempdir().unwrap();
    let db_dir = tempdir().unwrap();
    let db_path = db_dir.path().join("db.sqlite3");
    scenario(root.path());

    let flag = Arc::new(AtomicBool::new(false));
    let config = FinderConfig::default().with_shutdown_flag(flag.clone());
    let (mut store, state) = FileStore::rebuild_or_reuse(&db_path, false).unwrap();
    let mut pipeline = DuplicatePipeline::new(&mut store, root.path(), &config, state);

    flag.store(true, std::sync::atomic::Ordering::SeqCst);
    assert!(matches!(pipeline.populate(), Err(FinderError::Interrupted)));
    assert_eq!(pipeline.state(), PipelineState::Empty);
    drop(pipeline);
    assert_eq!(store.count().unwrap(), 0);

    // The empty store is treated as fresh on the next run
    drop(store);
    let (_, state) = FileStore::rebuild_or_reuse(&db_path, false).unwrap();
    assert_eq!(state, StoreState::Fresh);
}

#[test]
fn test_vanished_file_is_skipped() {
    let root = tempdir().unwrap();
    scenario(root.path());

    let config = FinderConfig::default();
    let mut store = FileStore::open_in_memory().unwrap();
    let mut pipeline = DuplicatePipeline::new(&mut store, root.path(), &config, StoreState::Fresh);
    pipeline.populate().unwrap();

    fs::remove_file(root.path().join("c.txt")).unwrap();

    assert_eq!(pipeline.hash_candidates().unwrap(), 2);
    assert_eq!(pipeline.summary().failed_files, 1);
    assert!(pipeline.summary().errors[0].path().ends_with("c.txt"));

    let records = pipeline.report().unwrap();
    let found: Vec<_> = records.iter().map(|r| r.location()).collect();
    assert_eq!(found, vec!["a.txt", "b.txt"]);
    drop(pipeline);
    assert!(store.get("c.txt").unwrap().unwrap().content_hash().is_none());
}

#[cfg(unix)]
#[test]
fn test_unreadable_directory_is_skipped() {
    use std::os::unix::fs::PermissionsExt;

    let root = tempdir().unwrap();
    let db_dir = tempdir().unwrap();
    scenario(root.path());
    let locked = root.path().join("locked");
    write_file(&locked.join("hidden.txt"), b"hello");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    // Permission bits do not apply to root
    let readable = fs::read_dir(&locked).is_ok();

    let result = DuplicateFinder::with_defaults()
        .find_duplicates(root.path(), &db_dir.path().join("db.sqlite3"));
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

    let report = result.unwrap();
    if readable {
        assert_eq!(report.summary.files_in_store, 5);
    } else {
        assert_eq!(report.summary.files_in_store, 4);
        assert_eq!(locations(&report), vec!["a.txt", "b.txt"]);
    }
}

#[test]
fn test_every_reported_digest_is_shared() {
    let root = tempdir().unwrap();
    let db_dir = tempdir().unwrap();
    for i in 0..12u8 {
        let content = vec![b'a' + (i % 3); 8 + usize::from(i % 2)];
        write_file(&root.path().join(format!("f{i:02}.dat")), &content);
    }

    let report = DuplicateFinder::new(FinderConfig::default().with_batch_size(3))
        .find_duplicates(root.path(), &db_dir.path().join("db.sqlite3"))
        .unwrap();

    assert!(!report.records.is_empty());
    for record in &report.records {
        let digest = record.content_hash().unwrap();
        let peers = report
            .records
            .iter()
            .filter(|r| r.content_hash() == Some(digest) && r.size() == record.size())
            .count();
        assert!(peers > 1, "{} has no duplicate", record.location());
    }
    let grouped: usize = report.groups.iter().map(|g| g.len()).sum();
    assert_eq!(grouped, report.records.len());
}

#[test]
fn test_missing_root_is_rejected() {
    let db_dir = tempdir().unwrap();
    let db_path = db_dir.path().join("db.sqlite3");

    let result = DuplicateFinder::with_defaults()
        .find_duplicates(&db_dir.path().join("nope"), &db_path);

    assert!(matches!(result, Err(FinderError::PathNotFound(_))));
    assert!(!db_path.exists());
}

#[test]
fn test_modification_time_is_reported_in_utc() {
    let root = tempdir().unwrap();
    let db_dir = tempdir().unwrap();
    scenario(root.path());
    let mtime = filetime::FileTime::from_unix_time(1_700_000_000, 123_456_789);
    filetime::set_file_mtime(root.path().join("a.txt"), mtime).unwrap();

    let report = DuplicateFinder::with_defaults()
        .find_duplicates(root.path(), &db_dir.path().join("db.sqlite3"))
        .unwrap();

    assert_eq!(
        report.records[0].modified_at_text(),
        "2023-11-14T22:13:20.123456Z"
    );
}

#[cfg(unix)]
#[test]
fn test_non_utf8_names_are_skipped() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let root = tempdir().unwrap();
    let db_dir = tempdir().unwrap();
    write_file(&root.path().join("a.txt"), b"hello");
    write_file(&root.path().join("b.txt"), b"hello");
    // Both names would collapse to the same replacement string
    write_file(&root.path().join(OsStr::from_bytes(b"\xff.bin")), b"hello");
    write_file(&root.path().join(OsStr::from_bytes(b"\xfe.bin")), b"hello");

    let report = DuplicateFinder::with_defaults()
        .find_duplicates(root.path(), &db_dir.path().join("db.sqlite3"))
        .unwrap();

    assert_eq!(locations(&report), vec!["a.txt", "b.txt"]);
    assert_eq!(report.summary.skipped_files, 2);
    assert_eq!(report.summary.files_in_store, 2);
    assert_eq!(report.summary.failed_files, 0);
}

#[test]
fn test_store_inside_root_is_not_scanned() {
    let root = tempdir().unwrap();
    let db_path = root.path().join("duplicates.sqlite3");
    scenario(root.path());

    let finder = DuplicateFinder::new(FinderConfig::default().with_recreate(true));
    finder.find_duplicates(root.path(), &db_path).unwrap();
    let report = finder.find_duplicates(root.path(), &db_path).unwrap();

    assert_eq!(report.summary.files_in_store, 4);
    assert_eq!(locations(&report), vec!["a.txt", "b.txt"]);
    let store = FileStore::open(&db_path).unwrap();
    assert!(store.get("duplicates.sqlite3").unwrap().is_none());
}

#[test]
fn test_configured_excluded_path_is_not_scanned() {
    let root = tempdir().unwrap();
    scenario(root.path());
    write_file(&root.path().join("report.csv"), b"hello");

    let config = FinderConfig::default().with_excluded_path(root.path().join("report.csv"));
    let mut store = FileStore::open_in_memory().unwrap();
    let report = DuplicateFinder::new(config)
        .find_duplicates_in_store(root.path(), &mut store, StoreState::Fresh)
        .unwrap();

    assert_eq!(locations(&report), vec!["a.txt", "b.txt"]);
}
