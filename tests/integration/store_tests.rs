use chrono::{TimeZone, Utc};
use dupreport::scanner::Digest;
use dupreport::store::{FileRecord, FileStore, GroupOrder, StoreError, StoreState};
use std::fs;
use tempfile::tempdir;

fn record(location: &str, size: u64) -> FileRecord {
    let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    FileRecord::new(location, size, ts).unwrap()
}

#[test]
fn test_records_persist_across_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.sqlite3");

    {
        let mut store = FileStore::open(&path).unwrap();
        store
            .bulk_insert(&[record("a/x.txt", 3), record("b.tar.gz", 9)])
            .unwrap();
        store.close().unwrap();
    }

    let store = FileStore::open(&path).unwrap();
    assert_eq!(store.count().unwrap(), 2);
    assert_eq!(store.total_size().unwrap(), 12);

    let loaded = store.get("b.tar.gz").unwrap().unwrap();
    assert_eq!(loaded.name(), "b.tar.gz");
    assert_eq!(loaded.ext(), "gz");
    assert_eq!(loaded.modified_at_text(), "2024-05-01T12:00:00.000000Z");
    assert!(store.get("missing").unwrap().is_none());
}

#[test]
fn test_hash_updates_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.sqlite3");
    let digest = Digest::of_bytes(b"hello");

    {
        let mut store = FileStore::open(&path).unwrap();
        store
            .bulk_insert(&[record("a", 5), record("b", 5), record("c", 5)])
            .unwrap();
        let updated = store
            .update_hashes(&[("a".to_string(), digest.clone()), ("b".to_string(), digest.clone())])
            .unwrap();
        assert_eq!(updated, 2);
    }

    let (store, state) = FileStore::rebuild_or_reuse(&path, false).unwrap();
    assert_eq!(state, StoreState::Reused);
    assert_eq!(store.count_hashed().unwrap(), 2);
    assert_eq!(store.select_unhashed_size_collisions().unwrap(), vec!["c"]);

    let dupes = store.select_duplicate_groups(GroupOrder::Location).unwrap();
    let found: Vec<_> = dupes.iter().map(|r| r.location()).collect();
    assert_eq!(found, vec!["a", "b"]);
}

#[test]
fn test_equal_digest_with_different_size_is_not_a_duplicate() {
    let mut store = FileStore::open_in_memory().unwrap();
    let digest = Digest::of_bytes(b"same");
    store
        .bulk_insert(&[
            record("small", 4).with_content_hash(digest.clone()),
            record("large", 40).with_content_hash(digest),
        ])
        .unwrap();

    assert!(store
        .select_duplicate_groups(GroupOrder::HashThenLocation)
        .unwrap()
        .is_empty());
}

#[test]
fn test_update_unknown_location_fails() {
    let store = FileStore::open_in_memory().unwrap();
    let result = store.update_hash("ghost", &Digest::of_bytes(b""));
    assert!(matches!(result, Err(StoreError::UnknownLocation(loc)) if loc == "ghost"));
}

#[test]
fn test_recreate_removes_journal_files() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.sqlite3");
    {
        let mut store = FileStore::open(&path).unwrap();
        store.bulk_insert(&[record("a", 1)]).unwrap();
    }
    let journal = dir.path().join("store.sqlite3-journal");
    fs::write(&journal, b"").unwrap();

    let (store, state) = FileStore::rebuild_or_reuse(&path, true).unwrap();

    assert_eq!(state, StoreState::Fresh);
    assert_eq!(store.count().unwrap(), 0);
    assert!(!journal.exists());
}

#[test]
fn test_size_collisions_are_location_ordered() {
    let mut store = FileStore::open_in_memory().unwrap();
    store
        .bulk_insert(&[
            record("z", 10),
            record("m", 2),
            record("a", 10),
            record("k", 10),
            record("q", 7),
        ])
        .unwrap();

    assert_eq!(store.select_size_collisions().unwrap(), vec!["a", "k", "z"]);
}
