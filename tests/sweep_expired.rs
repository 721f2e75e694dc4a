use std::time::Duration;

use serde_json::json;

use dice_session_backend::config::SessionConfig;
use dice_session_backend::session::allocator::create_session_with;
use dice_session_backend::session::{sweep_expired, SessionCode};
use dice_session_backend::store::{Collection, SessionStore, Store, StorePath};

const NOW: i64 = 1_700_000_000;
const TTL: Duration = Duration::from_secs(28_800);

fn open_store(dir: &tempfile::TempDir) -> Store {
    Store::open(dir.path().join("sweep.sled").to_str().unwrap()).expect("open store")
}

fn allocate(store: &Store, code: &str, created_at: i64) {
    let code = SessionCode::parse(code).expect("valid code");
    let expected = code.clone();
    let created = create_session_with(store, &SessionConfig::default(), created_at, || code.clone())
        .expect("allocate");
    assert_eq!(created, expected);
}

#[test]
fn sweep_removes_expired_session_and_its_log_together() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir);
    allocate(&store, "AB12CD", NOW - 28_800);
    allocate(&store, "XY99ZZ", NOW - 100);

    let report = sweep_expired(&store, NOW, TTL).expect("sweep");

    assert_eq!(report.scanned, 2);
    assert_eq!(report.removed, vec!["AB12CD".to_string()]);
    assert!(report.skipped_malformed.is_empty());

    let index = store.read_all(Collection::SessionTimestamps).unwrap();
    assert!(!index.exists("AB12CD"));
    assert!(index.exists("XY99ZZ"));
    assert!(store.read_log("AB12CD").unwrap().is_empty());
    assert_eq!(store.read_log("XY99ZZ").unwrap().len(), 1);

    let logs = store.read_all(Collection::Sessions).unwrap();
    assert!(!logs.exists("AB12CD"));
    assert!(logs.exists("XY99ZZ"));
}

#[test]
fn sweep_on_empty_store_is_a_no_op() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir);

    let report = sweep_expired(&store, NOW, TTL).expect("sweep");

    assert_eq!(report.scanned, 0);
    assert!(report.removed.is_empty());
}

#[test]
fn malformed_timestamps_are_skipped_not_deleted() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir);
    allocate(&store, "AB12CD", NOW - 90_000);
    store
        .write(&StorePath::SessionTimestamp("BADTS1".into()), json!("yesterday"))
        .expect("write malformed");

    let report = sweep_expired(&store, NOW, TTL).expect("sweep");

    assert_eq!(report.removed, vec!["AB12CD".to_string()]);
    assert_eq!(report.skipped_malformed, vec!["BADTS1".to_string()]);
    assert_eq!(
        store.get(&StorePath::SessionTimestamp("BADTS1".into())).unwrap(),
        Some(json!("yesterday"))
    );
}

#[test]
fn swept_code_can_be_reallocated() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir);
    allocate(&store, "AB12CD", NOW - 30_000);

    sweep_expired(&store, NOW, TTL).expect("sweep");
    allocate(&store, "AB12CD", NOW);

    let log = store.read_log("AB12CD").unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].message.timestamp, NOW);
    assert_eq!(store.session_count(), 1);
}
