use chrono::{TimeZone, Utc};
use securecloud_store::errors::StoreError;
use securecloud_store::models::{Collection, RawRecords};
use securecloud_store::store::LocalStore;
use serde_json::json;

#[tokio::test]
async fn missing_file_reads_as_empty_mapping() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path());
    let records = store.read_all(Collection::Files).await.unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn whitespace_only_file_reads_as_empty_mapping() {
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(dir.path().join("files.json"), "  \n\t ")
        .await
        .unwrap();
    let store = LocalStore::new(dir.path());
    let records = store.read_all(Collection::Files).await.unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn write_then_read_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path());

    let mut records = RawRecords::new();
    records.insert("k1".into(), json!({"a": 1}));
    records.insert("k2".into(), json!(["legacy", "list"]));
    store.write_all(Collection::Folders, &records).await.unwrap();

    let read = store.read_all(Collection::Folders).await.unwrap();
    assert_eq!(read, records);
}

#[tokio::test]
async fn unparseable_file_is_corrupt_not_empty() {
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(dir.path().join("users.json"), "{not json")
        .await
        .unwrap();
    let store = LocalStore::new(dir.path());
    let err = store.read_all(Collection::Users).await.unwrap_err();
    assert!(matches!(err, StoreError::CorruptStore { collection, .. } if collection == "users"));
}

#[tokio::test]
async fn backups_never_overwrite_each_other() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path());
    let at = Utc.with_ymd_and_hms(2026, 8, 1, 9, 0, 0).unwrap();

    let mut first = RawRecords::new();
    first.insert("k".into(), json!("v1"));
    let mut second = RawRecords::new();
    second.insert("k".into(), json!("v2"));

    let path_a = store
        .write_backup(Collection::Folders, &first, at)
        .await
        .unwrap();
    let path_b = store
        .write_backup(Collection::Folders, &second, at)
        .await
        .unwrap();
    assert_ne!(path_a, path_b);

    // Both snapshots survive intact.
    let a: RawRecords =
        serde_json::from_slice(&tokio::fs::read(&path_a).await.unwrap()).unwrap();
    let b: RawRecords =
        serde_json::from_slice(&tokio::fs::read(&path_b).await.unwrap()).unwrap();
    assert_eq!(a, first);
    assert_eq!(b, second);

    let listed = store.list_backups(Collection::Folders).await.unwrap();
    assert_eq!(listed.len(), 2);
}
