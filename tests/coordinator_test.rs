mod common;

use common::FakeRemote;
use securecloud_store::errors::StoreError;
use securecloud_store::models::{Collection, RawRecords};
use securecloud_store::store::{Coordinator, Health, LocalStore};
use serde_json::json;
use std::sync::Arc;

fn coordinator(dir: &std::path::Path, remote: Arc<FakeRemote>) -> Coordinator {
    Coordinator::new(LocalStore::new(dir), Some(remote))
}

fn one_record(key: &str) -> RawRecords {
    let mut records = RawRecords::new();
    records.insert(key.into(), json!({"v": key}));
    records
}

#[tokio::test]
async fn healthy_writes_land_on_both_backends() {
    let dir = tempfile::tempdir().unwrap();
    let remote = Arc::new(FakeRemote::new());
    let store = coordinator(dir.path(), remote.clone());

    store
        .write(Collection::Users, one_record("u1"))
        .await
        .unwrap();

    assert!(remote.snapshot(Collection::Users).contains_key("u1"));
    let local = store.local().read_all(Collection::Users).await.unwrap();
    assert!(local.contains_key("u1"));
}

#[tokio::test]
async fn remote_outage_degrades_and_serves_the_local_mirror() {
    let dir = tempfile::tempdir().unwrap();
    let remote = Arc::new(FakeRemote::new());
    let store = coordinator(dir.path(), remote.clone());

    store
        .write(Collection::Users, one_record("u1"))
        .await
        .unwrap();

    remote.set_unavailable(true);
    let read = store.read(Collection::Users).await.unwrap();
    assert!(read.contains_key("u1"));

    let statuses = store.status().await;
    assert_eq!(statuses[Collection::Users as usize].health, Health::Degraded);
}

#[tokio::test]
async fn degraded_writes_stay_local_and_mark_dirty() {
    let dir = tempfile::tempdir().unwrap();
    let remote = Arc::new(FakeRemote::new());
    let store = coordinator(dir.path(), remote.clone());

    store
        .write(Collection::Users, one_record("u1"))
        .await
        .unwrap();
    let writes_before = remote.write_count();

    remote.set_unavailable(true);
    store
        .write(Collection::Users, one_record("u2"))
        .await
        .unwrap();

    // Nothing new reached the remote; the local mirror has the write.
    assert_eq!(remote.write_count(), writes_before);
    let local = store.local().read_all(Collection::Users).await.unwrap();
    assert!(local.contains_key("u2"));

    let statuses = store.status().await;
    let status = &statuses[Collection::Users as usize];
    assert_eq!(status.health, Health::Degraded);
    assert!(status.dirty);
}

#[tokio::test]
async fn reconnect_restores_health_but_does_not_replay() {
    let dir = tempfile::tempdir().unwrap();
    let remote = Arc::new(FakeRemote::new());
    let store = coordinator(dir.path(), remote.clone());

    remote.set_unavailable(true);
    store
        .write(Collection::Users, one_record("u1"))
        .await
        .unwrap();
    assert_eq!(
        store.reconnect(Collection::Users).await.unwrap(),
        Health::Degraded
    );

    remote.set_unavailable(false);
    assert_eq!(
        store.reconnect(Collection::Users).await.unwrap(),
        Health::Healthy
    );

    // Divergence survives reconnect until an explicit resync.
    assert!(!remote.snapshot(Collection::Users).contains_key("u1"));
    let statuses = store.status().await;
    assert!(statuses[Collection::Users as usize].dirty);

    let pushed = store.resync(Collection::Users).await.unwrap();
    assert_eq!(pushed, 1);
    assert!(remote.snapshot(Collection::Users).contains_key("u1"));
    let statuses = store.status().await;
    assert!(!statuses[Collection::Users as usize].dirty);
}

#[tokio::test]
async fn resync_without_remote_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = Coordinator::new(LocalStore::new(dir.path()), None);
    let err = store.resync(Collection::Users).await.unwrap_err();
    assert!(matches!(err, StoreError::RemoteUnavailable(_)));
}

#[tokio::test]
async fn concurrent_updates_are_serialized_not_lost() {
    let dir = tempfile::tempdir().unwrap();
    let remote = Arc::new(FakeRemote::new());
    let store = Arc::new(coordinator(dir.path(), remote));

    let mut tasks = Vec::new();
    for i in 0..16 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            store
                .update(Collection::Files, move |records| {
                    records.insert(format!("f{i}"), json!({"n": i}));
                })
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    // Every update survives, and the on-disk file is one complete document.
    let records = store.read(Collection::Files).await.unwrap();
    assert_eq!(records.len(), 16);
    let on_disk = store.local().read_all(Collection::Files).await.unwrap();
    assert_eq!(on_disk, records);
}

#[tokio::test]
async fn local_only_reads_and_writes_work_without_remote() {
    let dir = tempfile::tempdir().unwrap();
    let store = Coordinator::new(LocalStore::new(dir.path()), None);
    assert!(!store.remote_configured());

    store
        .update(Collection::Shares, |records| {
            records.insert("t1".into(), json!({"token": "t1"}));
        })
        .await
        .unwrap();
    let records = store.read(Collection::Shares).await.unwrap();
    assert!(records.contains_key("t1"));
}
