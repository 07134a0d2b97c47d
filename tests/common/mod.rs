#![allow(dead_code)]

use async_trait::async_trait;
use securecloud_store::errors::{StoreError, StoreResult};
use securecloud_store::models::{Collection, RawRecords};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use securecloud_store::store::RemoteBackend;

/// In-memory stand-in for the remote database, with a switch to simulate an
/// unreachable remote.
#[derive(Default)]
pub struct FakeRemote {
    data: Mutex<HashMap<&'static str, RawRecords>>,
    unavailable: AtomicBool,
    writes: AtomicUsize,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `RemoteUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn seed(&self, collection: Collection, records: RawRecords) {
        self.data.lock().unwrap().insert(collection.name(), records);
    }

    /// Current remote-side contents of a collection.
    pub fn snapshot(&self, collection: Collection) -> RawRecords {
        self.data
            .lock()
            .unwrap()
            .get(collection.name())
            .cloned()
            .unwrap_or_default()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_available(&self, op: &str) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::RemoteUnavailable(format!("{op}: fake outage")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteBackend for FakeRemote {
    async fn read_all(&self, collection: Collection) -> StoreResult<RawRecords> {
        self.check_available("read_all")?;
        Ok(self.snapshot(collection))
    }

    async fn write_all(&self, collection: Collection, records: &RawRecords) -> StoreResult<()> {
        self.check_available("write_all")?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.seed(collection, records.clone());
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        self.check_available("ping")
    }
}
