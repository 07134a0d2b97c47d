//! Dual-backend coordinator: remote-first reads and writes with local
//! mirroring, degrading to local-only when the remote store is unreachable.
//!
//! Fallback is an explicit per-collection state machine, not scattered
//! exception handling: `Healthy` flips to `Degraded` on a remote timeout and
//! back only through an explicit `reconnect`. All state is owned by the
//! instance, so independent coordinators (tests, tools) never interfere.
//!
//! Every collection has its own async mutex. `read`, `write`, and the
//! read-modify-write `update` all hold it for their full duration — a write
//! here is always a whole-mapping replace derived from a prior read, and an
//! unserialized stale read would silently drop concurrent updates.

use crate::errors::{StoreError, StoreResult};
use crate::models::{Collection, RawRecords};
use crate::store::local::LocalStore;
use crate::store::migrate::{self, MigrationReport};
use crate::store::remote::RemoteBackend;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Operating state of one collection's remote backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Healthy,
    Degraded,
}

#[derive(Debug)]
struct CollectionState {
    health: Health,
    /// Set when a write went to the local store only. Cleared by `resync`.
    dirty: bool,
    /// First-read migration already ran this process lifetime.
    migrated: bool,
    last_migration: Option<MigrationReport>,
}

/// Snapshot of one collection's coordinator state, for observability.
#[derive(Debug, Clone)]
pub struct CollectionStatus {
    pub collection: Collection,
    pub health: Health,
    pub dirty: bool,
    pub migrated: bool,
}

pub struct Coordinator {
    local: LocalStore,
    remote: Option<Arc<dyn RemoteBackend>>,
    states: [Mutex<CollectionState>; Collection::ALL.len()],
}

impl Coordinator {
    pub fn new(local: LocalStore, remote: Option<Arc<dyn RemoteBackend>>) -> Self {
        Self {
            local,
            remote,
            states: std::array::from_fn(|_| {
                Mutex::new(CollectionState {
                    health: Health::Healthy,
                    dirty: false,
                    migrated: false,
                    last_migration: None,
                })
            }),
        }
    }

    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    pub fn remote_configured(&self) -> bool {
        self.remote.is_some()
    }

    fn state(&self, collection: Collection) -> &Mutex<CollectionState> {
        &self.states[collection as usize]
    }

    /// Read the full mapping for a collection.
    ///
    /// Remote-first while healthy; a remote timeout degrades the collection
    /// and serves the local mirror instead. Successful remote reads are
    /// mirrored into the local store best-effort. The first read per process
    /// runs the migration engine.
    pub async fn read(&self, collection: Collection) -> StoreResult<RawRecords> {
        let mut state = self.state(collection).lock().await;
        self.read_locked(collection, &mut state).await
    }

    /// Replace the full mapping for a collection.
    ///
    /// Fails with `Persistence` only when no backend accepted the write; a
    /// remote failure alone degrades the collection and commits locally.
    pub async fn write(&self, collection: Collection, records: RawRecords) -> StoreResult<()> {
        let mut state = self.state(collection).lock().await;
        self.write_locked(collection, &mut state, &records).await
    }

    /// Read-modify-write under the collection lock. The closure receives the
    /// migrated snapshot, mutates it in place, and the result is persisted
    /// before the lock is released.
    pub async fn update<T, F>(&self, collection: Collection, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut RawRecords) -> T + Send,
        T: Send,
    {
        let mut state = self.state(collection).lock().await;
        let mut records = self.read_locked(collection, &mut state).await?;
        let out = f(&mut records);
        self.write_locked(collection, &mut state, &records).await?;
        Ok(out)
    }

    /// Explicit attempt to bring a degraded collection back to `Healthy`.
    ///
    /// This is the only transition out of `Degraded` — per-call retries would
    /// cascade the remote timeout onto every operation. Local writes made
    /// while degraded are *not* replayed; `resync` is the manual path for
    /// that, and the dirty flag keeps the divergence visible until then.
    pub async fn reconnect(&self, collection: Collection) -> StoreResult<Health> {
        let Some(remote) = &self.remote else {
            return Ok(Health::Degraded);
        };
        let mut state = self.state(collection).lock().await;
        match remote.ping().await {
            Ok(()) => {
                if state.health == Health::Degraded {
                    info!(collection = %collection, "remote reachable again, leaving degraded mode");
                }
                if state.dirty {
                    warn!(
                        collection = %collection,
                        "local writes from degraded mode are not auto-replayed; run resync"
                    );
                }
                state.health = Health::Healthy;
            }
            Err(StoreError::RemoteUnavailable(reason)) => {
                warn!(collection = %collection, %reason, "reconnect failed, staying degraded");
                state.health = Health::Degraded;
            }
            Err(other) => return Err(other),
        }
        Ok(state.health)
    }

    /// Manually push the local snapshot of a collection to the remote store.
    ///
    /// This is the documented recovery path for writes made while degraded.
    /// Returns the number of records pushed.
    pub async fn resync(&self, collection: Collection) -> StoreResult<usize> {
        let Some(remote) = &self.remote else {
            return Err(StoreError::RemoteUnavailable(
                "no remote store configured".to_string(),
            ));
        };
        let mut state = self.state(collection).lock().await;
        let records = self.local.read_all(collection).await?;
        remote.write_all(collection, &records).await?;
        state.dirty = false;
        state.health = Health::Healthy;
        info!(collection = %collection, count = records.len(), "resynced local snapshot to remote");
        Ok(records.len())
    }

    /// Force the first-read migration for a collection and report what it
    /// did. Safe to call repeatedly; canonical data migrates zero entries and
    /// writes nothing.
    pub async fn migrate_now(&self, collection: Collection) -> StoreResult<MigrationReport> {
        let mut state = self.state(collection).lock().await;
        state.migrated = false;
        state.last_migration = None;
        self.read_locked(collection, &mut state).await?;
        Ok(state
            .last_migration
            .clone()
            .unwrap_or(MigrationReport {
                collection,
                migrated: 0,
                backup: None,
            }))
    }

    pub async fn status(&self) -> Vec<CollectionStatus> {
        let mut out = Vec::with_capacity(Collection::ALL.len());
        for collection in Collection::ALL {
            let state = self.state(collection).lock().await;
            out.push(CollectionStatus {
                collection,
                health: state.health,
                dirty: state.dirty,
                migrated: state.migrated,
            });
        }
        out
    }

    async fn read_locked(
        &self,
        collection: Collection,
        state: &mut CollectionState,
    ) -> StoreResult<RawRecords> {
        let (records, from_remote) = match (&self.remote, state.health) {
            (Some(remote), Health::Healthy) => match remote.read_all(collection).await {
                Ok(records) => (records, true),
                Err(StoreError::RemoteUnavailable(reason)) => {
                    warn!(collection = %collection, %reason, "remote read failed, degrading to local store");
                    state.health = Health::Degraded;
                    (self.local.read_all(collection).await?, false)
                }
                Err(other) => return Err(other),
            },
            _ => (self.local.read_all(collection).await?, false),
        };

        if !state.migrated {
            let outcome = migrate::migrate_collection(collection, &records, Utc::now());
            if outcome.migrated > 0 {
                // Snapshot the original mapping before any mutation lands. A
                // backup failure aborts the migration with the data untouched.
                let backup = self.local.write_backup(collection, &records, Utc::now()).await?;
                self.write_locked(collection, state, &outcome.records).await?;
                info!(
                    collection = %collection,
                    migrated = outcome.migrated,
                    backup = %backup.display(),
                    "migrated legacy records"
                );
                state.migrated = true;
                state.last_migration = Some(MigrationReport {
                    collection,
                    migrated: outcome.migrated,
                    backup: Some(backup),
                });
                return Ok(outcome.records);
            }
            state.migrated = true;
            state.last_migration = Some(MigrationReport {
                collection,
                migrated: 0,
                backup: None,
            });
        }

        if from_remote {
            // Write-through mirror for durability; never raised to the caller.
            if let Err(err) = self.local.write_all(collection, &records).await {
                warn!(collection = %collection, error = %err, "local mirror of remote read failed");
            }
        }

        Ok(records)
    }

    async fn write_locked(
        &self,
        collection: Collection,
        state: &mut CollectionState,
        records: &RawRecords,
    ) -> StoreResult<()> {
        match (&self.remote, state.health) {
            (Some(remote), Health::Healthy) => {
                match remote.write_all(collection, records).await {
                    Ok(()) => {
                        // Remote committed; the local mirror must follow so the
                        // local store never lags a confirmed write.
                        self.local.write_all(collection, records).await.map_err(|err| {
                            StoreError::Persistence {
                                collection: collection.name(),
                                reason: format!(
                                    "remote write committed but local mirror failed: {err}"
                                ),
                            }
                        })
                    }
                    Err(StoreError::RemoteUnavailable(reason)) => {
                        warn!(collection = %collection, %reason, "remote write failed, degrading to local store");
                        state.health = Health::Degraded;
                        state.dirty = true;
                        self.local.write_all(collection, records).await.map_err(|err| {
                            StoreError::Persistence {
                                collection: collection.name(),
                                reason: format!(
                                    "remote unavailable ({reason}) and local write failed: {err}"
                                ),
                            }
                        })
                    }
                    Err(other) => Err(other),
                }
            }
            (Some(_), Health::Degraded) => {
                state.dirty = true;
                self.local.write_all(collection, records).await.map_err(|err| {
                    StoreError::Persistence {
                        collection: collection.name(),
                        reason: format!("degraded and local write failed: {err}"),
                    }
                })
            }
            (None, _) => {
                self.local.write_all(collection, records).await.map_err(|err| {
                    StoreError::Persistence {
                        collection: collection.name(),
                        reason: format!("local-only write failed: {err}"),
                    }
                })
            }
        }
    }
}
