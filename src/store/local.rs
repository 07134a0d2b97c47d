//! File-backed durable store: one JSON document per collection.
//!
//! Writes are whole-file replaces via write-to-temp-then-atomic-rename, so a
//! concurrent reader either sees the previous complete file or the new one,
//! never a partial write. Concurrent *writers* still need the coordinator's
//! per-collection lock; the rename discipline only protects readers.

use crate::errors::{StoreError, StoreResult};
use crate::models::{Collection, RawRecords};
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_path(&self, collection: Collection) -> PathBuf {
        self.root.join(format!("{}.json", collection.name()))
    }

    fn backup_dir(&self) -> PathBuf {
        self.root.join("backups")
    }

    /// Read the full mapping for a collection.
    ///
    /// A missing file is the empty mapping. A file that exists but does not
    /// parse is `CorruptStore` — fatal for this collection, never guessed at.
    pub async fn read_all(&self, collection: Collection) -> StoreResult<RawRecords> {
        let path = self.collection_path(collection);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(RawRecords::new()),
            Err(err) => return Err(StoreError::Io(err)),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(RawRecords::new());
        }

        serde_json::from_slice(&bytes).map_err(|source| StoreError::CorruptStore {
            collection: collection.name(),
            source,
        })
    }

    /// Replace the full mapping for a collection atomically.
    pub async fn write_all(&self, collection: Collection, records: &RawRecords) -> StoreResult<()> {
        let path = self.collection_path(collection);
        let payload = serde_json::to_vec_pretty(records).map_err(|source| {
            StoreError::Persistence {
                collection: collection.name(),
                reason: format!("could not serialize records: {source}"),
            }
        })?;
        atomic_replace(&self.root, &path, &payload).await?;
        Ok(())
    }

    /// Write an immutable pre-migration snapshot of `records`.
    ///
    /// Named `backups/{collection}_premigration_{timestamp}.json`; existing
    /// backups are never overwritten — a same-second collision gets a numeric
    /// suffix instead. Returns the path written.
    pub async fn write_backup(
        &self,
        collection: Collection,
        records: &RawRecords,
        at: DateTime<Utc>,
    ) -> StoreResult<PathBuf> {
        let dir = self.backup_dir();
        let migration_err = |source| StoreError::Migration {
            collection: collection.name(),
            path: dir.clone(),
            source,
        };
        fs::create_dir_all(&dir).await.map_err(migration_err)?;

        let payload = serde_json::to_vec_pretty(records).map_err(|source| {
            StoreError::Persistence {
                collection: collection.name(),
                reason: format!("could not serialize backup: {source}"),
            }
        })?;

        let stamp = at.format("%Y%m%d_%H%M%S");
        let base = format!("{}_premigration_{stamp}", collection.name());
        for attempt in 0u32..100 {
            let candidate = if attempt == 0 {
                dir.join(format!("{base}.json"))
            } else {
                dir.join(format!("{base}-{attempt}.json"))
            };
            let mut open = fs::OpenOptions::new();
            open.write(true).create_new(true);
            match open.open(&candidate).await {
                Ok(mut file) => {
                    let write = async {
                        file.write_all(&payload).await?;
                        file.flush().await?;
                        file.sync_all().await
                    };
                    write.await.map_err(|source| StoreError::Migration {
                        collection: collection.name(),
                        path: candidate.clone(),
                        source,
                    })?;
                    return Ok(candidate);
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
                Err(source) => {
                    return Err(StoreError::Migration {
                        collection: collection.name(),
                        path: candidate,
                        source,
                    });
                }
            }
        }

        Err(StoreError::Migration {
            collection: collection.name(),
            path: dir,
            source: std::io::Error::new(ErrorKind::AlreadyExists, "backup name space exhausted"),
        })
    }

    /// List existing backup files for a collection, oldest first.
    pub async fn list_backups(&self, collection: Collection) -> StoreResult<Vec<PathBuf>> {
        let dir = self.backup_dir();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StoreError::Io(err)),
        };

        let prefix = format!("{}_premigration_", collection.name());
        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with(&prefix) && name.ends_with(".json") {
                found.push(entry.path());
            }
        }
        found.sort();
        Ok(found)
    }
}

/// Write `payload` to a temp file in `root` and rename it over `path`.
///
/// fsync before rename, so the rename never publishes a partially flushed
/// file. Renames on the same filesystem replace the target atomically.
async fn atomic_replace(root: &Path, path: &Path, payload: &[u8]) -> StoreResult<()> {
    fs::create_dir_all(root).await?;
    let tmp_path = root.join(format!(".tmp-{}", Uuid::new_v4()));
    let mut file = File::create(&tmp_path).await?;

    let write = async {
        file.write_all(payload).await?;
        file.flush().await?;
        file.sync_all().await
    };
    if let Err(err) = write.await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(StoreError::Io(err));
    }

    if let Err(err) = fs::rename(&tmp_path, path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(StoreError::Io(err));
    }
    Ok(())
}
