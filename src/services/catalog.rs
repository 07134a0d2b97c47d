//! Typed record operations on top of the coordinator.
//!
//! The request layer hands this service already-validated identities and
//! parameters; what it enforces are the structural invariants of the data
//! model: folder paths unique per owner, parents that exist, no deleting
//! folders with children, no duplicate file registrations, single-use
//! one-time codes that are destroyed rather than flagged.
//!
//! Every mutation goes through `Coordinator::update`, so the read-check-write
//! sequence holds the collection lock for its full duration. Checks that span
//! two collections (folder deletion looking at files) read the second
//! collection outside the lock — the subsystem offers no cross-collection
//! transaction, and the spec's callers accept that.

use crate::errors::{CatalogError, CatalogResult, StoreError, StoreResult};
use crate::models::{
    Collection, FileRecord, FolderRecord, LogEntry, OtpRecord, ShareRecord, UserRecord,
    share::ShareAccess,
};
use crate::store::Coordinator;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Days a trashed file survives before the sweep removes it for good.
const TRASH_RETENTION_DAYS: i64 = 30;

pub struct CatalogService {
    store: Arc<Coordinator>,
}

impl CatalogService {
    pub fn new(store: Arc<Coordinator>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<Coordinator> {
        &self.store
    }

    // ---- activity ----------------------------------------------------------

    /// Append an entry to the activity log; file-touching entries are also
    /// appended to the access log. Entries are keyed so that mapping order is
    /// insertion order.
    pub async fn record_activity(&self, entry: LogEntry) -> StoreResult<()> {
        let key = log_key(entry.timestamp);
        let value = encode(Collection::ActivityLog, &entry)?;
        self.store
            .update(Collection::ActivityLog, {
                let key = key.clone();
                let value = value.clone();
                move |records| {
                    records.insert(key, value);
                }
            })
            .await?;

        if entry.file.is_some() {
            self.store
                .update(Collection::AccessLog, move |records| {
                    records.insert(key, value);
                })
                .await?;
        }
        Ok(())
    }

    // ---- folders -----------------------------------------------------------

    pub async fn create_folder(&self, owner: &str, path: &str) -> CatalogResult<FolderRecord> {
        let path = normalize_path(path);
        let record = FolderRecord::new(owner, &path, Utc::now());
        let parent = record.parent.clone();
        let key = record.id.clone();
        let value = encode(Collection::Folders, &record)?;

        let owner = owner.to_string();
        let created = self
            .store
            .update(Collection::Folders, move |records| {
                if records.contains_key(&key) {
                    return Err(CatalogError::FolderExists { owner, path });
                }
                if parent != "/" && !records.contains_key(&FolderRecord::key_for(&owner, &parent)) {
                    return Err(CatalogError::ParentNotFound { parent });
                }
                records.insert(key, value);
                Ok(record)
            })
            .await??;
        info!(owner = %created.owner, path = %created.path, "folder created");
        Ok(created)
    }

    pub async fn list_folders(&self, owner: &str) -> StoreResult<Vec<FolderRecord>> {
        let records = self.store.read(Collection::Folders).await?;
        let mut folders: Vec<FolderRecord> = records
            .into_values()
            .filter_map(|value| serde_json::from_value::<FolderRecord>(value).ok())
            .filter(|folder| folder.owner == owner)
            .collect();
        folders.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(folders)
    }

    /// Change a folder's display name. The path (and therefore the key and
    /// any referencing file records) is unaffected.
    pub async fn rename_folder(
        &self,
        owner: &str,
        path: &str,
        new_name: &str,
    ) -> CatalogResult<FolderRecord> {
        let path = normalize_path(path);
        let key = FolderRecord::key_for(owner, &path);
        let owner = owner.to_string();
        let new_name = new_name.to_string();
        self.store
            .update(Collection::Folders, move |records| {
                let Some(value) = records.get(&key) else {
                    return Err(CatalogError::FolderNotFound { owner, path });
                };
                let mut folder: FolderRecord = serde_json::from_value(value.clone())
                    .map_err(|_| CatalogError::FolderNotFound { owner, path })?;
                folder.name = new_name;
                let value = encode(Collection::Folders, &folder)?;
                records.insert(key, value);
                Ok(folder)
            })
            .await?
    }

    /// Delete a folder. Refused while any file or child folder still
    /// references its path.
    pub async fn delete_folder(&self, owner: &str, path: &str) -> CatalogResult<()> {
        let path = normalize_path(path);

        let files = self.store.read(Collection::Files).await?;
        let has_files = files.into_values().any(|value| {
            serde_json::from_value::<FileRecord>(value)
                .is_ok_and(|f| f.owner == owner && f.folder == path)
        });
        if has_files {
            return Err(CatalogError::FolderNotEmpty { path });
        }

        let key = FolderRecord::key_for(owner, &path);
        let owner = owner.to_string();
        self.store
            .update(Collection::Folders, move |records| {
                let child_exists = records.values().any(|value| {
                    serde_json::from_value::<FolderRecord>(value.clone())
                        .is_ok_and(|f| f.owner == owner && f.parent == path)
                });
                if child_exists {
                    return Err(CatalogError::FolderNotEmpty { path });
                }
                if records.remove(&key).is_none() {
                    return Err(CatalogError::FolderNotFound { owner, path });
                }
                Ok(())
            })
            .await?
    }

    // ---- files -------------------------------------------------------------

    /// Register metadata for an already-encrypted blob. The storage
    /// reference must be unused by any owner and the target folder must
    /// exist.
    pub async fn register_file(&self, record: FileRecord) -> CatalogResult<FileRecord> {
        if record.folder != "/" {
            let folders = self.store.read(Collection::Folders).await?;
            let folder_key = FolderRecord::key_for(&record.owner, &record.folder);
            if !folders.contains_key(&folder_key) {
                return Err(CatalogError::FolderNotFound {
                    owner: record.owner,
                    path: record.folder,
                });
            }
        }

        let key = record.stored_as.clone();
        let value = encode(Collection::Files, &record)?;
        let created = self
            .store
            .update(Collection::Files, move |records| {
                // The storage reference is the whole record key; a collision
                // under any owner is refused, never overwritten.
                if let Some(existing) = records.get(&key) {
                    let holder = serde_json::from_value::<FileRecord>(existing.clone())
                        .map(|f| f.owner)
                        .unwrap_or_else(|_| record.owner.clone());
                    return Err(CatalogError::DuplicateFile {
                        owner: holder,
                        stored_as: record.stored_as,
                    });
                }
                records.insert(key, value);
                Ok(record)
            })
            .await??;
        debug!(owner = %created.owner, stored_as = %created.stored_as, "file registered");
        Ok(created)
    }

    pub async fn list_files(
        &self,
        owner: &str,
        folder: Option<&str>,
        include_trashed: bool,
    ) -> StoreResult<Vec<FileRecord>> {
        let records = self.store.read(Collection::Files).await?;
        let mut files: Vec<FileRecord> = records
            .into_values()
            .filter_map(|value| serde_json::from_value::<FileRecord>(value).ok())
            .filter(|f| f.owner == owner)
            .filter(|f| include_trashed || !f.is_trashed())
            .filter(|f| folder.is_none_or(|path| f.folder == path))
            .collect();
        files.sort_by(|a, b| a.original_name.cmp(&b.original_name));
        Ok(files)
    }

    /// Move a file to another folder. The owner never changes.
    pub async fn move_file(
        &self,
        owner: &str,
        stored_as: &str,
        dest_folder: &str,
    ) -> CatalogResult<FileRecord> {
        let dest = normalize_path(dest_folder);
        if dest != "/" {
            let folders = self.store.read(Collection::Folders).await?;
            if !folders.contains_key(&FolderRecord::key_for(owner, &dest)) {
                return Err(CatalogError::FolderNotFound {
                    owner: owner.to_string(),
                    path: dest,
                });
            }
        }
        self.mutate_file(owner, stored_as, move |file| {
            file.folder = dest;
        })
        .await
    }

    /// Soft-delete: stamp `deleted_at` so the file shows up in trash.
    pub async fn trash_file(&self, owner: &str, stored_as: &str) -> CatalogResult<FileRecord> {
        let now = Utc::now();
        self.mutate_file(owner, stored_as, move |file| {
            file.deleted_at = Some(now);
        })
        .await
    }

    pub async fn restore_file(&self, owner: &str, stored_as: &str) -> CatalogResult<FileRecord> {
        self.mutate_file(owner, stored_as, |file| {
            file.deleted_at = None;
        })
        .await
    }

    /// Remove the metadata record entirely. The blob itself belongs to the
    /// storage collaborator.
    pub async fn purge_file(&self, owner: &str, stored_as: &str) -> CatalogResult<()> {
        let owner = owner.to_string();
        let stored_as = stored_as.to_string();
        self.store
            .update(Collection::Files, move |records| {
                let owned = records.get(&stored_as).is_some_and(|value| {
                    serde_json::from_value::<FileRecord>(value.clone())
                        .is_ok_and(|f| f.owner == owner)
                });
                if !owned {
                    return Err(CatalogError::FileNotFound {
                        owner,
                        name: stored_as,
                    });
                }
                records.remove(&stored_as);
                Ok(())
            })
            .await?
    }

    /// Permanently drop trashed files older than the retention window.
    /// Returns how many records were removed.
    pub async fn sweep_trash(&self) -> StoreResult<usize> {
        let cutoff = Utc::now() - Duration::days(TRASH_RETENTION_DAYS);
        let removed = self
            .store
            .update(Collection::Files, move |records| {
                let expired: Vec<String> = records
                    .iter()
                    .filter(|(_, value)| {
                        serde_json::from_value::<FileRecord>((*value).clone())
                            .ok()
                            .and_then(|f| f.deleted_at)
                            .is_some_and(|deleted_at| deleted_at < cutoff)
                    })
                    .map(|(key, _)| key.clone())
                    .collect();
                for key in &expired {
                    records.remove(key);
                }
                expired.len()
            })
            .await?;
        if removed > 0 {
            info!(removed, "swept expired trash records");
        }
        Ok(removed)
    }

    async fn mutate_file<F>(
        &self,
        owner: &str,
        stored_as: &str,
        f: F,
    ) -> CatalogResult<FileRecord>
    where
        F: FnOnce(&mut FileRecord) + Send,
    {
        let owner = owner.to_string();
        let stored_as = stored_as.to_string();
        self.store
            .update(Collection::Files, move |records| {
                let not_found = || CatalogError::FileNotFound {
                    owner: owner.clone(),
                    name: stored_as.clone(),
                };
                let value = records.get(&stored_as).ok_or_else(not_found)?;
                let mut file: FileRecord =
                    serde_json::from_value(value.clone()).map_err(|_| not_found())?;
                if file.owner != owner {
                    return Err(not_found());
                }
                f(&mut file);
                let value = encode(Collection::Files, &file)?;
                records.insert(stored_as.clone(), value);
                Ok(file)
            })
            .await?
    }

    // ---- shares ------------------------------------------------------------

    pub async fn create_share(
        &self,
        owner: &str,
        stored_as: &str,
        receivers: Vec<String>,
        secret_hash: &str,
    ) -> CatalogResult<ShareRecord> {
        let files = self.store.read(Collection::Files).await?;
        let owned = files.get(stored_as).is_some_and(|value| {
            serde_json::from_value::<FileRecord>(value.clone()).is_ok_and(|f| f.owner == owner)
        });
        if !owned {
            return Err(CatalogError::FileNotFound {
                owner: owner.to_string(),
                name: stored_as.to_string(),
            });
        }

        let share = ShareRecord {
            token: Uuid::new_v4().to_string(),
            stored_as: stored_as.to_string(),
            owner: owner.to_string(),
            receivers,
            secret_hash: secret_hash.to_string(),
            created_at: Utc::now(),
            accesses: Vec::new(),
        };
        let key = share.token.clone();
        let value = encode(Collection::Shares, &share)?;
        self.store
            .update(Collection::Shares, move |records| {
                records.insert(key, value);
            })
            .await?;
        info!(owner, stored_as, token = %share.token, "share created");
        Ok(share)
    }

    pub async fn get_share(&self, token: &str) -> StoreResult<Option<ShareRecord>> {
        let records = self.store.read(Collection::Shares).await?;
        Ok(records
            .get(token)
            .and_then(|value| serde_json::from_value(value.clone()).ok()))
    }

    /// Append one access to a share's own access log.
    pub async fn record_share_access(
        &self,
        token: &str,
        origin: Option<&str>,
    ) -> CatalogResult<ShareRecord> {
        let token = token.to_string();
        let access = ShareAccess {
            at: Utc::now(),
            origin: origin.map(str::to_string),
        };
        self.store
            .update(Collection::Shares, move |records| {
                let not_found = || CatalogError::FileNotFound {
                    owner: String::new(),
                    name: token.clone(),
                };
                let value = records.get(&token).ok_or_else(not_found)?;
                let mut share: ShareRecord =
                    serde_json::from_value(value.clone()).map_err(|_| not_found())?;
                share.accesses.push(access);
                let value = encode(Collection::Shares, &share)?;
                records.insert(token.clone(), value);
                Ok(share)
            })
            .await?
    }

    // ---- one-time codes ----------------------------------------------------

    /// Issue a code for a subject, replacing any pending one. Expired codes
    /// for other subjects are swept opportunistically while the lock is held.
    pub async fn issue_otp(
        &self,
        subject: &str,
        code: &str,
        expiry_secs: u32,
    ) -> StoreResult<OtpRecord> {
        let now = Utc::now();
        let record = OtpRecord {
            subject: subject.to_string(),
            code: code.to_string(),
            created_at: now,
            expiry_secs,
            single_use: true,
        };
        let key = record.subject.clone();
        let value = encode(Collection::Otp, &record)?;
        self.store
            .update(Collection::Otp, move |records| {
                sweep_expired_codes(records, now);
                records.insert(key, value);
            })
            .await?;
        Ok(record)
    }

    /// Verify and consume a code. The record is removed on success — codes
    /// are single-use by destruction, not by flagging.
    pub async fn verify_otp(&self, subject: &str, code: &str) -> CatalogResult<()> {
        let now = Utc::now();
        let subject = subject.to_string();
        let code = code.to_string();
        self.store
            .update(Collection::Otp, move |records| {
                let rejected = |reason: &str| CatalogError::OtpRejected {
                    subject: subject.clone(),
                    reason: reason.to_string(),
                };
                let value = records.get(&subject).ok_or_else(|| rejected("no pending code"))?;
                let record: OtpRecord = serde_json::from_value(value.clone())
                    .map_err(|_| rejected("unreadable record"))?;
                if record.is_expired(now) {
                    records.remove(&subject);
                    return Err(rejected("code expired"));
                }
                if record.code.trim() != code.trim() {
                    return Err(rejected("code mismatch"));
                }
                records.remove(&subject);
                Ok(())
            })
            .await?
    }

    /// Drop every expired code. Returns how many were removed.
    pub async fn sweep_otps(&self) -> StoreResult<usize> {
        let now = Utc::now();
        self.store
            .update(Collection::Otp, move |records| {
                sweep_expired_codes(records, now)
            })
            .await
    }

    // ---- users -------------------------------------------------------------

    pub async fn put_user(&self, user: UserRecord) -> StoreResult<()> {
        let key = user.email.clone();
        let value = encode(Collection::Users, &user)?;
        self.store
            .update(Collection::Users, move |records| {
                records.insert(key, value);
            })
            .await
    }

    pub async fn get_user(&self, email: &str) -> StoreResult<Option<UserRecord>> {
        let records = self.store.read(Collection::Users).await?;
        Ok(records
            .get(email)
            .and_then(|value| serde_json::from_value(value.clone()).ok()))
    }
}

fn sweep_expired_codes(
    records: &mut crate::models::RawRecords,
    now: DateTime<Utc>,
) -> usize {
    let expired: Vec<String> = records
        .iter()
        .filter(|(_, value)| {
            serde_json::from_value::<OtpRecord>((*value).clone())
                .map(|r| r.is_expired(now))
                // Unreadable code records can never verify; drop them too.
                .unwrap_or(true)
        })
        .map(|(key, _)| key.clone())
        .collect();
    for key in &expired {
        records.remove(key);
    }
    expired.len()
}

/// Log keys sort by insertion time: millisecond timestamp, zero-padded, plus
/// a short random suffix for uniqueness within a millisecond.
fn log_key(at: DateTime<Utc>) -> String {
    let millis = at.timestamp_millis().max(0);
    format!("{millis:015}-{}", &Uuid::new_v4().simple().to_string()[..8])
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn encode<T: Serialize>(collection: Collection, record: &T) -> StoreResult<Value> {
    serde_json::to_value(record).map_err(|err| StoreError::Persistence {
        collection: collection.name(),
        reason: format!("could not serialize record: {err}"),
    })
}
