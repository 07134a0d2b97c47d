//! Metadata for an encrypted file blob.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata record for one stored file, keyed in the `files` collection by
/// its storage-side reference (`stored_as`).
///
/// The content bytes themselves are opaque to this subsystem: the encryption
/// collaborator has already encrypted them before a record is created, and we
/// only keep the reference plus bookkeeping fields.
///
/// Invariants enforced by the catalog service:
/// - unique per `(owner, stored_as)`
/// - `owner` is immutable after creation
/// - `folder` names an existing folder path for that owner, or `/`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FileRecord {
    /// Identity of the owning user (email).
    pub owner: String,

    /// Display name the file was uploaded under.
    pub original_name: String,

    /// Reference to the encrypted blob in the storage collaborator.
    pub stored_as: String,

    /// Folder path the file lives in (`/` for the root).
    #[serde(default = "root_folder")]
    pub folder: String,

    /// When the file was uploaded.
    pub uploaded_at: DateTime<Utc>,

    /// Plaintext size in bytes.
    pub size: u64,

    /// Set when the file is moved to trash; cleared on restore.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

pub(crate) fn root_folder() -> String {
    "/".to_string()
}

impl FileRecord {
    pub fn is_trashed(&self) -> bool {
        self.deleted_at.is_some()
    }
}
