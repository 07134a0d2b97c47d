//! Folder records — the one collection with a known legacy shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A folder in a user's tree, keyed by the composite `owner:path`.
///
/// Historically the `folders` collection stored a bare list of names per
/// owner; the codec expands that legacy shape into these records.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FolderRecord {
    /// Composite identifier, `owner:path`.
    pub id: String,

    /// Display name (final path segment).
    pub name: String,

    /// Full path, always starting with `/`. Unique per owner.
    pub path: String,

    /// Path of the parent folder; `/` for top-level folders.
    pub parent: String,

    /// Identity of the owning user (email).
    pub owner: String,

    /// When the folder was created. Synthesized during migration when the
    /// legacy shape carried no timestamp.
    pub created_at: DateTime<Utc>,
}

impl FolderRecord {
    /// Build the composite key used in the `folders` collection.
    pub fn key_for(owner: &str, path: &str) -> String {
        format!("{owner}:{path}")
    }

    pub fn new(owner: &str, path: &str, created_at: DateTime<Utc>) -> Self {
        let name = path.rsplit('/').next().unwrap_or_default().to_string();
        let parent = match path.rfind('/') {
            Some(0) | None => "/".to_string(),
            Some(idx) => path[..idx].to_string(),
        };
        FolderRecord {
            id: Self::key_for(owner, path),
            name,
            path: path.to_string(),
            parent,
            owner: owner.to_string(),
            created_at,
        }
    }
}
