//! Error taxonomy for the persistence subsystem.
//!
//! The split matters for control flow: only `RemoteUnavailable` triggers the
//! coordinator's fallback to the local store. Everything else implies possible
//! data loss or corruption and is surfaced to the caller unchanged.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The remote backend timed out or could not be reached. Transient;
    /// absorbed by the coordinator, which degrades to the local store.
    #[error("remote store unavailable: {0}")]
    RemoteUnavailable(String),

    /// The remote backend answered, but with data we cannot interpret.
    /// Not fallback-worthy: the local mirror cannot be trusted to be fresher.
    #[error("remote store returned malformed data in `{collection}`: {reason}")]
    RemoteRecord {
        collection: &'static str,
        reason: String,
    },

    /// The local file for a collection exists but cannot be parsed.
    /// Fatal for that collection; we never guess at corrupted state.
    #[error("local store file for `{collection}` is corrupt: {source}")]
    CorruptStore {
        collection: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// A write was rejected by every backend that was supposed to take it.
    #[error("write to `{collection}` failed on all available backends: {reason}")]
    Persistence {
        collection: &'static str,
        reason: String,
    },

    /// The pre-migration backup could not be written. The migrating write is
    /// aborted and the original data left untouched.
    #[error("migration backup for `{collection}` could not be written to {path}: {source}")]
    Migration {
        collection: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from the typed record operations layered on top of the coordinator.
///
/// These are caller mistakes (invariant violations) rather than persistence
/// failures; genuine store errors pass through transparently.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("folder `{path}` already exists for `{owner}`")]
    FolderExists { owner: String, path: String },

    #[error("folder `{path}` not found for `{owner}`")]
    FolderNotFound { owner: String, path: String },

    #[error("parent folder `{parent}` does not exist")]
    ParentNotFound { parent: String },

    #[error("folder `{path}` still contains files or folders")]
    FolderNotEmpty { path: String },

    #[error("file `{stored_as}` already registered for `{owner}`")]
    DuplicateFile { owner: String, stored_as: String },

    #[error("file `{name}` not found for `{owner}`")]
    FileNotFound { owner: String, name: String },

    #[error("one-time code rejected for `{subject}`: {reason}")]
    OtpRejected { subject: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type CatalogResult<T> = Result<T, CatalogError>;
