//! Record types for every collection the subsystem persists.
//!
//! Each collection has exactly one canonical shape, defined here as a serde
//! struct. Below the codec everything is an untyped mapping; these types are
//! how the rest of the crate avoids stringly-typed field access.

pub mod alert;
pub mod collection;
pub mod file;
pub mod folder;
pub mod log_entry;
pub mod otp;
pub mod share;
pub mod user;

pub use alert::AlertRecord;
pub use collection::Collection;
pub use file::FileRecord;
pub use folder::FolderRecord;
pub use log_entry::{ActionKind, LogEntry};
pub use otp::OtpRecord;
pub use share::ShareRecord;
pub use user::UserRecord;

use serde_json::Value;
use std::collections::BTreeMap;

/// The raw per-collection mapping the stores read and write: record key to
/// whatever JSON value is on disk or on the wire. Only the codec interprets
/// non-canonical values.
pub type RawRecords = BTreeMap<String, Value>;
