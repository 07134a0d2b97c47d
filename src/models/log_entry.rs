//! Activity and access log entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The action kinds an audit entry can record.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Upload,
    Download,
    Delete,
    Share,
    Login,
    Logout,
    FailedLogin,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Upload => "upload",
            ActionKind::Download => "download",
            ActionKind::Delete => "delete",
            ActionKind::Share => "share",
            ActionKind::Login => "login",
            ActionKind::Logout => "logout",
            ActionKind::FailedLogin => "failed_login",
        }
    }

    pub fn parse(s: &str) -> Option<ActionKind> {
        match s {
            "upload" => Some(ActionKind::Upload),
            "download" => Some(ActionKind::Download),
            "delete" => Some(ActionKind::Delete),
            "share" => Some(ActionKind::Share),
            "login" => Some(ActionKind::Login),
            "logout" => Some(ActionKind::Logout),
            "failed_login" => Some(ActionKind::FailedLogin),
            _ => None,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only entry in `activity_log` or `access_log`, keyed by a
/// synthetic millisecond-prefixed key so mapping order follows insertion
/// order. Entries are never mutated or deleted once written (retention is
/// future work).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LogEntry {
    /// Actor identity (email).
    pub user: String,

    /// What happened.
    pub action: ActionKind,

    /// File the action touched, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// When it happened.
    pub timestamp: DateTime<Utc>,

    /// Lowercased file extension tag, derived from `file` at append time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,

    /// Receiver identities for share actions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub receivers: Vec<String>,

    /// Client origin (address or user agent), when the request layer passed one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl LogEntry {
    pub fn new(user: &str, action: ActionKind, timestamp: DateTime<Utc>) -> Self {
        LogEntry {
            user: user.to_string(),
            action,
            file: None,
            timestamp,
            file_type: None,
            receivers: Vec::new(),
            origin: None,
        }
    }

    /// Attach a file name and derive its extension tag.
    pub fn with_file(mut self, file: &str) -> Self {
        self.file_type = extension_tag(file);
        self.file = Some(file.to_string());
        self
    }

    pub fn with_receivers(mut self, receivers: Vec<String>) -> Self {
        self.receivers = receivers;
        self
    }

    pub fn with_origin(mut self, origin: &str) -> Self {
        self.origin = Some(origin.to_string());
        self
    }
}

/// Lowercased extension of a file name, `None` when there is no dot.
pub fn extension_tag(file: &str) -> Option<String> {
    let (_, ext) = file.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
