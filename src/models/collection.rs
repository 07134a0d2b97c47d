//! The closed set of collections backing the storage application.

use std::fmt;

/// A named set of same-kind records. One JSON file locally, one MongoDB
/// collection remotely, always addressed by the same snake_case name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Users,
    Files,
    Folders,
    ActivityLog,
    AccessLog,
    Otp,
    Shares,
    SentAlerts,
}

impl Collection {
    pub const ALL: [Collection; 8] = [
        Collection::Users,
        Collection::Files,
        Collection::Folders,
        Collection::ActivityLog,
        Collection::AccessLog,
        Collection::Otp,
        Collection::Shares,
        Collection::SentAlerts,
    ];

    /// Stable on-disk / on-wire name of the collection.
    pub fn name(self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Files => "files",
            Collection::Folders => "folders",
            Collection::ActivityLog => "activity_log",
            Collection::AccessLog => "access_log",
            Collection::Otp => "otp",
            Collection::Shares => "shares",
            Collection::SentAlerts => "sent_alerts",
        }
    }

    pub fn from_name(name: &str) -> Option<Collection> {
        Collection::ALL.into_iter().find(|c| c.name() == name)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
