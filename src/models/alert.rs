//! Alerts produced by the anomaly detector.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// An anomaly alert, keyed in `sent_alerts` by `user:kind`.
///
/// Delivery (email etc.) is entirely external; "alert exists but was never
/// delivered" is a normal state.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AlertRecord {
    /// Identity the alert is about.
    pub user: String,

    /// Alert kind, e.g. `failed_logins` or `model_outlier`. One alert per
    /// kind per user within the cooldown window.
    pub kind: String,

    /// Human-readable cause.
    pub message: String,

    /// When the alert was raised.
    pub created_at: DateTime<Utc>,

    /// Hours during which another alert of the same kind is suppressed.
    pub cooldown_hours: u32,
}

impl AlertRecord {
    pub fn key_for(user: &str, kind: &str) -> String {
        format!("{user}:{kind}")
    }

    /// Whether this alert still suppresses a duplicate at `now`.
    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        now < self.created_at + Duration::hours(i64::from(self.cooldown_hours))
    }
}
