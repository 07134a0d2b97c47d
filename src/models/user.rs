//! User accounts. Authentication itself happens outside this subsystem; the
//! stored hash and reset fields are opaque strings we only persist.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered user, keyed in the `users` collection by email.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UserRecord {
    /// Email address, also the record key.
    pub email: String,

    /// Password hash produced by the auth collaborator.
    pub password_hash: String,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// Opaque reset token, present only while a reset is pending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_token: Option<String>,
}
