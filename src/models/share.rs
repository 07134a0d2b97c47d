//! Share records for files sent to other users.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A file share, keyed in the `shares` collection by its access token.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ShareRecord {
    /// Opaque token the recipient presents to access the share.
    pub token: String,

    /// Storage reference of the shared file.
    pub stored_as: String,

    /// Identity of the sharing user.
    pub owner: String,

    /// Recipient identities the share was addressed to.
    pub receivers: Vec<String>,

    /// Hash of the access secret sent out of band. Opaque here; the auth
    /// collaborator produces and checks it.
    pub secret_hash: String,

    /// When the share was created.
    pub created_at: DateTime<Utc>,

    /// Per-share access log: one timestamped entry per successful access.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accesses: Vec<ShareAccess>,
}

/// One recorded access to a share.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ShareAccess {
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}
