//! One-time codes.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A pending one-time code, keyed in the `otp` collection by subject email.
///
/// Lifecycle: created on issuance, removed (not merely flagged) on the first
/// successful verification or by the expiry sweep.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OtpRecord {
    /// Identity the code was issued to.
    pub subject: String,

    /// The code itself, compared verbatim.
    pub code: String,

    /// When the code was issued.
    pub created_at: DateTime<Utc>,

    /// Seconds the code stays valid after issuance.
    pub expiry_secs: u32,

    /// Single-use marker. Always true today; kept explicit so a future
    /// multi-use code does not silently change verification semantics.
    pub single_use: bool,
}

impl OtpRecord {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + Duration::seconds(i64::from(self.expiry_secs))
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }
}
