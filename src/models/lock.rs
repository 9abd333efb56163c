//! This module defines the trigger check lock records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A lease held by a checker on a trigger.
///
/// A lock whose `expires_at` has passed is logically absent and may be taken
/// over by anyone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerCheckLock {
    /// The locked trigger.
    pub trigger_id: String,
    /// Token identifying the current owner.
    pub owner_token: String,
    /// End of the lease.
    pub expires_at: DateTime<Utc>,
}

impl TriggerCheckLock {
    /// Returns true if the lease is still valid at `now`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// The caller's handle on an acquired lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    /// The locked trigger.
    pub trigger_id: String,
    /// Token proving ownership; required to renew or release.
    pub owner_token: String,
    /// End of the lease as of the last acquire or renew.
    pub expires_at: DateTime<Utc>,
}
