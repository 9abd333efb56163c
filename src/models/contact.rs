//! This module defines the contact data structure.

use serde::{Deserialize, Serialize};

/// A named delivery destination of a specific channel type, owned by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ContactData {
    /// Unique identifier of the contact.
    pub id: String,

    /// Login of the user owning the contact.
    pub user: String,

    /// Contact type; selects the sender that delivers to this contact.
    #[serde(rename = "type")]
    pub contact_type: String,

    /// Destination value (mail address, webhook URL, ...).
    pub value: String,
}
