//! A builder for creating `ContactData` instances in tests.

use crate::models::ContactData;

/// A builder for creating `ContactData` instances in tests.
pub struct ContactBuilder {
    contact: ContactData,
}

impl ContactBuilder {
    /// Creates a new webhook contact with the given id owned by `user`.
    pub fn new(id: &str) -> Self {
        Self {
            contact: ContactData {
                id: id.to_string(),
                user: "user".to_string(),
                contact_type: "webhook".to_string(),
                value: String::new(),
            },
        }
    }

    /// Sets the owning user.
    pub fn user(mut self, user: &str) -> Self {
        self.contact.user = user.to_string();
        self
    }

    /// Sets the contact type.
    pub fn contact_type(mut self, contact_type: &str) -> Self {
        self.contact.contact_type = contact_type.to_string();
        self
    }

    /// Sets the destination value.
    pub fn value(mut self, value: &str) -> Self {
        self.contact.value = value.to_string();
        self
    }

    /// Builds the `ContactData`.
    pub fn build(self) -> ContactData {
        self.contact
    }
}
