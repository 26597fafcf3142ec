//! Canonical contact records.
//!
//! A contact is the single authoritative record for a real-world customer or
//! vendor inside a scope. This subsystem creates contacts but never deletes
//! them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scope::{Scope, UserId};

/// Stable contact identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactId(Uuid);

impl ContactId {
    /// Creates a new random contact ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContactId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ContactId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// A canonical customer/vendor contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    /// Stable identifier.
    pub id: ContactId,
    /// Owning scope. `scope.company == None` marks a tenant-global contact.
    pub scope: Scope,
    /// Registered organization name.
    pub corporate_name: String,
    /// Person or display name.
    pub full_name: String,
    /// Who created the record, if known.
    pub created_by: Option<UserId>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last modified.
    pub updated_at: DateTime<Utc>,
}

impl Contact {
    /// Creates a contact whose corporate and full names are both `name` (trimmed).
    #[must_use]
    pub fn new(scope: Scope, name: &str) -> Self {
        let name = name.trim().to_string();
        let now = Utc::now();
        Self {
            id: ContactId::new(),
            scope,
            corporate_name: name.clone(),
            full_name: name,
            created_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the creating user.
    #[must_use]
    pub fn with_created_by(mut self, user: Option<UserId>) -> Self {
        self.created_by = user;
        self
    }

    /// The name shown to callers: corporate name, falling back to full name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.corporate_name.trim().is_empty() {
            &self.full_name
        } else {
            &self.corporate_name
        }
    }

    /// Distinct non-empty names this contact can be matched by.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        let corporate = Some(self.corporate_name.as_str()).filter(|s| !s.trim().is_empty());
        let full = Some(self.full_name.as_str())
            .filter(|s| !s.trim().is_empty() && *s != self.corporate_name);
        corporate.into_iter().chain(full)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> Scope {
        Scope::parse("t1", Some("c1")).unwrap()
    }

    #[test]
    fn new_contact_trims_and_duplicates_name() {
        let c = Contact::new(scope(), "  New Customer ");
        assert_eq!(c.corporate_name, "New Customer");
        assert_eq!(c.full_name, "New Customer");
        assert_eq!(c.created_at, c.updated_at);
        assert_eq!(c.names().count(), 1);
    }

    #[test]
    fn display_name_falls_back_to_full_name() {
        let mut c = Contact::new(scope(), "Jane Doe");
        c.corporate_name = String::new();
        assert_eq!(c.display_name(), "Jane Doe");
        assert_eq!(c.names().collect::<Vec<_>>(), vec!["Jane Doe"]);
    }

    #[test]
    fn names_yields_both_when_distinct() {
        let mut c = Contact::new(scope(), "Doe Holdings");
        c.full_name = "Jane Doe".to_string();
        assert_eq!(c.names().collect::<Vec<_>>(), vec!["Doe Holdings", "Jane Doe"]);
    }

    #[test]
    fn contact_serde_roundtrip_keeps_scope() {
        let c = Contact::new(scope(), "Acme").with_created_by(Some(UserId::new("u1").unwrap()));
        let json = serde_json::to_string(&c).unwrap();
        let back: Contact = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }
}
