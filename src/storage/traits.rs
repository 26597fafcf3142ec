//! Abstract storage traits for contact resolution.
//!
//! These traits define the contract that storage backends must implement.
//! The engine only ever talks to these traits, so any backend (in-memory,
//! embedded durable, or an adapter over an external database) can be injected.
//!
//! Stores match exact scope slots. Visibility rules (such as a company scope
//! also seeing tenant-global records) are decided by the engine.

use chrono::Utc;
use thiserror::Error;

use crate::alias::{AliasKey, CustomerAlias};
use crate::contact::{Contact, ContactId};
use crate::scope::Scope;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Alias row not found for an update.
    #[error("Alias not found: {0}")]
    AliasNotFound(AliasKey),

    /// Unique-key conflict on the alias index.
    #[error("Duplicate alias {key} (already mapped to contact {existing})")]
    DuplicateAlias {
        /// The conflicting key.
        key: AliasKey,
        /// Contact the existing row points at.
        existing: ContactId,
    },

    /// Primary-key conflict.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// The store contradicts itself (e.g. a conflict with no winning row).
    #[error("Store inconsistency: {0}")]
    Inconsistent(String),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),

    /// Connection failed.
    #[error("Connection error: {0}")]
    ConnectionError(String),
}

/// What an alias upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new row was inserted.
    Inserted,
    /// An existing row was changed in place.
    Updated,
    /// An existing row already held these values.
    Unchanged,
}

/// Storage trait for canonical contacts.
pub trait ContactStore: Send + Sync {
    /// Insert a new contact. Returns error if the ID already exists.
    fn insert(&self, contact: Contact) -> Result<(), StorageError>;

    /// Get a contact by ID.
    fn get(&self, id: ContactId) -> Result<Option<Contact>, StorageError>;

    /// All contacts stored in exactly this scope slot.
    fn find_in_scope(&self, scope: &Scope) -> Result<Vec<Contact>, StorageError>;
}

/// Storage trait for learned aliases.
///
/// # Uniqueness
/// Implementations must enforce at most one row per [`AliasKey`] atomically:
/// of two concurrent `insert` calls for the same key exactly one succeeds and
/// the other receives [`StorageError::DuplicateAlias`].
pub trait AliasStore: Send + Sync {
    /// All aliases stored in exactly this scope slot.
    fn find_in_scope(&self, scope: &Scope) -> Result<Vec<CustomerAlias>, StorageError>;

    /// Look up the row for a key.
    fn find_by_key(&self, key: &AliasKey) -> Result<Option<CustomerAlias>, StorageError>;

    /// Insert a new row. Fails with `DuplicateAlias` if the key exists.
    fn insert(&self, alias: CustomerAlias) -> Result<(), StorageError>;

    /// Replace the row with the same key. Fails with `AliasNotFound` if absent.
    fn update(&self, alias: CustomerAlias) -> Result<(), StorageError>;

    /// Update-if-exists, else insert.
    ///
    /// An existing row keeps its ID, raw name and creation metadata; only the
    /// contact reference, confidence and `updated_at` change. If a concurrent
    /// writer wins the insert, this falls back to updating the winner's row.
    ///
    /// # Errors
    /// Propagates backend failures. Reports `Inconsistent` if the key both
    /// conflicts on insert and is missing on re-read more than once.
    fn upsert(&self, alias: CustomerAlias) -> Result<UpsertOutcome, StorageError> {
        let key = alias.key();
        for _ in 0..2 {
            if let Some(existing) = self.find_by_key(&key)? {
                if existing.same_mapping(alias.contact_id, alias.confidence) {
                    return Ok(UpsertOutcome::Unchanged);
                }
                let updated = CustomerAlias {
                    contact_id: alias.contact_id,
                    confidence: alias.confidence,
                    updated_at: Utc::now(),
                    ..existing
                };
                match self.update(updated) {
                    Ok(()) => return Ok(UpsertOutcome::Updated),
                    Err(StorageError::AliasNotFound(_)) => continue,
                    Err(e) => return Err(e),
                }
            }

            match self.insert(alias.clone()) {
                Ok(()) => return Ok(UpsertOutcome::Inserted),
                // Lost the insert race: loop and update the winner's row.
                Err(StorageError::DuplicateAlias { .. }) => continue,
                Err(e) => return Err(e),
            }
        }

        Err(StorageError::Inconsistent(format!(
            "alias {key} kept changing during upsert"
        )))
    }
}

/// Both adapters plus the atomic create-contact-and-learn-alias unit of work.
pub trait ContactDirectory: Send + Sync {
    /// Contact adapter.
    fn contacts(&self) -> &dyn ContactStore;

    /// Alias adapter.
    fn aliases(&self) -> &dyn AliasStore;

    /// Insert `contact` and `alias` together, or neither.
    ///
    /// # Errors
    /// - `DuplicateAlias` if the alias key already exists; nothing is written.
    /// - `DuplicateKey` if the contact ID already exists; nothing is written.
    fn provision(&self, contact: Contact, alias: CustomerAlias) -> Result<(), StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time test: ensure traits are object-safe
    fn _assert_contact_store_object_safe(_: &dyn ContactStore) {}
    fn _assert_alias_store_object_safe(_: &dyn AliasStore) {}
    fn _assert_directory_object_safe(_: &dyn ContactDirectory) {}

    #[test]
    fn test_storage_error_display() {
        let key = AliasKey::new(Scope::parse("t1", None).unwrap(), "Acme");
        let err = StorageError::AliasNotFound(key.clone());
        assert!(err.to_string().contains("Alias not found"));

        let err = StorageError::DuplicateAlias {
            key,
            existing: ContactId::new(),
        };
        assert!(err.to_string().contains("t1/*:acme"));
    }
}
