//! In-memory storage backend.
//!
//! Thread-safe in-memory implementation of the storage traits. Contacts and
//! aliases live under one lock so `provision` is a single atomic step. It is
//! intended for embedded usage, tests, and as a reference implementation.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use crate::alias::{AliasKey, CustomerAlias};
use crate::contact::{Contact, ContactId};
use crate::normalize::NormalizedName;
use crate::scope::Scope;
use crate::storage::traits::{AliasStore, ContactDirectory, ContactStore, StorageError};

pub(crate) fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

/// Indexed contact and alias tables.
///
/// Shared by every backend: `check_*` validates a mutation without touching
/// state, `apply_*` performs it. Durable backends log between the two.
#[derive(Debug, Default)]
pub(crate) struct DirectoryState {
    contacts: HashMap<ContactId, Contact>,
    contacts_by_scope: HashMap<Scope, BTreeSet<ContactId>>,
    aliases: HashMap<AliasKey, CustomerAlias>,
    aliases_by_scope: HashMap<Scope, BTreeSet<NormalizedName>>,
}

impl DirectoryState {
    pub(crate) fn contact(&self, id: ContactId) -> Option<&Contact> {
        self.contacts.get(&id)
    }

    pub(crate) fn contacts_in(&self, scope: &Scope) -> Vec<Contact> {
        let Some(ids) = self.contacts_by_scope.get(scope) else {
            return Vec::new();
        };
        let mut out: Vec<Contact> = ids
            .iter()
            .filter_map(|id| self.contacts.get(id).cloned())
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        out
    }

    pub(crate) fn alias(&self, key: &AliasKey) -> Option<&CustomerAlias> {
        self.aliases.get(key)
    }

    pub(crate) fn aliases_in(&self, scope: &Scope) -> Vec<CustomerAlias> {
        let Some(names) = self.aliases_by_scope.get(scope) else {
            return Vec::new();
        };
        names
            .iter()
            .filter_map(|name| {
                self.aliases
                    .get(&AliasKey::from_normalized(scope.clone(), name.clone()))
                    .cloned()
            })
            .collect()
    }

    pub(crate) fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    pub(crate) fn alias_count(&self) -> usize {
        self.aliases.len()
    }

    pub(crate) fn check_contact_insert(&self, contact: &Contact) -> Result<(), StorageError> {
        if self.contacts.contains_key(&contact.id) {
            return Err(StorageError::DuplicateKey(contact.id.to_string()));
        }
        Ok(())
    }

    pub(crate) fn check_alias_insert(&self, alias: &CustomerAlias) -> Result<(), StorageError> {
        let key = alias.key();
        if let Some(existing) = self.aliases.get(&key) {
            return Err(StorageError::DuplicateAlias {
                key,
                existing: existing.contact_id,
            });
        }
        Ok(())
    }

    pub(crate) fn check_alias_update(&self, alias: &CustomerAlias) -> Result<(), StorageError> {
        let key = alias.key();
        if !self.aliases.contains_key(&key) {
            return Err(StorageError::AliasNotFound(key));
        }
        Ok(())
    }

    pub(crate) fn check_provision(
        &self,
        contact: &Contact,
        alias: &CustomerAlias,
    ) -> Result<(), StorageError> {
        self.check_alias_insert(alias)?;
        self.check_contact_insert(contact)
    }

    pub(crate) fn apply_contact_insert(&mut self, contact: Contact) {
        self.contacts_by_scope
            .entry(contact.scope.clone())
            .or_default()
            .insert(contact.id);
        self.contacts.insert(contact.id, contact);
    }

    pub(crate) fn apply_alias_upsert(&mut self, alias: CustomerAlias) {
        self.aliases_by_scope
            .entry(alias.scope.clone())
            .or_default()
            .insert(alias.normalized_name.clone());
        self.aliases.insert(alias.key(), alias);
    }

    pub(crate) fn apply_provision(&mut self, contact: Contact, alias: CustomerAlias) {
        self.apply_contact_insert(contact);
        self.apply_alias_upsert(alias);
    }

    pub(crate) fn all_contacts(&self) -> impl Iterator<Item = &Contact> {
        self.contacts.values()
    }

    pub(crate) fn all_aliases(&self) -> impl Iterator<Item = &CustomerAlias> {
        self.aliases.values()
    }

    /// Rebuild state and indexes from loaded records.
    pub(crate) fn from_records(
        contacts: impl IntoIterator<Item = Contact>,
        aliases: impl IntoIterator<Item = CustomerAlias>,
    ) -> Self {
        let mut state = Self::default();
        for contact in contacts {
            state.apply_contact_insert(contact);
        }
        for alias in aliases {
            state.apply_alias_upsert(alias);
        }
        state
    }
}

/// Thread-safe in-memory contact directory.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    state: RwLock<DirectoryState>,
}

impl InMemoryDirectory {
    /// Create a new empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored contacts.
    ///
    /// # Errors
    /// Returns `BackendError` if the lock is poisoned.
    pub fn contact_count(&self) -> Result<usize, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("directory.contact_count"))?;
        Ok(state.contact_count())
    }

    /// Number of stored aliases.
    ///
    /// # Errors
    /// Returns `BackendError` if the lock is poisoned.
    pub fn alias_count(&self) -> Result<usize, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("directory.alias_count"))?;
        Ok(state.alias_count())
    }
}

impl ContactStore for InMemoryDirectory {
    fn insert(&self, contact: Contact) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("contact.insert"))?;
        state.check_contact_insert(&contact)?;
        state.apply_contact_insert(contact);
        Ok(())
    }

    fn get(&self, id: ContactId) -> Result<Option<Contact>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("contact.get"))?;
        Ok(state.contact(id).cloned())
    }

    fn find_in_scope(&self, scope: &Scope) -> Result<Vec<Contact>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("contact.find_in_scope"))?;
        Ok(state.contacts_in(scope))
    }
}

impl AliasStore for InMemoryDirectory {
    fn find_in_scope(&self, scope: &Scope) -> Result<Vec<CustomerAlias>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("alias.find_in_scope"))?;
        Ok(state.aliases_in(scope))
    }

    fn find_by_key(&self, key: &AliasKey) -> Result<Option<CustomerAlias>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("alias.find_by_key"))?;
        Ok(state.alias(key).cloned())
    }

    fn insert(&self, alias: CustomerAlias) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("alias.insert"))?;
        state.check_alias_insert(&alias)?;
        state.apply_alias_upsert(alias);
        Ok(())
    }

    fn update(&self, alias: CustomerAlias) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("alias.update"))?;
        state.check_alias_update(&alias)?;
        state.apply_alias_upsert(alias);
        Ok(())
    }
}

impl ContactDirectory for InMemoryDirectory {
    fn contacts(&self) -> &dyn ContactStore {
        self
    }

    fn aliases(&self) -> &dyn AliasStore {
        self
    }

    fn provision(&self, contact: Contact, alias: CustomerAlias) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("directory.provision"))?;
        state.check_provision(&contact, &alias)?;
        state.apply_provision(contact, alias);
        Ok(())
    }
}
