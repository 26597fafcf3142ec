//! Storage adapters for contacts and aliases.
//!
//! The engine depends only on the traits in this module. Two backends ship
//! with the crate: [`InMemoryDirectory`] and, behind the `persistent` feature,
//! a WAL-backed [`persistent::PersistentDirectory`].

mod memory;
mod traits;

#[cfg(feature = "persistent")]
pub mod persistent;

pub use memory::InMemoryDirectory;
pub use traits::{AliasStore, ContactDirectory, ContactStore, StorageError, UpsertOutcome};
