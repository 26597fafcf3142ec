//! # contact-resolution
//!
//! Customer/vendor entity resolution for document ingestion. Given a free-text
//! name pulled from a document (an invoice vendor line, say), the engine finds
//! the canonical contact it refers to within a tenant/company scope, creates
//! one only when nothing matches, and learns the mapping so the same raw text
//! resolves instantly next time.
//!
//! ## Core Concepts
//!
//! - **Scope**: the `(tenant, company?)` boundary names are compared within
//! - **Contact**: the canonical record for a real-world customer or vendor
//! - **Alias**: a learned raw-name → contact mapping, unique per normalized name and scope
//! - **ResolutionResult**: strategy (`ALIAS`, `FUZZY`, `CREATED`, `NONE`), contact and confidence
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use contact_resolution::{InMemoryDirectory, ResolutionEngine, ResolutionStrategy, Scope};
//!
//! let engine = ResolutionEngine::new(Arc::new(InMemoryDirectory::new()));
//! let scope = Scope::parse("tenant-1", Some("company-9"))?;
//!
//! let created = engine.get_or_create_customer_contact(&scope, "New Customer", None)?;
//! assert_eq!(created.strategy, ResolutionStrategy::Created);
//!
//! let again = engine.resolve_customer(&scope, "NEW CUSTOMER")?;
//! assert_eq!(again.strategy, ResolutionStrategy::Alias);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod alias;
pub mod config;
pub mod contact;
pub mod engine;
pub mod error;
pub mod normalize;
pub mod resolution;
pub mod scope;
pub mod similarity;
pub mod storage;

// Re-export primary types at crate root for convenience
pub use alias::{AliasId, AliasKey, CustomerAlias};
pub use config::ResolverConfig;
pub use contact::{Contact, ContactId};
pub use engine::runtime::{
    ExecutionPath, ResolutionHandle, ResolutionRequest, ResolutionResponse, ResolutionRuntime,
    RuntimeConfig,
};
pub use engine::ResolutionEngine;
pub use error::{ExecutionError, ResolverError, ResolverResult, ValidationError};
pub use normalize::{normalize, NormalizedName};
pub use resolution::{ResolutionResult, ResolutionStrategy};
pub use scope::{CompanyId, Scope, TenantId, UserId};
pub use similarity::{jaro_winkler, SimilarityScorer};
pub use storage::{
    AliasStore, ContactDirectory, ContactStore, InMemoryDirectory, StorageError, UpsertOutcome,
};
