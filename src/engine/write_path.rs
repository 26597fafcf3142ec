//! Engine write path: provisioning and alias learning.
//!
//! Both operations funnel into the alias unique key. Provisioning commits the
//! new contact and its first alias through [`ContactDirectory::provision`], so
//! two racing callers can never both materialize a contact for the same name.

use tracing::{debug, info, warn};

use crate::alias::CustomerAlias;
use crate::contact::{Contact, ContactId};
use crate::error::{ResolverResult, ValidationError};
use crate::resolution::ResolutionResult;
use crate::scope::{Scope, UserId};
use crate::storage::{AliasStore, ContactDirectory, StorageError, UpsertOutcome};

use super::{prepare_name, ResolutionEngine};

/// Confidence recorded for the alias of a freshly created contact.
const CREATED_CONFIDENCE: f64 = 1.0;

impl ResolutionEngine {
    /// Resolve `raw_name`, creating a contact if nothing matches.
    ///
    /// Never returns strategy `NONE`. A new contact gets
    /// `corporate_name == full_name == raw_name.trim()` and an alias for the
    /// raw name at confidence 1.0, committed together.
    ///
    /// If another caller provisions the same name first, this re-resolves once
    /// and returns the winner's contact.
    ///
    /// # Errors
    /// - `Validation` for blank or unmatchable input
    /// - `StoreUnavailable` if a store fails, or `StoreUnavailable(Inconsistent)`
    ///   if the lost race cannot be re-resolved
    pub fn get_or_create_customer_contact(
        &self,
        scope: &Scope,
        raw_name: &str,
        created_by: Option<&UserId>,
    ) -> ResolverResult<ResolutionResult> {
        let resolved = self.resolve_customer(scope, raw_name)?;
        if resolved.is_match() {
            return Ok(resolved);
        }

        let contact = Contact::new(scope.clone(), raw_name).with_created_by(created_by.cloned());
        let alias = CustomerAlias::new(
            scope.clone(),
            raw_name,
            contact.id,
            CREATED_CONFIDENCE,
            created_by.cloned(),
        )?;

        match self.directory().provision(contact.clone(), alias) {
            Ok(()) => {
                info!(
                    tenant = %scope.tenant,
                    company = ?scope.company,
                    contact_id = %contact.id,
                    name = %contact.corporate_name,
                    "created customer contact"
                );
                Ok(ResolutionResult::created(&contact))
            }
            Err(StorageError::DuplicateAlias { key, existing }) => {
                warn!(
                    alias = %key,
                    winner = %existing,
                    "lost customer provisioning race; re-resolving"
                );
                let retried = self.resolve_customer(scope, raw_name)?;
                if retried.is_match() {
                    Ok(retried)
                } else {
                    Err(StorageError::Inconsistent(format!(
                        "alias {key} exists but does not resolve to a visible contact"
                    ))
                    .into())
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Record that `raw_name` refers to `customer_id` in `scope`.
    ///
    /// Updates the existing row for the name in place or inserts one.
    /// Repeating a call with identical arguments changes nothing and reports
    /// [`UpsertOutcome::Unchanged`].
    ///
    /// # Errors
    /// - `Validation` for blank/unmatchable names, confidence outside `[0, 1]`,
    ///   or a contact that does not exist or is not visible from `scope`
    /// - `StoreUnavailable` if a store fails
    pub fn learn_customer_alias(
        &self,
        scope: &Scope,
        raw_name: &str,
        customer_id: ContactId,
        confidence: f64,
        created_by: Option<&UserId>,
    ) -> ResolverResult<UpsertOutcome> {
        prepare_name(raw_name)?;
        let alias = CustomerAlias::new(
            scope.clone(),
            raw_name,
            customer_id,
            confidence,
            created_by.cloned(),
        )?;

        if self.visible_contact(scope, customer_id)?.is_none() {
            return Err(ValidationError::UnknownContact {
                id: customer_id.to_string(),
                scope: scope.to_string(),
            }
            .into());
        }

        let key = alias.key();
        let outcome = self.directory().aliases().upsert(alias)?;
        match outcome {
            UpsertOutcome::Inserted | UpsertOutcome::Updated => info!(
                alias = %key,
                contact_id = %customer_id,
                confidence,
                outcome = ?outcome,
                "learned customer alias"
            ),
            UpsertOutcome::Unchanged => debug!(alias = %key, "customer alias already up to date"),
        }
        Ok(outcome)
    }
}
