//! Learned raw-name → contact mappings.
//!
//! At most one alias exists per [`AliasKey`], i.e. per
//! `(tenant, company, normalized raw name)`. The store enforces this with a
//! unique index, not just application logic.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::contact::ContactId;
use crate::error::ValidationError;
use crate::normalize::{normalize, NormalizedName};
use crate::scope::{Scope, UserId};

/// Namespace for deterministic alias IDs.
const ALIAS_NAMESPACE: Uuid = Uuid::from_u128(0x6c0f_5e2a_93d1_4b7e_a8c4_1f2d_3e4b_5a69);

/// Unique key of an alias row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AliasKey {
    /// Exact storage slot.
    pub scope: Scope,
    /// Normalized raw name.
    pub normalized: NormalizedName,
}

impl AliasKey {
    /// Key for `raw` in `scope`.
    #[must_use]
    pub fn new(scope: Scope, raw: &str) -> Self {
        Self {
            scope,
            normalized: normalize(raw),
        }
    }

    /// Key for an already-normalized name.
    #[must_use]
    pub const fn from_normalized(scope: Scope, normalized: NormalizedName) -> Self {
        Self { scope, normalized }
    }

    /// Stable hex fingerprint of the key.
    ///
    /// Used as the unique-index key in persisted snapshots. Components are
    /// separated by NUL so `("ab", "c")` and `("a", "bc")` never collide.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut h = blake3::Hasher::new();
        h.update(self.scope.tenant.as_str().as_bytes());
        h.update(&[0]);
        match &self.scope.company {
            Some(company) => {
                h.update(&[1]);
                h.update(company.as_str().as_bytes());
            }
            None => {
                h.update(&[0]);
            }
        }
        h.update(&[0]);
        h.update(self.normalized.as_str().as_bytes());
        h.finalize().to_hex().to_string()
    }
}

impl fmt::Display for AliasKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope, self.normalized)
    }
}

/// Alias row identifier.
///
/// Derived from the key, so every writer racing on the same key produces the
/// same ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AliasId(Uuid);

impl AliasId {
    /// Deterministic ID for a key.
    #[must_use]
    pub fn for_key(key: &AliasKey) -> Self {
        Self(Uuid::new_v5(&ALIAS_NAMESPACE, key.fingerprint().as_bytes()))
    }
}

impl fmt::Display for AliasId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A learned mapping from a raw name to a canonical contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerAlias {
    /// Row identifier.
    pub id: AliasId,
    /// Exact storage slot.
    pub scope: Scope,
    /// The name as originally seen, unnormalized.
    pub raw_name: String,
    /// Normalized form of `raw_name`; part of the unique key.
    pub normalized_name: NormalizedName,
    /// Referenced contact (non-owning).
    pub contact_id: ContactId,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Who taught this mapping, if known.
    pub created_by: Option<UserId>,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
    /// When the row was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Validate a confidence value.
///
/// # Errors
/// Returns `ValidationError::ConfidenceOutOfRange` for NaN or values outside `[0, 1]`.
pub fn check_confidence(value: f64) -> Result<f64, ValidationError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ValidationError::ConfidenceOutOfRange { value })
    }
}

impl CustomerAlias {
    /// Build a new alias row.
    ///
    /// # Errors
    /// - `ValidationError::EmptyName` if `raw_name` is blank.
    /// - `ValidationError::NoMatchableContent` if nothing survives normalization.
    /// - `ValidationError::ConfidenceOutOfRange` for an invalid confidence.
    pub fn new(
        scope: Scope,
        raw_name: &str,
        contact_id: ContactId,
        confidence: f64,
        created_by: Option<UserId>,
    ) -> Result<Self, ValidationError> {
        if raw_name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        let confidence = check_confidence(confidence)?;
        let key = AliasKey::new(scope, raw_name);
        if key.normalized.is_empty() {
            return Err(ValidationError::NoMatchableContent {
                raw: raw_name.to_string(),
            });
        }

        let now = Utc::now();
        Ok(Self {
            id: AliasId::for_key(&key),
            scope: key.scope,
            raw_name: raw_name.to_string(),
            normalized_name: key.normalized,
            contact_id,
            confidence,
            created_by,
            created_at: now,
            updated_at: now,
        })
    }

    /// Unique key of this row.
    #[must_use]
    pub fn key(&self) -> AliasKey {
        AliasKey::from_normalized(self.scope.clone(), self.normalized_name.clone())
    }

    /// True if re-learning with these values would change nothing.
    #[must_use]
    pub fn same_mapping(&self, contact_id: ContactId, confidence: f64) -> bool {
        self.contact_id == contact_id && (self.confidence - confidence).abs() < f64::EPSILON
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(company: Option<&str>) -> Scope {
        Scope::parse("t1", company).unwrap()
    }

    #[test]
    fn keys_ignore_formatting_noise() {
        let a = AliasKey::new(scope(Some("c1")), "Accounting and Corporate Authority (ACCA)");
        let b = AliasKey::new(scope(Some("c1")), "accounting  and corporate authority");
        assert_eq!(a, b);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(AliasId::for_key(&a), AliasId::for_key(&b));
    }

    #[test]
    fn fingerprint_separates_scopes() {
        let company = AliasKey::new(scope(Some("c1")), "Acme");
        let global = AliasKey::new(scope(None), "Acme");
        let other_tenant = AliasKey::new(Scope::parse("t2", Some("c1")).unwrap(), "Acme");
        assert_ne!(company.fingerprint(), global.fingerprint());
        assert_ne!(company.fingerprint(), other_tenant.fingerprint());
    }

    #[test]
    fn new_alias_validates_input() {
        let id = ContactId::new();
        assert!(matches!(
            CustomerAlias::new(scope(None), "  ", id, 1.0, None),
            Err(ValidationError::EmptyName)
        ));
        assert!(matches!(
            CustomerAlias::new(scope(None), "...", id, 1.0, None),
            Err(ValidationError::NoMatchableContent { .. })
        ));
        assert!(matches!(
            CustomerAlias::new(scope(None), "Acme", id, 1.01, None),
            Err(ValidationError::ConfidenceOutOfRange { .. })
        ));
    }

    #[test]
    fn alias_keeps_raw_name_verbatim() {
        let raw = " Acme Pte. Ltd. ";
        let alias = CustomerAlias::new(scope(None), raw, ContactId::new(), 0.97, None).unwrap();
        assert_eq!(alias.raw_name, " Acme Pte. Ltd. ");
        assert_eq!(alias.normalized_name.as_str(), "acme pte ltd");
        assert!(alias.same_mapping(alias.contact_id, 0.97));
        assert!(!alias.same_mapping(alias.contact_id, 0.5));
    }
}
