//! Resolution engine.
//!
//! [`ResolutionEngine`] classifies raw customer/vendor names against the
//! aliases and contacts visible from a scope. The read path lives here; the
//! write path (provisioning and alias learning) is in `write_path`.
//!
//! Strategies are tried in priority order and the first hit wins:
//! 1. `ALIAS`: the normalized input equals a learned alias key.
//! 2. `FUZZY`: the best guarded Jaro-Winkler candidate clears the threshold.
//! 3. `NONE`: the caller's input is echoed back with confidence 0.

mod write_path;

/// Bounded worker-pool runtime for ingestion workers.
pub mod runtime;

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::alias::AliasKey;
use crate::config::ResolverConfig;
use crate::contact::{Contact, ContactId};
use crate::error::{ResolverResult, ValidationError};
use crate::normalize::{normalize, NormalizedName};
use crate::resolution::ResolutionResult;
use crate::scope::Scope;
use crate::similarity::SimilarityScorer;
use crate::storage::{AliasStore, ContactDirectory, ContactStore};

/// Validate and normalize a raw name.
pub(crate) fn prepare_name(raw: &str) -> Result<NormalizedName, ValidationError> {
    if raw.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    let normalized = normalize(raw);
    if normalized.is_empty() {
        return Err(ValidationError::NoMatchableContent {
            raw: raw.to_string(),
        });
    }
    Ok(normalized)
}

/// Best guarded score seen for one contact.
#[derive(Debug)]
struct Candidate {
    contact: Contact,
    score: f64,
}

/// Higher score first, then the most recently created contact, then the
/// lowest ID so the order is total.
fn rank(a: &Candidate, b: &Candidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.contact.created_at.cmp(&a.contact.created_at))
        .then_with(|| a.contact.id.cmp(&b.contact.id))
}

/// Contact-resolution engine.
///
/// Cheap to clone; all clones share the same directory.
#[derive(Clone)]
pub struct ResolutionEngine {
    directory: Arc<dyn ContactDirectory>,
    config: Arc<ResolverConfig>,
    scorer: Arc<SimilarityScorer>,
}

impl ResolutionEngine {
    /// Create an engine with the default configuration.
    #[must_use]
    pub fn new(directory: Arc<dyn ContactDirectory>) -> Self {
        let config = ResolverConfig::default();
        Self {
            directory,
            scorer: Arc::new(SimilarityScorer::new(&config)),
            config: Arc::new(config),
        }
    }

    /// Create an engine with a custom configuration.
    ///
    /// # Errors
    /// Returns `ValidationError::InvalidConfig` if the configuration is out of range.
    pub fn with_config(
        directory: Arc<dyn ContactDirectory>,
        config: ResolverConfig,
    ) -> Result<Self, ValidationError> {
        let config = config.validate()?;
        Ok(Self {
            directory,
            scorer: Arc::new(SimilarityScorer::new(&config)),
            config: Arc::new(config),
        })
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Underlying directory.
    #[must_use]
    pub fn directory(&self) -> &Arc<dyn ContactDirectory> {
        &self.directory
    }

    /// Scorer used for the fuzzy strategy.
    #[must_use]
    pub fn scorer(&self) -> &SimilarityScorer {
        &self.scorer
    }

    /// Resolve a raw name within `scope`. Read-only.
    ///
    /// # Errors
    /// - `Validation(EmptyName)` for blank input
    /// - `Validation(NoMatchableContent)` if nothing survives normalization
    /// - `StoreUnavailable` if a store read fails
    pub fn resolve_customer(
        &self,
        scope: &Scope,
        raw_name: &str,
    ) -> ResolverResult<ResolutionResult> {
        let query = prepare_name(raw_name)?;
        let slots = scope.visible_slots(self.config.inherit_tenant_global);

        let result = match self.resolve_by_alias(scope, &slots, &query)? {
            Some(hit) => hit,
            None => self
                .resolve_by_similarity(scope, &slots, &query)?
                .unwrap_or_else(|| ResolutionResult::none(raw_name)),
        };

        debug!(
            tenant = %scope.tenant,
            company = ?scope.company,
            normalized = %query,
            strategy = %result.strategy,
            confidence = result.confidence,
            "resolved customer name"
        );
        Ok(result)
    }

    /// Fetch a contact and check it is visible from `scope`.
    pub(crate) fn visible_contact(
        &self,
        scope: &Scope,
        id: ContactId,
    ) -> ResolverResult<Option<Contact>> {
        let contact = self.directory.contacts().get(id)?;
        Ok(contact.filter(|c| scope.can_see(&c.scope, self.config.inherit_tenant_global)))
    }

    fn resolve_by_alias(
        &self,
        scope: &Scope,
        slots: &[Scope],
        query: &NormalizedName,
    ) -> ResolverResult<Option<ResolutionResult>> {
        for slot in slots {
            let key = AliasKey::from_normalized(slot.clone(), query.clone());
            let Some(alias) = self.directory.aliases().find_by_key(&key)? else {
                continue;
            };

            if let Some(contact) = self.visible_contact(scope, alias.contact_id)? {
                let confidence = alias.confidence.max(self.config.alias_confidence_floor);
                return Ok(Some(ResolutionResult::alias(&contact, confidence)));
            }
            warn!(
                alias = %key,
                contact_id = %alias.contact_id,
                "alias points at a missing or out-of-scope contact; ignoring"
            );
        }
        Ok(None)
    }

    fn resolve_by_similarity(
        &self,
        scope: &Scope,
        slots: &[Scope],
        query: &NormalizedName,
    ) -> ResolverResult<Option<ResolutionResult>> {
        let mut best: HashMap<ContactId, Candidate> = HashMap::new();
        let mut offer = |contact: &Contact, name: &NormalizedName| {
            let assessment = self.scorer.assess(query, name);
            let Some(score) = assessment.guarded_score() else {
                return;
            };
            best.entry(contact.id)
                .and_modify(|c| c.score = c.score.max(score))
                .or_insert_with(|| Candidate {
                    contact: contact.clone(),
                    score,
                });
        };

        let mut visible: HashMap<ContactId, Contact> = HashMap::new();
        for slot in slots {
            for contact in self.directory.contacts().find_in_scope(slot)? {
                visible.insert(contact.id, contact);
            }
        }
        for contact in visible.values() {
            for name in contact.names() {
                offer(contact, &normalize(name));
            }
        }

        // Learned raw names are candidates too, for the contact they point at.
        for slot in slots {
            for alias in self.directory.aliases().find_in_scope(slot)? {
                let contact = match visible.get(&alias.contact_id) {
                    Some(contact) => contact.clone(),
                    None => match self.visible_contact(scope, alias.contact_id)? {
                        Some(contact) => contact,
                        None => continue,
                    },
                };
                offer(&contact, &alias.normalized_name);
            }
        }

        let threshold = self.config.fuzzy_accept_threshold;
        let winner = best
            .into_values()
            .filter(|c| c.score >= threshold)
            .min_by(rank);
        Ok(winner.map(|c| ResolutionResult::fuzzy(&c.contact, c.score)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::CustomerAlias;
    use crate::resolution::ResolutionStrategy;
    use crate::storage::{AliasStore, ContactStore, InMemoryDirectory};

    fn scope(company: Option<&str>) -> Scope {
        Scope::parse("t1", company).unwrap()
    }

    fn setup() -> (Arc<InMemoryDirectory>, ResolutionEngine) {
        let dir = Arc::new(InMemoryDirectory::new());
        let engine = ResolutionEngine::new(dir.clone());
        (dir, engine)
    }

    fn add_contact(dir: &InMemoryDirectory, scope: Scope, name: &str) -> Contact {
        let contact = Contact::new(scope, name);
        ContactStore::insert(dir, contact.clone()).unwrap();
        contact
    }

    fn add_alias(dir: &InMemoryDirectory, scope: Scope, raw: &str, contact: &Contact, conf: f64) {
        let alias = CustomerAlias::new(scope, raw, contact.id, conf, None).unwrap();
        AliasStore::insert(dir, alias).unwrap();
    }

    #[test]
    fn rejects_empty_input() {
        let (_dir, engine) = setup();
        let err = engine.resolve_customer(&scope(None), "   ").unwrap_err();
        assert!(err.is_validation());
        let err = engine.resolve_customer(&scope(None), "(.)").unwrap_err();
        assert!(matches!(
            err,
            crate::error::ResolverError::Validation(ValidationError::NoMatchableContent { .. })
        ));
    }

    #[test]
    fn alias_confidence_is_floored() {
        let (dir, engine) = setup();
        let c = add_contact(&dir, scope(Some("x")), "Acme Pte Ltd");
        add_alias(&dir, scope(Some("x")), "ACME", &c, 0.5);

        let r = engine.resolve_customer(&scope(Some("x")), "acme").unwrap();
        assert_eq!(r.strategy, ResolutionStrategy::Alias);
        assert!((r.confidence - 0.93).abs() < 1e-12);
    }

    #[test]
    fn exact_slot_alias_beats_tenant_global_alias() {
        let (dir, engine) = setup();
        let global = add_contact(&dir, scope(None), "Acme Global");
        let local = add_contact(&dir, scope(Some("x")), "Acme Local");
        add_alias(&dir, scope(None), "Acme", &global, 1.0);
        add_alias(&dir, scope(Some("x")), "Acme", &local, 1.0);

        let r = engine.resolve_customer(&scope(Some("x")), "Acme").unwrap();
        assert_eq!(r.customer_id, Some(local.id));

        let r = engine.resolve_customer(&scope(Some("y")), "Acme").unwrap();
        assert_eq!(r.customer_id, Some(global.id));
    }

    #[test]
    fn inheritance_can_be_disabled() {
        let dir = Arc::new(InMemoryDirectory::new());
        let config = ResolverConfig {
            inherit_tenant_global: false,
            ..ResolverConfig::default()
        };
        let engine = ResolutionEngine::with_config(dir.clone(), config).unwrap();
        let global = add_contact(&dir, scope(None), "Acme");
        add_alias(&dir, scope(None), "Acme", &global, 1.0);

        let r = engine.resolve_customer(&scope(Some("x")), "Acme").unwrap();
        assert_eq!(r.strategy, ResolutionStrategy::None);
    }

    #[test]
    fn dangling_alias_falls_through_to_fuzzy() {
        let (dir, engine) = setup();
        let ghost = Contact::new(scope(None), "Ghost Trading");
        add_alias(&dir, scope(None), "Ghost Trading", &ghost, 1.0);
        let real = add_contact(&dir, scope(None), "Ghost Trading Pte Ltd");

        let r = engine.resolve_customer(&scope(None), "Ghost Trading").unwrap();
        assert_eq!(r.strategy, ResolutionStrategy::Fuzzy);
        assert_eq!(r.customer_id, Some(real.id));
    }

    #[test]
    fn fuzzy_tolerates_typos() {
        let (dir, engine) = setup();
        let c = add_contact(&dir, scope(None), "Acme Trading Pte Ltd");

        let r = engine.resolve_customer(&scope(None), "Acme Tradng Pte Ltd").unwrap();
        assert_eq!(r.strategy, ResolutionStrategy::Fuzzy);
        assert_eq!(r.customer_id, Some(c.id));
        assert_eq!(r.customer_name, "Acme Trading Pte Ltd");
        assert!(r.confidence >= 0.92 && r.confidence < 1.0);
    }

    #[test]
    fn fuzzy_tie_prefers_most_recent_contact() {
        let (dir, engine) = setup();
        let mut older = Contact::new(scope(None), "Acme Trading");
        older.created_at -= chrono::Duration::days(1);
        ContactStore::insert(&*dir, older).unwrap();
        let newer = add_contact(&dir, scope(None), "Acme Trading");

        let r = engine.resolve_customer(&scope(None), "Acme Tradin").unwrap();
        assert_eq!(r.strategy, ResolutionStrategy::Fuzzy);
        assert_eq!(r.customer_id, Some(newer.id));
    }

    #[test]
    fn none_echoes_raw_input() {
        let (dir, engine) = setup();
        add_contact(&dir, scope(None), "Completely Different Co");

        let r = engine.resolve_customer(&scope(None), "  Zenith Labs ").unwrap();
        assert_eq!(r.strategy, ResolutionStrategy::None);
        assert_eq!(r.customer_name, "  Zenith Labs ");
        assert_eq!(r.customer_id, None);
    }

    #[test]
    fn rank_orders_by_score_then_recency_then_id() {
        let a = Candidate {
            contact: Contact::new(scope(None), "a"),
            score: 0.95,
        };
        let b = Candidate {
            contact: Contact::new(scope(None), "b"),
            score: 0.99,
        };
        assert_eq!(rank(&b, &a), Ordering::Less);

        let mut c = Candidate {
            contact: a.contact.clone(),
            score: 0.95,
        };
        c.contact.id = ContactId::new();
        let expected = a.contact.id.cmp(&c.contact.id);
        assert_eq!(rank(&a, &c), expected);
    }
}
