//! Resolution outcomes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::contact::{Contact, ContactId};

/// Which strategy produced a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionStrategy {
    /// Exact match on a learned alias.
    Alias,
    /// Similarity match against known names.
    Fuzzy,
    /// A new contact was provisioned.
    Created,
    /// No match.
    None,
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alias => write!(f, "ALIAS"),
            Self::Fuzzy => write!(f, "FUZZY"),
            Self::Created => write!(f, "CREATED"),
            Self::None => write!(f, "NONE"),
        }
    }
}

/// Value object returned by every resolution operation. Never persisted.
///
/// `customer_id` is present iff `strategy != None`. For `None`, the name is
/// the caller's original input and confidence is `0.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionResult {
    /// Strategy that produced the result.
    pub strategy: ResolutionStrategy,
    /// Resolved contact.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<ContactId>,
    /// Contact display name, or the raw input when unresolved.
    pub customer_name: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

impl ResolutionResult {
    /// Alias hit.
    #[must_use]
    pub fn alias(contact: &Contact, confidence: f64) -> Self {
        Self::matched(ResolutionStrategy::Alias, contact, confidence)
    }

    /// Fuzzy hit.
    #[must_use]
    pub fn fuzzy(contact: &Contact, score: f64) -> Self {
        Self::matched(ResolutionStrategy::Fuzzy, contact, score)
    }

    /// Freshly provisioned contact.
    #[must_use]
    pub fn created(contact: &Contact) -> Self {
        Self::matched(ResolutionStrategy::Created, contact, 1.0)
    }

    /// No match; echoes the caller's input.
    #[must_use]
    pub fn none(raw_name: &str) -> Self {
        Self {
            strategy: ResolutionStrategy::None,
            customer_id: None,
            customer_name: raw_name.to_string(),
            confidence: 0.0,
        }
    }

    fn matched(strategy: ResolutionStrategy, contact: &Contact, confidence: f64) -> Self {
        Self {
            strategy,
            customer_id: Some(contact.id),
            customer_name: contact.display_name().to_string(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// True unless the strategy is `None`.
    #[must_use]
    pub fn is_match(&self) -> bool {
        self.strategy != ResolutionStrategy::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::Scope;

    #[test]
    fn none_echoes_input_and_has_no_id() {
        let r = ResolutionResult::none("Nobody Pte Ltd");
        assert!(!r.is_match());
        assert_eq!(r.customer_id, None);
        assert_eq!(r.customer_name, "Nobody Pte Ltd");
        assert!(r.confidence.abs() < f64::EPSILON);
    }

    #[test]
    fn serializes_with_wire_names() {
        let contact = Contact::new(Scope::parse("t1", None).unwrap(), "New Customer");
        let json = serde_json::to_value(ResolutionResult::created(&contact)).unwrap();
        assert_eq!(json["strategy"], "CREATED");
        assert_eq!(json["customerName"], "New Customer");
        assert_eq!(json["confidence"], 1.0);
        assert!(json.get("customerId").is_some());

        let json = serde_json::to_value(ResolutionResult::none("x")).unwrap();
        assert_eq!(json["strategy"], "NONE");
        assert!(json.get("customerId").is_none());
    }
}
