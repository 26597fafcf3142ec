//! Resolver configuration.
//!
//! Every threshold and weight used by the resolver lives here as a named,
//! validated field so it can be tuned and tested in isolation.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Minimum confidence reported for an alias hit.
pub const DEFAULT_ALIAS_CONFIDENCE_FLOOR: f64 = 0.93;

/// Minimum Jaro-Winkler score for a fuzzy hit.
pub const DEFAULT_FUZZY_ACCEPT_THRESHOLD: f64 = 0.92;

/// Winkler prefix scale per shared prefix character.
pub const DEFAULT_PREFIX_WEIGHT: f64 = 0.1;

/// Maximum number of prefix characters that earn the Winkler bonus.
pub const DEFAULT_MAX_PREFIX_LEN: usize = 4;

/// Per-token similarity at which a candidate token counts as present in the query.
pub const DEFAULT_TOKEN_MATCH_THRESHOLD: f64 = 0.90;

/// Tokens that never make a candidate "more specific" than the query.
///
/// Legal-form suffixes and connective words. Callers with other
/// jurisdictions should extend this through [`ResolverConfig::insignificant_tokens`].
pub const DEFAULT_INSIGNIFICANT_TOKENS: &[&str] = &[
    "pte", "ltd", "limited", "private", "pvt", "inc", "incorporated", "corp", "corporation",
    "co", "company", "llc", "llp", "lp", "plc", "gmbh", "ag", "sa", "sarl", "bv", "nv", "pty",
    "sdn", "bhd", "kk", "the", "and", "of",
];

/// Tunables for the resolution engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Minimum confidence reported for an alias hit.
    pub alias_confidence_floor: f64,
    /// Minimum score a fuzzy candidate must reach.
    pub fuzzy_accept_threshold: f64,
    /// Winkler prefix weight.
    pub prefix_weight: f64,
    /// Winkler prefix cap.
    pub max_prefix_len: usize,
    /// Token similarity used by the anti-over-merge guard.
    pub token_match_threshold: f64,
    /// Tokens ignored by the anti-over-merge guard. Compared after normalization.
    pub insignificant_tokens: Vec<String>,
    /// Whether company-scoped lookups also see tenant-global records.
    pub inherit_tenant_global: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            alias_confidence_floor: DEFAULT_ALIAS_CONFIDENCE_FLOOR,
            fuzzy_accept_threshold: DEFAULT_FUZZY_ACCEPT_THRESHOLD,
            prefix_weight: DEFAULT_PREFIX_WEIGHT,
            max_prefix_len: DEFAULT_MAX_PREFIX_LEN,
            token_match_threshold: DEFAULT_TOKEN_MATCH_THRESHOLD,
            insignificant_tokens: DEFAULT_INSIGNIFICANT_TOKENS
                .iter()
                .map(|t| (*t).to_string())
                .collect(),
            inherit_tenant_global: true,
        }
    }
}

fn check_unit(name: &str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(ValidationError::InvalidConfig {
            reason: format!("{name} must be within [0.0, 1.0] (got {value})"),
        });
    }
    Ok(())
}

impl ResolverConfig {
    /// Validate ranges.
    ///
    /// # Errors
    /// Returns `ValidationError::InvalidConfig` when a threshold is outside
    /// `[0, 1]` or when the prefix bonus could push a score above 1.
    pub fn validate(self) -> Result<Self, ValidationError> {
        check_unit("alias_confidence_floor", self.alias_confidence_floor)?;
        check_unit("fuzzy_accept_threshold", self.fuzzy_accept_threshold)?;
        check_unit("token_match_threshold", self.token_match_threshold)?;
        check_unit("prefix_weight", self.prefix_weight)?;

        #[allow(clippy::cast_precision_loss)]
        let max_bonus = self.prefix_weight * self.max_prefix_len as f64;
        if max_bonus > 1.0 {
            return Err(ValidationError::InvalidConfig {
                reason: format!(
                    "prefix_weight * max_prefix_len must not exceed 1.0 (got {max_bonus})"
                ),
            });
        }

        Ok(self)
    }

    /// Load a (possibly partial) JSON document over the defaults and validate it.
    ///
    /// # Errors
    /// Returns `ValidationError::InvalidConfig` for malformed JSON or out-of-range values.
    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        let cfg: Self = serde_json::from_str(json).map_err(|e| ValidationError::InvalidConfig {
            reason: format!("malformed resolver config: {e}"),
        })?;
        cfg.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = ResolverConfig::default().validate().unwrap();
        assert!((cfg.alias_confidence_floor - 0.93).abs() < f64::EPSILON);
        assert_eq!(cfg.max_prefix_len, 4);
        assert!(cfg.insignificant_tokens.iter().any(|t| t == "pte"));
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let cfg = ResolverConfig {
            fuzzy_accept_threshold: 1.2,
            ..ResolverConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("fuzzy_accept_threshold"));

        let cfg = ResolverConfig {
            token_match_threshold: f64::NAN,
            ..ResolverConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_unbounded_prefix_bonus() {
        let cfg = ResolverConfig {
            prefix_weight: 0.3,
            max_prefix_len: 4,
            ..ResolverConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("prefix_weight"));
    }

    #[test]
    fn partial_json_overrides_defaults() {
        let cfg = ResolverConfig::from_json(
            r#"{"fuzzy_accept_threshold": 0.95, "insignificant_tokens": ["pte", "ltd"]}"#,
        )
        .unwrap();
        assert!((cfg.fuzzy_accept_threshold - 0.95).abs() < f64::EPSILON);
        assert_eq!(cfg.insignificant_tokens, vec!["pte", "ltd"]);
        assert!(cfg.inherit_tenant_global);
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(ResolverConfig::from_json("{not json").is_err());
        assert!(ResolverConfig::from_json(r#"{"alias_confidence_floor": -0.1}"#).is_err());
    }
}
