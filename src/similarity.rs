//! Similarity scoring between normalized names.
//!
//! The score is Jaro-Winkler over the full normalized strings: standard Jaro
//! similarity plus a bonus for a shared prefix. On top of the raw score an
//! anti-over-merge guard rejects candidates that carry significant tokens the
//! query does not have. Two legal entities sharing a root name ("Nobody Pte
//! Ltd" vs "Nobody Business Pte Ltd") must never be merged on score alone.

use std::collections::HashSet;

use crate::config::ResolverConfig;
use crate::normalize::{normalize, NormalizedName};

/// Jaro-Winkler similarity with an explicit prefix weight and cap.
///
/// `jw = jaro + l * weight * (1 - jaro)` where `l` is the length of the common
/// prefix, capped at `max_prefix_len` characters. The result is clamped to
/// `[0, 1]`.
#[must_use]
pub fn jaro_winkler(a: &str, b: &str, weight: f64, max_prefix_len: usize) -> f64 {
    let jaro = strsim::jaro(a, b);
    let prefix = a
        .chars()
        .zip(b.chars())
        .take(max_prefix_len)
        .take_while(|(x, y)| x == y)
        .count();

    #[allow(clippy::cast_precision_loss)]
    let boosted = jaro + prefix as f64 * weight * (1.0 - jaro);
    boosted.clamp(0.0, 1.0)
}

/// Outcome of comparing a query against one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    /// Raw Jaro-Winkler score.
    pub score: f64,
    /// Significant candidate tokens absent from the query.
    pub extra_tokens: Vec<String>,
}

impl Assessment {
    /// True when the anti-over-merge guard rejects the candidate.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        !self.extra_tokens.is_empty()
    }

    /// The score if the guard lets the candidate through.
    #[must_use]
    pub fn guarded_score(&self) -> Option<f64> {
        (!self.is_blocked()).then_some(self.score)
    }
}

/// Pure scorer configured from [`ResolverConfig`].
#[derive(Debug, Clone)]
pub struct SimilarityScorer {
    prefix_weight: f64,
    max_prefix_len: usize,
    token_match_threshold: f64,
    insignificant: HashSet<String>,
}

impl Default for SimilarityScorer {
    fn default() -> Self {
        Self::new(&ResolverConfig::default())
    }
}

impl SimilarityScorer {
    /// Build a scorer from configuration.
    #[must_use]
    pub fn new(config: &ResolverConfig) -> Self {
        // Stopwords go through the same normalizer as names so "Pte." and "pte" agree.
        let insignificant = config
            .insignificant_tokens
            .iter()
            .map(|t| normalize(t))
            .filter(|t| !t.is_empty())
            .flat_map(|t| t.tokens().map(str::to_string).collect::<Vec<_>>())
            .collect();

        Self {
            prefix_weight: config.prefix_weight,
            max_prefix_len: config.max_prefix_len,
            token_match_threshold: config.token_match_threshold,
            insignificant,
        }
    }

    /// Bounded similarity between two normalized names.
    #[must_use]
    pub fn score(&self, query: &NormalizedName, candidate: &NormalizedName) -> f64 {
        jaro_winkler(
            query.as_str(),
            candidate.as_str(),
            self.prefix_weight,
            self.max_prefix_len,
        )
    }

    /// Returns true if `token` takes part in the anti-over-merge guard.
    #[must_use]
    pub fn is_significant(&self, token: &str) -> bool {
        !token.is_empty() && !self.insignificant.contains(token)
    }

    /// Significant tokens of a name, in order.
    pub fn significant_tokens<'a>(
        &'a self,
        name: &'a NormalizedName,
    ) -> impl Iterator<Item = &'a str> {
        name.tokens().filter(|t| self.is_significant(t))
    }

    fn token_present(&self, token: &str, query_tokens: &[&str]) -> bool {
        query_tokens.iter().any(|q| {
            if *q == token {
                return true;
            }
            // An initial is explained by any query word it abbreviates.
            let mut chars = token.chars();
            if let (Some(first), None) = (chars.next(), chars.next()) {
                return q.starts_with(first);
            }
            jaro_winkler(token, q, self.prefix_weight, self.max_prefix_len)
                >= self.token_match_threshold
        })
    }

    /// Significant candidate tokens the query does not account for.
    #[must_use]
    pub fn extra_tokens(&self, query: &NormalizedName, candidate: &NormalizedName) -> Vec<String> {
        let query_tokens: Vec<&str> = query.tokens().collect();
        self.significant_tokens(candidate)
            .filter(|t| !self.token_present(t, &query_tokens))
            .map(str::to_string)
            .collect()
    }

    /// Score a candidate and apply the anti-over-merge guard.
    #[must_use]
    pub fn assess(&self, query: &NormalizedName, candidate: &NormalizedName) -> Assessment {
        Assessment {
            score: self.score(query, candidate),
            extra_tokens: self.extra_tokens(query, candidate),
        }
    }
}
