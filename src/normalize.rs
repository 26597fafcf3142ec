//! Name normalization.
//!
//! Canonicalizes raw organization/person names into a form suitable for exact
//! alias lookup and similarity scoring. Normalization only removes formatting
//! noise; it never drops words, so token comparisons stay meaningful.
//!
//! Steps, in order:
//! 1. Unicode NFKC, so composed and decomposed spellings (and full-width or
//!    ligature forms) become the same characters.
//! 2. Case-fold.
//! 3. Drop trailing parenthetical groups such as an abbreviation `(ACCA)`.
//! 4. Spell out `&` as `and`.
//! 5. Remove abbreviation punctuation (`.` and apostrophes) so `Pte.` and `Pte`
//!    agree. Combining marks stay attached to their letter; every other
//!    non-alphanumeric character becomes a separator.
//! 6. Trim and collapse whitespace, then recompose with NFKC.
//!
//! The output contains only lowercase alphanumeric tokens (with their marks)
//! separated by single spaces, which makes the transformation idempotent.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

const TRAILING_GROUP_PATTERN: &str = r"\s*[\(\[][^\(\)\[\]]*[\)\]]\s*$";

static TRAILING_GROUP: OnceLock<Option<Regex>> = OnceLock::new();

fn trailing_group() -> Option<&'static Regex> {
    TRAILING_GROUP
        .get_or_init(|| Regex::new(TRAILING_GROUP_PATTERN).ok())
        .as_ref()
}

/// A name after canonicalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedName(String);

impl NormalizedName {
    /// Returns the normalized text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true when nothing matchable survived normalization.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whitespace-delimited tokens.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.0.split(' ').filter(|t| !t.is_empty())
    }
}

impl fmt::Display for NormalizedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn strip_trailing_groups(s: &str) -> &str {
    let mut current = s.trim_end();
    let Some(re) = trailing_group() else {
        return current;
    };
    while let Some(m) = re.find(current) {
        let head = current[..m.start()].trim_end();
        if head.is_empty() {
            // The whole name is a parenthetical; keep its content.
            break;
        }
        current = head;
    }
    current
}

/// Normalize a raw name.
///
/// Total and deterministic: every input yields a (possibly empty) name, and
/// `normalize(normalize(x).as_str()) == normalize(x)`.
#[must_use]
pub fn normalize(raw: &str) -> NormalizedName {
    let composed: String = raw.nfkc().collect();
    let folded = composed.to_lowercase();
    let body = strip_trailing_groups(&folded);

    let mut out = String::with_capacity(body.len());
    for c in body.chars() {
        match c {
            '&' => out.push_str(" and "),
            '.' | '\'' | '\u{2019}' | '`' => {}
            c if c.is_alphanumeric() || is_combining_mark(c) => out.push(c),
            _ => out.push(' '),
        }
    }

    let collapsed = out.split_whitespace().collect::<Vec<_>>().join(" ");
    NormalizedName(collapsed.nfkc().collect())
}
