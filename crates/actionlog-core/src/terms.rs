//! Term extraction: known phrases, domain tokens and identifiers pulled out of
//! free-text action items.
//!
//! Two texts that talk about the same "800 test number" or the same
//! "sip trunk timeline" tend to be the same request even when the wording
//! drifts, so the rules engine compares the extracted term sets as well as the
//! raw characters.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Normalized lowercase terms extracted from one text.
pub type TermSet = BTreeSet<String>;

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\w+\b").expect("static regex"));
static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{3,}\b").expect("static regex"));

/// Multi-word phrases matched as substrings.
pub const DEFAULT_PHRASES: &[&str] = &[
    "sip trunk",
    "signal api",
    "screen pop",
    "speech keys",
    "bearer token",
    "project plan",
    "project baseline",
    "project schedule",
    "action item",
    "800 number",
    "800 test",
    "test number",
    "phone number",
    "cab approval",
    "arb approval",
    "nice cx1",
    "nice platform",
    "igt sip",
    "azure speech",
    "signal api configuration",
    "sip trunk timeline",
];

/// Single tokens matched against whole words.
pub const DEFAULT_ENTITIES: &[&str] = &[
    // People
    "angela", "scott", "hemant", "chirag", "leonardo", "leo", "sandeep", "love", "shiva", "joe",
    "jimmy", "kumar", "gabe",
    // Platforms and programme terms
    "sip", "azure", "mongodb", "cognigy", "nice", "cx1", "cxone", "intent", "uat", "csg", "cab",
    "arb",
    // Identifiers
    "800", "did", "p1", "p2", "p3", "p4", "p5", "p6", "p7", "p8", "p9", "p10",
    // Actions
    "provisioning", "timeline", "baseline", "walkthrough", "escalate", "configuration",
    "integration", "testing", "routing",
    // Documents
    "documentation",
];

/// Terms whose co-occurrence is strong evidence of the same request.
pub const DEFAULT_CRITICAL: &[&str] = &[
    "800 test",
    "800 number",
    "test number",
    "phone number",
    "azure speech",
    "speech keys",
    "bearer token",
    "project baseline",
    "cab approval",
    "signal api configuration",
    "sip trunk timeline",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VocabularyError {
    #[error("critical term {0:?} is neither a phrase nor an entity, so it can never match")]
    UnreachableCriticalTerm(String),
    #[error("entity {0:?} contains whitespace; multi-word terms belong in `phrases`")]
    MultiWordEntity(String),
}

/// The phrase, entity and critical-term lists used for extraction.
///
/// Injected into the rules engine rather than read from globals, so callers
/// and tests can swap in their own lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vocabulary {
    pub phrases: Vec<String>,
    pub entities: BTreeSet<String>,
    pub critical: BTreeSet<String>,
    /// Also extract standalone runs of 3+ digits.
    pub extract_numbers: bool,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            phrases: DEFAULT_PHRASES.iter().map(|s| s.to_string()).collect(),
            entities: DEFAULT_ENTITIES.iter().map(|s| s.to_string()).collect(),
            critical: DEFAULT_CRITICAL.iter().map(|s| s.to_string()).collect(),
            extract_numbers: true,
        }
    }
}

impl Vocabulary {
    /// An empty vocabulary: extraction yields nothing but numbers (if enabled).
    pub fn empty() -> Self {
        Self {
            phrases: Vec::new(),
            entities: BTreeSet::new(),
            critical: BTreeSet::new(),
            extract_numbers: false,
        }
    }

    /// Lowercase and trim every list, drop blanks, then check the lists are
    /// consistent with each other.
    pub fn validated(self) -> Result<Self, VocabularyError> {
        let norm = |s: &String| s.trim().to_lowercase();

        let mut phrases: Vec<String> = Vec::with_capacity(self.phrases.len());
        for p in self.phrases.iter().map(norm).filter(|p| !p.is_empty()) {
            if !phrases.contains(&p) {
                phrases.push(p);
            }
        }
        let entities: BTreeSet<String> = self
            .entities
            .iter()
            .map(norm)
            .filter(|e| !e.is_empty())
            .collect();
        let critical: BTreeSet<String> = self
            .critical
            .iter()
            .map(norm)
            .filter(|c| !c.is_empty())
            .collect();

        if let Some(e) = entities.iter().find(|e| e.contains(char::is_whitespace)) {
            return Err(VocabularyError::MultiWordEntity(e.clone()));
        }
        if let Some(c) = critical
            .iter()
            .find(|c| !phrases.contains(*c) && !entities.contains(c.as_str()))
        {
            return Err(VocabularyError::UnreachableCriticalTerm(c.clone()));
        }

        Ok(Self {
            phrases,
            entities,
            critical,
            extract_numbers: self.extract_numbers,
        })
    }

    /// Extract the normalized terms of `text`. Never fails; blank input gives
    /// an empty set.
    pub fn extract_terms(&self, text: &str) -> TermSet {
        let mut terms = TermSet::new();
        if text.trim().is_empty() {
            return terms;
        }
        let lower = text.to_lowercase();

        for phrase in &self.phrases {
            if lower.contains(phrase.as_str()) {
                terms.insert(phrase.clone());
            }
        }

        for word in WORD_RE.find_iter(&lower) {
            if self.entities.contains(word.as_str()) {
                terms.insert(word.as_str().to_string());
            }
        }

        if self.extract_numbers {
            for num in NUMBER_RE.find_iter(&lower) {
                terms.insert(num.as_str().to_string());
            }
        }

        terms
    }

    /// Shared terms that are also in the critical list.
    pub fn critical_shared<'a>(&self, shared: &'a TermSet) -> Vec<&'a str> {
        shared
            .iter()
            .filter(|t| self.critical.contains(*t))
            .map(String::as_str)
            .collect()
    }
}

/// Overlap between two term sets.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicOverlap {
    /// |A ∩ B| / |A ∪ B|; zero when either side is empty.
    pub jaccard: f64,
    pub shared: TermSet,
}

impl TopicOverlap {
    pub fn between(a: &TermSet, b: &TermSet) -> Self {
        if a.is_empty() || b.is_empty() {
            return Self {
                jaccard: 0.0,
                shared: TermSet::new(),
            };
        }
        let shared: TermSet = a.intersection(b).cloned().collect();
        let union = a.union(b).count();
        Self {
            jaccard: shared.len() as f64 / union as f64,
            shared,
        }
    }

    pub fn shared_count(&self) -> usize {
        self.shared.len()
    }

    /// First few shared terms, comma-joined, for reasoning strings.
    pub fn preview(&self, limit: usize) -> String {
        self.shared
            .iter()
            .take(limit)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> TermSet {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn default_vocabulary_validates() {
        assert!(Vocabulary::default().validated().is_ok());
    }

    #[test]
    fn extracts_phrases_entities_and_numbers() {
        let v = Vocabulary::default();
        let terms = v.extract_terms(
            "Angela 800 Number and UAT Status - Review Angela email for 800 test number",
        );
        assert_eq!(
            terms,
            set(&[
                "800",
                "800 number",
                "800 test",
                "angela",
                "test number",
                "uat"
            ])
        );
    }

    #[test]
    fn phrase_match_is_substring_and_case_insensitive() {
        let v = Vocabulary::default();
        let terms = v.extract_terms("IGT SIP Trunk Timeline Follow-up");
        assert!(terms.contains("sip trunk"));
        assert!(terms.contains("sip trunk timeline"));
        assert!(terms.contains("igt sip"));
        assert!(terms.contains("timeline"));
    }

    #[test]
    fn entities_match_whole_words_only() {
        let v = Vocabulary::default();
        // "leo" must not fire inside "leonardo", but "leonardo" itself does.
        let terms = v.extract_terms("Ping Leonardo about cabling");
        assert!(terms.contains("leonardo"));
        assert!(!terms.contains("leo"));
        assert!(!terms.contains("cab"));
    }

    #[test]
    fn numbers_need_three_digits() {
        let v = Vocabulary::empty();
        assert!(v.extract_terms("ticket 4512 and 42").is_empty());

        let v = Vocabulary {
            extract_numbers: true,
            ..Vocabulary::empty()
        };
        assert_eq!(v.extract_terms("ticket 4512 and 42"), set(&["4512"]));
    }

    #[test]
    fn blank_input_gives_empty_set() {
        let v = Vocabulary::default();
        assert!(v.extract_terms("").is_empty());
        assert!(v.extract_terms("   \n").is_empty());
    }

    #[test]
    fn validation_normalizes_lists() {
        let v = Vocabulary {
            phrases: vec!["  Bearer Token ".into(), "bearer token".into(), "".into()],
            entities: set(&["Azure"]),
            critical: set(&["BEARER TOKEN"]),
            extract_numbers: false,
        }
        .validated()
        .unwrap();
        assert_eq!(v.phrases, vec!["bearer token".to_string()]);
        assert!(v.entities.contains("azure"));
        assert!(v.critical.contains("bearer token"));
    }

    #[test]
    fn unreachable_critical_term_rejected() {
        let v = Vocabulary {
            phrases: vec!["sip trunk".into()],
            critical: set(&["bearer token"]),
            ..Vocabulary::empty()
        };
        assert_eq!(
            v.validated(),
            Err(VocabularyError::UnreachableCriticalTerm(
                "bearer token".into()
            ))
        );
    }

    #[test]
    fn multi_word_entity_rejected() {
        let v = Vocabulary {
            entities: set(&["screen pop"]),
            ..Vocabulary::empty()
        };
        assert!(matches!(
            v.validated(),
            Err(VocabularyError::MultiWordEntity(_))
        ));
    }

    #[test]
    fn jaccard_overlap() {
        let a = set(&["800", "800 test", "test number", "angela"]);
        let b = set(&["800", "800 test", "test number", "did"]);
        let o = TopicOverlap::between(&a, &b);
        assert_eq!(o.shared_count(), 3);
        assert!((o.jaccard - 3.0 / 5.0).abs() < 1e-9);
    }

    #[test]
    fn jaccard_empty_side_is_zero() {
        let o = TopicOverlap::between(&set(&["sip"]), &TermSet::new());
        assert_eq!(o.jaccard, 0.0);
        assert_eq!(o.shared_count(), 0);
    }

    #[test]
    fn critical_shared_filters() {
        let v = Vocabulary::default();
        let shared = set(&["800", "800 test", "test number"]);
        assert_eq!(v.critical_shared(&shared), vec!["800 test", "test number"]);
    }
}
