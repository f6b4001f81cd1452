//! Heuristic duplicate classification.
//!
//! An ordered cascade of cheap lexical rules. The first rule that fires wins;
//! pairs that land in the ambiguous middle come back as
//! [`Decision::NeedsReview`](crate::Decision::NeedsReview) so the caller can
//! escalate them to a judge or to a human.
//!
//! 1. Prefix: the first `prefix_len` lowercased characters are identical.
//! 2. High similarity: ratio ≥ `high_similarity`.
//! 3. Medium similarity plus terms: ratio ≥ `medium_similarity`, term Jaccard
//!    ≥ `medium_jaccard` and at least `medium_min_shared` shared terms.
//! 4. Topic overlap: Jaccard ≥ `topic_jaccard`, at least `topic_min_shared`
//!    shared terms, and lengths within `topic_max_length_ratio` of each other.
//! 5. Critical terms: a shared critical term and at least
//!    `critical_min_shared` shared terms.
//! 6. Uncertain: ratio ≥ `uncertain_similarity` or at least
//!    `uncertain_min_shared` shared terms.
//! 7. Otherwise distinct.

use actionlog_core::{TermSet, TopicOverlap, Vocabulary, VocabularyError, similarity};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::verdict::{Method, Verdict};

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("threshold `{name}` must be a finite value in [0, 1], got {value}")]
    OutOfRange { name: &'static str, value: f64 },
    #[error("threshold `{lower}` ({lower_value}) must not exceed `{upper}` ({upper_value})")]
    Inverted {
        lower: &'static str,
        lower_value: f64,
        upper: &'static str,
        upper_value: f64,
    },
    #[error("`{name}` must be at least {min}, got {value}")]
    TooSmall {
        name: &'static str,
        min: f64,
        value: f64,
    },
    #[error("vocabulary: {0}")]
    Vocabulary(#[from] VocabularyError),
}

/// Tunable cut-offs for the cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Characters compared by the prefix rule.
    pub prefix_len: usize,
    pub high_similarity: f64,
    pub medium_similarity: f64,
    pub medium_jaccard: f64,
    pub medium_min_shared: usize,
    pub topic_jaccard: f64,
    pub topic_min_shared: usize,
    /// Longer text may be at most this many times the shorter one.
    pub topic_max_length_ratio: f64,
    pub critical_min_shared: usize,
    pub critical_confidence: f64,
    /// Lower edge of the ambiguous band; the upper edge is `high_similarity`.
    pub uncertain_similarity: f64,
    pub uncertain_min_shared: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            prefix_len: 50,
            high_similarity: 0.75,
            medium_similarity: 0.60,
            medium_jaccard: 0.30,
            medium_min_shared: 2,
            topic_jaccard: 0.50,
            topic_min_shared: 3,
            topic_max_length_ratio: 2.0,
            critical_min_shared: 2,
            critical_confidence: 0.7,
            uncertain_similarity: 0.50,
            uncertain_min_shared: 2,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit = [
            ("high_similarity", self.high_similarity),
            ("medium_similarity", self.medium_similarity),
            ("medium_jaccard", self.medium_jaccard),
            ("topic_jaccard", self.topic_jaccard),
            ("critical_confidence", self.critical_confidence),
            ("uncertain_similarity", self.uncertain_similarity),
        ];
        for (name, value) in unit {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfRange { name, value });
            }
        }

        let ordered = [
            (
                ("medium_similarity", self.medium_similarity),
                ("high_similarity", self.high_similarity),
            ),
            (
                ("uncertain_similarity", self.uncertain_similarity),
                ("medium_similarity", self.medium_similarity),
            ),
        ];
        for ((lower, lower_value), (upper, upper_value)) in ordered {
            if lower_value > upper_value {
                return Err(ConfigError::Inverted {
                    lower,
                    lower_value,
                    upper,
                    upper_value,
                });
            }
        }

        if !self.topic_max_length_ratio.is_finite() || self.topic_max_length_ratio < 1.0 {
            return Err(ConfigError::TooSmall {
                name: "topic_max_length_ratio",
                min: 1.0,
                value: self.topic_max_length_ratio,
            });
        }

        let counts = [
            ("prefix_len", self.prefix_len),
            ("medium_min_shared", self.medium_min_shared),
            ("topic_min_shared", self.topic_min_shared),
            ("critical_min_shared", self.critical_min_shared),
            ("uncertain_min_shared", self.uncertain_min_shared),
        ];
        for (name, value) in counts {
            if value < 1 {
                return Err(ConfigError::TooSmall {
                    name,
                    min: 1.0,
                    value: value as f64,
                });
            }
        }

        Ok(())
    }
}

/// Pure, reentrant pair classifier.
#[derive(Debug, Clone)]
pub struct RulesEngine {
    thresholds: Thresholds,
    vocabulary: Vocabulary,
}

impl Default for RulesEngine {
    fn default() -> Self {
        // The built-in lists are already lowercase and consistent.
        Self {
            thresholds: Thresholds::default(),
            vocabulary: Vocabulary::default(),
        }
    }
}

impl RulesEngine {
    /// Validate the configuration and build an engine.
    pub fn new(thresholds: Thresholds, vocabulary: Vocabulary) -> Result<Self, ConfigError> {
        thresholds.validate()?;
        let vocabulary = vocabulary.validated()?;
        Ok(Self {
            thresholds,
            vocabulary,
        })
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn extract_terms(&self, text: &str) -> TermSet {
        self.vocabulary.extract_terms(text)
    }

    /// Classify a pair of texts. Argument order never changes the decision.
    pub fn classify(&self, text_a: &str, text_b: &str) -> Verdict {
        let t = &self.thresholds;
        let a = text_a.to_lowercase();
        let b = text_b.to_lowercase();

        if a.trim().is_empty() || b.trim().is_empty() {
            return Verdict::distinct(Method::None, "empty text".into(), 0.0);
        }

        // 1. Prefix. Decided before scoring, so the reported similarity is the
        // share of both texts covered by the common prefix.
        if a.chars().take(t.prefix_len).eq(b.chars().take(t.prefix_len)) {
            return Verdict::duplicate(
                Method::Prefix,
                1.0,
                "prefix match".into(),
                prefix_share(&a, &b, t.prefix_len),
            );
        }

        let sim = similarity(&a, &b);

        // 2. High similarity.
        if sim >= t.high_similarity {
            return Verdict::duplicate(
                Method::HighSimilarity,
                sim,
                format!("text similarity {}", pct(sim)),
                sim,
            );
        }

        let overlap = TopicOverlap::between(
            &self.vocabulary.extract_terms(&a),
            &self.vocabulary.extract_terms(&b),
        );
        let shared = overlap.shared_count();

        // 3. Medium similarity backed by shared terms.
        if sim >= t.medium_similarity
            && overlap.jaccard >= t.medium_jaccard
            && shared >= t.medium_min_shared
        {
            return Verdict::duplicate(
                Method::MediumSimilarityPlusTerms,
                sim,
                format!("{} similar + shared: {}", pct(sim), overlap.preview(3)),
                sim,
            );
        }

        // 4. Topic overlap dominates.
        if overlap.jaccard >= t.topic_jaccard
            && shared >= t.topic_min_shared
            && lengths_comparable(&a, &b, t.topic_max_length_ratio)
        {
            return Verdict::duplicate(
                Method::TopicOverlap,
                overlap.jaccard,
                format!(
                    "{shared} shared terms ({} Jaccard): {}",
                    pct(overlap.jaccard),
                    overlap.preview(3)
                ),
                sim,
            );
        }

        // 5. Critical terms.
        let critical = self.vocabulary.critical_shared(&overlap.shared);
        if !critical.is_empty() && shared >= t.critical_min_shared {
            return Verdict::duplicate(
                Method::CriticalTerms,
                t.critical_confidence,
                format!("critical terms: {}", critical.join(", ")),
                sim,
            );
        }

        // 6. Ambiguous middle.
        if sim >= t.uncertain_similarity {
            return Verdict::needs_review(
                sim,
                format!("ambiguous similarity {}", pct(sim)),
                sim,
            );
        }
        if shared >= t.uncertain_min_shared {
            return Verdict::needs_review(
                sim,
                format!("shared terms: {}", overlap.preview(shared)),
                sim,
            );
        }

        Verdict::distinct(Method::None, "no match".into(), sim)
    }
}

fn lengths_comparable(a: &str, b: &str, max_ratio: f64) -> bool {
    let la = a.chars().count() as f64;
    let lb = b.chars().count() as f64;
    let (short, long) = if la <= lb { (la, lb) } else { (lb, la) };
    short > 0.0 && long / short <= max_ratio
}

fn prefix_share(a: &str, b: &str, prefix_len: usize) -> f64 {
    let la = a.chars().count();
    let lb = b.chars().count();
    let common = prefix_len.min(la).min(lb);
    2.0 * common as f64 / (la + lb) as f64
}

fn pct(v: f64) -> String {
    format!("{:.0}%", v * 100.0)
}
