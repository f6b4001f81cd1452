//! Outcome of comparing two action items.

use serde::{Deserialize, Serialize};

/// Final or provisional answer for a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Duplicate,
    Distinct,
    /// The heuristics could not settle the pair and no judge did either.
    NeedsReview,
}

/// Which rule (or the judge) produced the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Method {
    Prefix,
    HighSimilarity,
    MediumSimilarityPlusTerms,
    TopicOverlap,
    CriticalTerms,
    Escalated,
    None,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prefix => "prefix",
            Self::HighSimilarity => "high-similarity",
            Self::MediumSimilarityPlusTerms => "medium-similarity-plus-terms",
            Self::TopicOverlap => "topic-overlap",
            Self::CriticalTerms => "critical-terms",
            Self::Escalated => "escalated",
            Self::None => "none",
        }
    }
}

/// What the caller should do with the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    MarkDuplicate,
    KeepBoth,
    Merge,
    ReviewManually,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MarkDuplicate => "mark_duplicate",
            Self::KeepBoth => "keep_both",
            Self::Merge => "merge",
            Self::ReviewManually => "review_manually",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub decision: Decision,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub method: Method,
    pub reasoning: String,
    pub recommendation: Recommendation,
    /// Combined wording, when a judge recommends a merge.
    pub suggested_merged_text: Option<String>,
    /// Raw character similarity of the pair, kept for reports.
    pub similarity: f64,
}

impl Verdict {
    pub fn duplicate(method: Method, confidence: f64, reasoning: String, similarity: f64) -> Self {
        Self {
            decision: Decision::Duplicate,
            confidence: confidence.clamp(0.0, 1.0),
            method,
            reasoning,
            recommendation: Recommendation::MarkDuplicate,
            suggested_merged_text: None,
            similarity,
        }
    }

    pub fn distinct(method: Method, reasoning: String, similarity: f64) -> Self {
        Self {
            decision: Decision::Distinct,
            confidence: 0.0,
            method,
            reasoning,
            recommendation: Recommendation::KeepBoth,
            suggested_merged_text: None,
            similarity,
        }
    }

    pub fn needs_review(confidence: f64, reasoning: String, similarity: f64) -> Self {
        Self {
            decision: Decision::NeedsReview,
            confidence: confidence.clamp(0.0, 1.0),
            method: Method::None,
            reasoning,
            recommendation: Recommendation::ReviewManually,
            suggested_merged_text: None,
            similarity,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        self.decision == Decision::Duplicate
    }

    pub fn is_uncertain(&self) -> bool {
        self.decision == Decision::NeedsReview
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_is_clamped() {
        let v = Verdict::duplicate(Method::Prefix, 1.4, "prefix match".into(), 0.9);
        assert_eq!(v.confidence, 1.0);
        let v = Verdict::needs_review(-0.2, "shared terms".into(), 0.3);
        assert_eq!(v.confidence, 0.0);
    }

    #[test]
    fn distinct_has_zero_confidence() {
        let v = Verdict::distinct(Method::None, "no match".into(), 0.2);
        assert!(!v.is_duplicate());
        assert_eq!(v.confidence, 0.0);
        assert_eq!(v.recommendation, Recommendation::KeepBoth);
    }

    #[test]
    fn method_names_serialize_as_labels() {
        let json = serde_json::to_string(&Method::MediumSimilarityPlusTerms).unwrap();
        assert_eq!(json, "\"medium-similarity-plus-terms\"");
        assert_eq!(
            Method::MediumSimilarityPlusTerms.as_str(),
            "medium-similarity-plus-terms"
        );
    }

    #[test]
    fn recommendation_round_trips_judge_labels() {
        let r: Recommendation = serde_json::from_str("\"mark_duplicate\"").unwrap();
        assert_eq!(r, Recommendation::MarkDuplicate);
        assert_eq!(Recommendation::ReviewManually.as_str(), "review_manually");
    }
}
