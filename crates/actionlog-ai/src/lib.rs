//! Duplicate classification: heuristic rules cascade, LLM escalation for the
//! ambiguous middle, and the log-level detector that drives both.

pub mod detector;
pub mod escalation;
pub mod rules;
pub mod verdict;

pub use detector::{
    DetectorConfig, DuplicateDetector, DuplicatePair, NewItemCheck, ReviewPair, ScanReport,
};
pub use escalation::{AnthropicJudge, EscalationError, Escalator, Judge, JudgeRequest, Judgement};
pub use rules::{ConfigError, RulesEngine, Thresholds};
pub use verdict::{Decision, Method, Recommendation, Verdict};
