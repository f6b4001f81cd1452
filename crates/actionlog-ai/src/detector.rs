//! Log-level duplicate detection.
//!
//! Runs the rules engine over every pair a cleanup pass needs, escalates the
//! ambiguous ones, and decides which side of each confirmed pair is the
//! original.
//!
//! A scan has two passes:
//!
//! 1. Active entries against each other, in encounter order.
//! 2. Active entries not flagged in pass 1 against completed entries. A hit
//!    always keeps the completed entry as the original, so a recreated task
//!    folds back into the one already closed.
//!
//! Within a pass all rule verdicts are computed first and then folded in
//! order. Uncertain pairs are escalated in small concurrent batches as the
//! fold reaches them, skipping any pair with a side already flagged. The
//! fold itself is sequential, so the result does not depend on which
//! escalation finished first.

use std::collections::HashSet;

use actionlog_core::{LogEntry, Precedence, precedence};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::escalation::Escalator;
use crate::rules::RulesEngine;
use crate::verdict::{Decision, Verdict};

/// Scan behaviour that is not part of the rules themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Upper bound on escalations in flight at once.
    pub max_concurrent_escalations: usize,
    /// Per-escalation deadline, in seconds.
    pub escalation_timeout_secs: u64,
    /// Run the second pass against completed entries.
    pub compare_completed: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_escalations: 4,
            escalation_timeout_secs: 30,
            compare_completed: true,
        }
    }
}

/// A confirmed duplicate and the entry it duplicates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicatePair {
    pub original: LogEntry,
    pub duplicate: LogEntry,
    pub verdict: Verdict,
    /// The original is a completed entry (pass 2).
    pub against_completed: bool,
}

/// A pair nobody could settle. Never acted on automatically.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewPair {
    pub first: LogEntry,
    pub second: LogEntry,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanReport {
    pub duplicates: Vec<DuplicatePair>,
    pub needs_review: Vec<ReviewPair>,
    pub pairs_checked: usize,
    pub escalations: usize,
    pub active: usize,
    pub completed: usize,
}

impl ScanReport {
    pub fn is_clean(&self) -> bool {
        self.duplicates.is_empty() && self.needs_review.is_empty()
    }
}

/// Outcome of checking an item before it is written to the log.
#[derive(Debug, Clone, PartialEq)]
pub enum NewItemCheck {
    /// Nothing matches; log it as a new row.
    AddNew,
    /// Same task as `existing`; bump its occurrence count instead.
    IncrementCount { existing: LogEntry, verdict: Verdict },
    /// Only ambiguous matches, and no judge to settle them.
    NeedsReview { candidates: Vec<(LogEntry, Verdict)> },
}

impl NewItemCheck {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddNew => "add_new",
            Self::IncrementCount { .. } => "increment_count",
            Self::NeedsReview { .. } => "needs_review",
        }
    }
}

/// Rule verdict for one pair of entry indices, before folding.
struct PairEval {
    first: usize,
    second: usize,
    verdict: Verdict,
}

pub struct DuplicateDetector {
    rules: RulesEngine,
    escalator: Option<Escalator>,
    config: DetectorConfig,
}

impl DuplicateDetector {
    pub fn new(rules: RulesEngine) -> Self {
        Self {
            rules,
            escalator: None,
            config: DetectorConfig::default(),
        }
    }

    pub fn with_escalator(mut self, escalator: Escalator) -> Self {
        self.escalator = Some(escalator);
        self
    }

    pub fn with_config(mut self, config: DetectorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn rules(&self) -> &RulesEngine {
        &self.rules
    }

    pub fn escalation_enabled(&self) -> bool {
        self.escalator.is_some()
    }

    /// Classify two entries, escalating if the rules cannot decide.
    pub async fn classify_entries(&self, a: &LogEntry, b: &LogEntry) -> Verdict {
        let verdict = self.rules.classify(&a.text, &b.text);
        match &self.escalator {
            Some(escalator) if verdict.is_uncertain() => {
                escalate_pair(escalator, a, b, verdict.similarity).await
            }
            _ => verdict,
        }
    }

    /// Scan a whole log for duplicates.
    pub async fn find_duplicates(&self, entries: &[LogEntry]) -> ScanReport {
        let active: Vec<usize> = (0..entries.len())
            .filter(|&i| entries[i].is_comparable() && entries[i].is_active())
            .collect();
        let completed: Vec<usize> = (0..entries.len())
            .filter(|&i| entries[i].is_comparable() && entries[i].is_completed())
            .collect();

        let mut report = ScanReport {
            active: active.len(),
            completed: completed.len(),
            ..ScanReport::default()
        };
        let mut flagged: HashSet<usize> = HashSet::new();

        // Pass 1: active vs active.
        let mut evals = Vec::new();
        for (n, &i) in active.iter().enumerate() {
            for &j in &active[n + 1..] {
                evals.push(self.evaluate(entries, i, j));
            }
        }
        report.pairs_checked += evals.len();
        self.fold(entries, evals, Pass::Active, &mut flagged, &mut report)
            .await;

        // Pass 2: unflagged active vs completed.
        if self.config.compare_completed && !completed.is_empty() {
            let mut evals = Vec::new();
            for &i in active.iter().filter(|&&i| !flagged.contains(&i)) {
                for &c in &completed {
                    evals.push(self.evaluate(entries, i, c));
                }
            }
            report.pairs_checked += evals.len();
            self.fold(entries, evals, Pass::Completed, &mut flagged, &mut report)
                .await;
        }

        // A pair left for review is moot once either side is flagged.
        report.needs_review.retain(|r| {
            !report
                .duplicates
                .iter()
                .any(|d| d.duplicate.id == r.first.id || d.duplicate.id == r.second.id)
        });

        info!(
            active = report.active,
            completed = report.completed,
            pairs = report.pairs_checked,
            duplicates = report.duplicates.len(),
            needs_review = report.needs_review.len(),
            escalations = report.escalations,
            "scan complete"
        );
        report
    }

    /// Check an item that has not been written yet against existing entries.
    ///
    /// Entries are compared in order and the first duplicate wins. Resolved
    /// entries other than completed ones are ignored, as are blank ones.
    pub async fn check_new_item(&self, text: &str, existing: &[LogEntry]) -> NewItemCheck {
        if text.trim().is_empty() {
            return NewItemCheck::AddNew;
        }
        let incoming = LogEntry::new(0, text);
        let mut candidates = Vec::new();

        for entry in existing
            .iter()
            .filter(|e| e.is_comparable() && (e.is_active() || e.is_completed()))
        {
            let verdict = self.classify_entries(&incoming, entry).await;
            match verdict.decision {
                Decision::Duplicate => {
                    return NewItemCheck::IncrementCount {
                        existing: entry.clone(),
                        verdict,
                    };
                }
                Decision::NeedsReview => candidates.push((entry.clone(), verdict)),
                Decision::Distinct => {}
            }
        }

        if candidates.is_empty() {
            NewItemCheck::AddNew
        } else {
            NewItemCheck::NeedsReview { candidates }
        }
    }

    fn evaluate(&self, entries: &[LogEntry], first: usize, second: usize) -> PairEval {
        PairEval {
            first,
            second,
            verdict: self.rules.classify(&entries[first].text, &entries[second].text),
        }
    }

    /// Walk one pass in order, recording duplicates and review pairs.
    ///
    /// An uncertain pair is escalated only when the walk reaches it with
    /// neither side flagged. It goes out together with the next live
    /// uncertain pairs, up to the concurrency limit, so a flag set later in
    /// the walk can leave a few of those answers unused.
    async fn fold(
        &self,
        entries: &[LogEntry],
        mut evals: Vec<PairEval>,
        pass: Pass,
        flagged: &mut HashSet<usize>,
        report: &mut ScanReport,
    ) {
        for k in 0..evals.len() {
            if pass.skips(&evals[k], flagged) {
                continue;
            }
            if evals[k].verdict.is_uncertain() {
                report.escalations += self.escalate_from(entries, &mut evals, k, pass, flagged).await;
            }

            let eval = &evals[k];
            let (a, b) = (&entries[eval.first], &entries[eval.second]);
            match eval.verdict.decision {
                Decision::Duplicate => {
                    let (original, duplicate, dup_idx) = match pass {
                        Pass::Completed => (b, a, eval.first),
                        Pass::Active => match precedence(a, b) {
                            Precedence::First => (a, b, eval.second),
                            Precedence::Second => (b, a, eval.first),
                        },
                    };
                    debug!(
                        original = %original.label(),
                        duplicate = %duplicate.label(),
                        method = eval.verdict.method.as_str(),
                        "duplicate found"
                    );
                    flagged.insert(dup_idx);
                    report.duplicates.push(DuplicatePair {
                        original: original.clone(),
                        duplicate: duplicate.clone(),
                        verdict: eval.verdict.clone(),
                        against_completed: pass == Pass::Completed,
                    });
                }
                Decision::NeedsReview => report.needs_review.push(ReviewPair {
                    first: a.clone(),
                    second: b.clone(),
                    verdict: eval.verdict.clone(),
                }),
                Decision::Distinct => {}
            }
        }
    }

    /// Escalate the uncertain pair at `from` and the live uncertain pairs
    /// after it, in place. Returns how many were sent.
    async fn escalate_from(
        &self,
        entries: &[LogEntry],
        evals: &mut [PairEval],
        from: usize,
        pass: Pass,
        flagged: &HashSet<usize>,
    ) -> usize {
        let Some(escalator) = &self.escalator else {
            return 0;
        };
        let limit = self.config.max_concurrent_escalations.max(1);
        let jobs: Vec<(usize, &LogEntry, &LogEntry, f64)> = evals[from..]
            .iter()
            .enumerate()
            .filter(|(_, e)| e.verdict.is_uncertain() && !pass.skips(e, flagged))
            .take(limit)
            .map(|(k, e)| {
                (from + k, &entries[e.first], &entries[e.second], e.verdict.similarity)
            })
            .collect();
        let sent = jobs.len();
        debug!(pairs = sent, judge = escalator.judge_name(), "escalating uncertain pairs");

        let settled: Vec<(usize, Verdict)> = stream::iter(jobs)
            .map(|(k, a, b, sim)| async move { (k, escalate_pair(escalator, a, b, sim).await) })
            .buffer_unordered(limit)
            .collect()
            .await;

        for (k, verdict) in settled {
            evals[k].verdict = verdict;
        }
        sent
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Active,
    Completed,
}

impl Pass {
    /// Pass 1 drops a pair once either side is flagged; pass 2 only checks
    /// the active side, since completed entries are never flagged.
    fn skips(self, eval: &PairEval, flagged: &HashSet<usize>) -> bool {
        match self {
            Pass::Active => flagged.contains(&eval.first) || flagged.contains(&eval.second),
            Pass::Completed => flagged.contains(&eval.first),
        }
    }
}

async fn escalate_pair(escalator: &Escalator, a: &LogEntry, b: &LogEntry, similarity: f64) -> Verdict {
    let mut verdict = escalator
        .escalate(&a.text, &b.text, entry_context(a), entry_context(b))
        .await;
    verdict.similarity = similarity;
    verdict
}

/// Status and logged date, as extra context for the judge.
fn entry_context(entry: &LogEntry) -> Option<String> {
    let mut parts = Vec::new();
    if !entry.status.trim().is_empty() {
        parts.push(format!("Status: {}", entry.status.trim()));
    }
    if let Some(date) = entry.logged_date {
        parts.push(format!("Logged: {date}"));
    }
    if entry.occurrence_count > 1 {
        parts.push(format!("Seen {} times", entry.occurrence_count));
    }
    (!parts.is_empty()).then(|| parts.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use actionlog_core::parse_logged_date;
    use async_trait::async_trait;

    use crate::escalation::{EscalationError, Judge, JudgeRequest};
    use crate::verdict::Method;

    fn entry(id: u64, text: &str, status: &str, date: &str) -> LogEntry {
        LogEntry::new(id, text)
            .with_row_number(id as u32)
            .with_status(status)
            .with_logged_date(parse_logged_date(date))
    }

    fn detector() -> DuplicateDetector {
        DuplicateDetector::new(RulesEngine::default())
    }

    /// Answers every request the same way and counts calls.
    struct FixedJudge {
        reply: &'static str,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Judge for FixedJudge {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn ask(&self, _request: &JudgeRequest) -> Result<String, EscalationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.to_string())
        }
    }

    fn judged(reply: &'static str) -> (DuplicateDetector, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let judge = FixedJudge {
            reply,
            calls: calls.clone(),
        };
        let d = detector().with_escalator(Escalator::new(Box::new(judge)));
        (d, calls)
    }

    const AZURE_A: &str =
        "Azure Speech Keys Testing - Coordinate with cloud team to obtain keys";
    const AZURE_B: &str =
        "Azure speech keys testing: coordinate with the cloud team to obtain keys";
    const GO_LIVE_A: &str = "Confirm the go-live date with the vendor";
    const GO_LIVE_B: &str = "Confirm go-live readiness with vendor support";

    #[tokio::test]
    async fn earlier_logged_entry_is_original() {
        let entries = vec![
            entry(1, AZURE_A, "Open", "2025-12-05"),
            entry(2, AZURE_B, "Open", "2025-12-01"),
        ];
        let report = detector().find_duplicates(&entries).await;
        assert_eq!(report.duplicates.len(), 1);
        let pair = &report.duplicates[0];
        assert_eq!(pair.original.id, 2);
        assert_eq!(pair.duplicate.id, 1);
        assert_eq!(pair.verdict.method, Method::HighSimilarity);
        assert!(!pair.against_completed);
        assert_eq!(report.pairs_checked, 1);
    }

    #[tokio::test]
    async fn same_date_keeps_first_encountered() {
        let entries = vec![
            entry(1, AZURE_A, "Open", "2025-12-01"),
            entry(2, AZURE_B, "Open", "2025-12-01"),
        ];
        let report = detector().find_duplicates(&entries).await;
        assert_eq!(report.duplicates[0].original.id, 1);
    }

    #[tokio::test]
    async fn undated_entry_is_original() {
        let entries = vec![
            entry(1, AZURE_A, "Open", "2025-12-01"),
            entry(2, AZURE_B, "Open", ""),
        ];
        let report = detector().find_duplicates(&entries).await;
        assert_eq!(report.duplicates[0].original.id, 2);
    }

    #[tokio::test]
    async fn flagged_entry_is_not_compared_again() {
        // Three copies: the first is original for both others, and the
        // second is never treated as an original for the third.
        let entries = vec![
            entry(1, AZURE_A, "Open", "2025-12-01"),
            entry(2, AZURE_B, "Open", "2025-12-02"),
            entry(3, AZURE_A, "Open", "2025-12-03"),
        ];
        let report = detector().find_duplicates(&entries).await;
        let pairs: Vec<(u64, u64)> = report
            .duplicates
            .iter()
            .map(|d| (d.original.id, d.duplicate.id))
            .collect();
        assert_eq!(pairs, vec![(1, 2), (1, 3)]);
    }

    #[tokio::test]
    async fn resolved_entries_are_skipped() {
        let entries = vec![
            entry(1, AZURE_A, "Cancelled", "2025-12-01"),
            entry(2, AZURE_B, "Duplicate", "2025-12-02"),
            entry(3, AZURE_A, "Open", "2025-12-03"),
        ];
        let report = detector().find_duplicates(&entries).await;
        assert!(report.duplicates.is_empty());
        assert_eq!(report.active, 1);
        assert_eq!(report.pairs_checked, 0);
    }

    #[tokio::test]
    async fn blank_text_is_skipped() {
        let entries = vec![
            entry(1, "   ", "Open", "2025-12-01"),
            entry(2, "", "Open", "2025-12-01"),
        ];
        let report = detector().find_duplicates(&entries).await;
        assert_eq!(report.active, 0);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn recreated_item_folds_into_completed_one() {
        let entries = vec![
            entry(1, AZURE_A, "Completed", "2025-12-10"),
            entry(2, AZURE_B, "Open", "2025-12-01"),
        ];
        let report = detector().find_duplicates(&entries).await;
        assert_eq!(report.duplicates.len(), 1);
        let pair = &report.duplicates[0];
        // Completed wins even though it was logged later.
        assert_eq!(pair.original.id, 1);
        assert_eq!(pair.duplicate.id, 2);
        assert!(pair.against_completed);
        assert_eq!(report.completed, 1);
    }

    #[tokio::test]
    async fn completed_pass_can_be_disabled() {
        let entries = vec![
            entry(1, AZURE_A, "Done", "2025-12-10"),
            entry(2, AZURE_B, "Open", "2025-12-01"),
        ];
        let config = DetectorConfig {
            compare_completed: false,
            ..DetectorConfig::default()
        };
        let report = detector().with_config(config).find_duplicates(&entries).await;
        assert!(report.duplicates.is_empty());
        assert_eq!(report.pairs_checked, 0);
    }

    #[tokio::test]
    async fn uncertain_without_judge_needs_review() {
        let entries = vec![
            entry(1, GO_LIVE_A, "Open", "2025-12-01"),
            entry(2, GO_LIVE_B, "Open", "2025-12-02"),
        ];
        let report = detector().find_duplicates(&entries).await;
        assert!(report.duplicates.is_empty());
        assert_eq!(report.needs_review.len(), 1);
        assert_eq!(report.needs_review[0].verdict.decision, Decision::NeedsReview);
        assert_eq!(report.escalations, 0);
    }

    #[tokio::test]
    async fn judge_settles_uncertain_pairs() {
        let (d, calls) = judged(r#"{"is_duplicate": true, "confidence": 0.8, "reasoning": "same ask"}"#);
        let entries = vec![
            entry(1, GO_LIVE_A, "Open", "2025-12-03"),
            entry(2, GO_LIVE_B, "Open", "2025-12-02"),
            // Distinct from both; never escalated.
            entry(3, "Book the venue for the quarterly offsite", "Open", "2025-12-01"),
        ];
        let report = d.find_duplicates(&entries).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.escalations, 1);
        assert_eq!(report.duplicates.len(), 1);
        let pair = &report.duplicates[0];
        assert_eq!(pair.original.id, 2);
        assert_eq!(pair.verdict.method, Method::Escalated);
        assert!((pair.verdict.similarity - 0.6823529411764706).abs() < 1e-9);
        assert!(report.needs_review.is_empty());
    }

    #[tokio::test]
    async fn judge_rejection_keeps_both() {
        let (d, _) = judged(r#"{"is_duplicate": false, "confidence": 0.9, "reasoning": "different actions"}"#);
        let entries = vec![
            entry(1, GO_LIVE_A, "Open", "2025-12-01"),
            entry(2, GO_LIVE_B, "Open", "2025-12-02"),
        ];
        let report = d.find_duplicates(&entries).await;
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn broken_judge_keeps_both() {
        let (d, calls) = judged("not json at all");
        let entries = vec![
            entry(1, GO_LIVE_A, "Open", "2025-12-01"),
            entry(2, GO_LIVE_B, "Open", "2025-12-02"),
        ];
        let report = d.find_duplicates(&entries).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn pair_with_flagged_side_is_not_escalated() {
        let (d, calls) = judged(r#"{"is_duplicate": false, "confidence": 0.9, "reasoning": "different"}"#);
        let entries = vec![
            entry(1, AZURE_A, "Open", "2025-12-01"),
            entry(2, AZURE_B, "Open", "2025-12-02"),
            // Ambiguous against both, but 2 is flagged before (2, 3) is reached.
            entry(3, "Coordinate with the cloud team on speech testing", "Open", "2025-12-03"),
        ];
        let report = d.find_duplicates(&entries).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.escalations, 1);
        assert_eq!(report.pairs_checked, 3);
        assert_eq!(report.duplicates.len(), 1);
        assert!(report.needs_review.is_empty());
    }

    #[tokio::test]
    async fn original_can_later_become_a_duplicate() {
        let entries = vec![
            entry(1, AZURE_A, "Open", "2025-12-05"),
            entry(2, "Keys testing for the cloud team", "Open", "2025-12-03"),
            entry(3, AZURE_B, "Open", "2025-12-06"),
            entry(4, "Azure speech keys testing - coordinate with cloud team and obtain keys", "Open", "2025-12-01"),
        ];
        let report = detector().find_duplicates(&entries).await;
        let pairs: Vec<(u64, u64)> = report
            .duplicates
            .iter()
            .map(|d| (d.original.id, d.duplicate.id))
            .collect();
        assert_eq!(pairs, vec![(1, 3), (4, 1)]);

        // (1, 2) was queued before 1 was flagged and is dropped; (2, 3) is
        // never compared because 3 is flagged first.
        let reviews: Vec<(u64, u64)> = report
            .needs_review
            .iter()
            .map(|r| (r.first.id, r.second.id))
            .collect();
        assert_eq!(reviews, vec![(2, 4)]);
    }

    #[tokio::test]
    async fn new_item_matching_existing_increments() {
        let existing = vec![
            entry(1, "Book the venue for the quarterly offsite", "Open", "2025-11-01"),
            entry(2, AZURE_A, "Open", "2025-12-01"),
        ];
        let check = detector().check_new_item(AZURE_B, &existing).await;
        match check {
            NewItemCheck::IncrementCount { existing, verdict } => {
                assert_eq!(existing.id, 2);
                assert!(verdict.is_duplicate());
            }
            other => panic!("expected increment, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn new_item_ignores_cancelled_rows() {
        let existing = vec![entry(1, AZURE_A, "Cancelled", "2025-12-01")];
        let check = detector().check_new_item(AZURE_B, &existing).await;
        assert_eq!(check, NewItemCheck::AddNew);
        assert_eq!(check.as_str(), "add_new");
    }

    #[tokio::test]
    async fn new_item_with_only_ambiguous_matches_needs_review() {
        let existing = vec![entry(1, GO_LIVE_A, "Open", "2025-12-01")];
        let check = detector().check_new_item(GO_LIVE_B, &existing).await;
        match check {
            NewItemCheck::NeedsReview { candidates } => {
                assert_eq!(candidates.len(), 1);
                assert_eq!(candidates[0].0.id, 1);
            }
            other => panic!("expected review, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn new_item_blank_is_added() {
        let existing = vec![entry(1, AZURE_A, "Open", "2025-12-01")];
        assert_eq!(detector().check_new_item("  ", &existing).await, NewItemCheck::AddNew);
    }

    #[test]
    fn context_lists_known_fields() {
        let e = entry(1, "x", "In Progress", "2025-12-01").with_occurrence_count(3);
        assert_eq!(
            entry_context(&e).as_deref(),
            Some("Status: In Progress; Logged: 2025-12-01; Seen 3 times")
        );
        assert_eq!(entry_context(&LogEntry::new(2, "x")), None);
    }

    #[test]
    fn config_defaults_fill_missing_fields() {
        let c: DetectorConfig = serde_json::from_str(r#"{"compare_completed": false}"#).unwrap();
        assert!(!c.compare_completed);
        assert_eq!(c.max_concurrent_escalations, 4);
    }
}
