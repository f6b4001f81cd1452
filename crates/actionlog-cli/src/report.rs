//! Human-readable output for scans, plans and checks.

use std::collections::BTreeMap;

use actionlog_ai::{NewItemCheck, ScanReport, Verdict};
use actionlog_core::LogEntry;
use actionlog_sync::{CleanupOutcome, CleanupPlan};

const TEXT_WIDTH: usize = 60;
const RULE: &str = "======================================================================";

pub fn print_header(title: &str) {
    println!("{RULE}");
    println!("{title}");
    println!("{RULE}");
}

pub fn print_scan(report: &ScanReport) {
    println!(
        "Compared {} pairs across {} active and {} completed entries ({} escalated).",
        report.pairs_checked, report.active, report.completed, report.escalations
    );

    if report.is_clean() {
        println!("\n[OK] No duplicates found.");
        return;
    }

    if !report.duplicates.is_empty() {
        println!("\nDuplicates ({}):", report.duplicates.len());
        for pair in &report.duplicates {
            let kind = if pair.against_completed {
                " [completed]"
            } else {
                ""
            };
            println!(
                "  {} -> duplicate of {}{kind}",
                pair.duplicate.label(),
                pair.original.label()
            );
            println!("      dup:  {}", preview(&pair.duplicate));
            println!("      orig: {}", preview(&pair.original));
            println!("      why:  {}", describe(&pair.verdict));
        }
    }

    if !report.needs_review.is_empty() {
        println!("\nNeeds review ({}):", report.needs_review.len());
        for pair in &report.needs_review {
            println!("  {} <-> {}", pair.first.label(), pair.second.label());
            println!("      a:   {}", preview(&pair.first));
            println!("      b:   {}", preview(&pair.second));
            println!("      why: {}", pair.verdict.reasoning);
        }
    }
}

pub fn print_plan(plan: &CleanupPlan) {
    println!(
        "\nPlan ({}): {} row update(s), {} deletion(s)",
        plan.mode.as_str(),
        plan.updates.len(),
        plan.deletions.len()
    );
    for u in &plan.updates {
        let mut fields = Vec::new();
        if let Some(s) = &u.status {
            fields.push(format!("status={s}"));
        }
        if let Some(c) = u.occurrence_count {
            fields.push(format!("count={c}"));
        }
        if let Some(n) = &u.notes {
            fields.push(format!("note={n:?}"));
        }
        println!("  update #{}: {}", u.id, fields.join(", "));
    }
    if !plan.deletions.is_empty() {
        let ids: Vec<String> = plan.deletions.iter().map(|id| format!("#{id}")).collect();
        println!("  delete: {}", ids.join(" "));
    }
}

pub fn print_outcome(outcome: &CleanupOutcome) {
    println!(
        "\n[OK] Updated {} row(s), deleted {} row(s).",
        outcome.updated, outcome.deleted
    );
}

pub fn print_check(text: &str, check: &NewItemCheck) {
    println!("Item: {}", truncate(text, TEXT_WIDTH));
    println!("Recommendation: {}", check.as_str());
    match check {
        NewItemCheck::AddNew => println!("  No existing entry matches."),
        NewItemCheck::IncrementCount { existing, verdict } => {
            println!(
                "  Matches {} (seen {} time(s)): {}",
                existing.label(),
                existing.occurrence_count,
                preview(existing)
            );
            println!("  why: {}", describe(verdict));
            if let Some(merged) = &verdict.suggested_merged_text {
                println!("  suggested wording: {merged}");
            }
        }
        NewItemCheck::NeedsReview { candidates } => {
            for (entry, verdict) in candidates {
                println!("  Possible match {}: {}", entry.label(), preview(entry));
                println!("      why: {}", verdict.reasoning);
            }
        }
    }
}

/// Entry counts per status, blank statuses grouped under `(blank)`.
pub fn status_counts(entries: &[LogEntry]) -> BTreeMap<String, (usize, bool)> {
    let mut counts: BTreeMap<String, (usize, bool)> = BTreeMap::new();
    for e in entries {
        let status = e.status.trim();
        let key = if status.is_empty() {
            "(blank)".to_string()
        } else {
            status.to_string()
        };
        let slot = counts.entry(key).or_insert((0, e.is_resolved()));
        slot.0 += 1;
    }
    counts
}

pub fn print_status(entries: &[LogEntry]) {
    println!("{} entries", entries.len());
    println!("\n{:<30} {:>6}  handled", "status", "count");
    for (status, (count, handled)) in status_counts(entries) {
        let flag = if handled { "yes" } else { "" };
        println!("{status:<30} {count:>6}  {flag}");
    }
}

fn describe(verdict: &Verdict) -> String {
    format!(
        "{} ({:.0}% confidence): {}",
        verdict.method.as_str(),
        verdict.confidence * 100.0,
        verdict.reasoning
    )
}

fn preview(entry: &LogEntry) -> String {
    truncate(&entry.text, TEXT_WIDTH)
}

/// Cut to `max` chars, marking the cut with "...".
fn truncate(text: &str, max: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", cut.trim_end())
}
