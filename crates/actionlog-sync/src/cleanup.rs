//! Turning a scan report into sheet writes.
//!
//! Two strategies:
//!
//! - **mark** keeps every row and sets each duplicate's status to `Duplicate`
//!   with a note pointing at its original.
//! - **merge** adds each duplicate's occurrence count to its original's, then
//!   deletes the duplicate rows.
//!
//! Pairs that still need review are never part of a plan.

use std::collections::HashMap;

use actionlog_ai::ScanReport;
use actionlog_core::LogEntry;
use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::info;

use crate::http::SyncError;
use crate::store::{EntryUpdate, SheetStore};

pub const DUPLICATE_STATUS: &str = "Duplicate";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupMode {
    Mark,
    Merge,
}

impl CleanupMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mark => "mark",
            Self::Merge => "merge",
        }
    }
}

/// Writes to perform, in order: updates first, then deletions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanupPlan {
    pub mode: CleanupMode,
    pub updates: Vec<EntryUpdate>,
    pub deletions: Vec<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupOutcome {
    pub updated: usize,
    pub deleted: usize,
}

impl CleanupPlan {
    /// Mark each duplicate in place. The note names the end of the chain,
    /// so a row whose original is itself marked points at the surviving one.
    pub fn mark(report: &ScanReport) -> Self {
        let chains = Chains::new(report);
        let updates = report
            .duplicates
            .iter()
            .map(|pair| {
                let original = chains.root_entry(pair.original.id).unwrap_or(&pair.original);
                EntryUpdate {
                    status: Some(DUPLICATE_STATUS.to_string()),
                    notes: Some(duplicate_note(original)),
                    ..EntryUpdate::new(pair.duplicate.id)
                }
            })
            .collect();
        Self {
            mode: CleanupMode::Mark,
            updates,
            deletions: Vec::new(),
        }
    }

    /// Fold duplicates into their originals' occurrence counts and delete
    /// them. `now` stamps the note left on each original.
    ///
    /// An original that is itself a duplicate of something else (a recreated
    /// item matched against a completed one) passes its increments on, so no
    /// count is written to a row that is about to be deleted.
    pub fn merge(report: &ScanReport, now: NaiveDateTime) -> Self {
        let chains = Chains::new(report);

        // Keep originals in first-seen order for a stable plan. A duplicate
        // row brings its own count along; `rows` is what the note reports.
        let mut order: Vec<u64> = Vec::new();
        let mut increments: HashMap<u64, (u32, u32)> = HashMap::new();
        for pair in &report.duplicates {
            let target = chains.root(pair.original.id);
            if !increments.contains_key(&target) {
                order.push(target);
            }
            let (added, rows) = increments.entry(target).or_insert((0, 0));
            *added = added.saturating_add(pair.duplicate.occurrence_count.max(1));
            *rows += 1;
        }

        let stamp = now.format("%Y-%m-%d %H:%M");
        let updates = order
            .iter()
            .filter_map(|&id| {
                let original = chains.root_entry(id)?;
                let (added, rows) = increments[&id];
                Some(EntryUpdate {
                    occurrence_count: Some(original.occurrence_count.saturating_add(added)),
                    notes: Some(format!(
                        "[{stamp}] Occurrence count updated: {rows} duplicate(s) merged"
                    )),
                    ..EntryUpdate::new(id)
                })
            })
            .collect();

        let mut deletions: Vec<u64> = Vec::new();
        for pair in &report.duplicates {
            if !deletions.contains(&pair.duplicate.id) {
                deletions.push(pair.duplicate.id);
            }
        }

        Self {
            mode: CleanupMode::Merge,
            updates,
            deletions,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.deletions.is_empty()
    }

    /// Write the plan. Deletions only run once every update succeeded.
    pub async fn apply(&self, store: &dyn SheetStore) -> Result<CleanupOutcome, SyncError> {
        let mut outcome = CleanupOutcome::default();
        if !self.updates.is_empty() {
            outcome.updated = store.update_rows(&self.updates).await?;
        }
        if !self.deletions.is_empty() {
            outcome.deleted = store.delete_rows(&self.deletions).await?;
        }
        info!(
            mode = self.mode.as_str(),
            updated = outcome.updated,
            deleted = outcome.deleted,
            "cleanup applied"
        );
        Ok(outcome)
    }
}

/// Duplicate-to-original links from a report, followed to the entry that
/// survives cleanup.
struct Chains<'a> {
    parent: HashMap<u64, u64>,
    originals: HashMap<u64, &'a LogEntry>,
}

impl<'a> Chains<'a> {
    fn new(report: &'a ScanReport) -> Self {
        Self {
            parent: report
                .duplicates
                .iter()
                .map(|p| (p.duplicate.id, p.original.id))
                .collect(),
            originals: report
                .duplicates
                .iter()
                .map(|p| (p.original.id, &p.original))
                .collect(),
        }
    }

    fn root(&self, mut id: u64) -> u64 {
        // Bounded by the number of pairs, so a malformed cycle cannot spin.
        for _ in 0..self.parent.len() {
            match self.parent.get(&id) {
                Some(&next) if next != id => id = next,
                _ => break,
            }
        }
        id
    }

    fn root_entry(&self, id: u64) -> Option<&'a LogEntry> {
        self.originals.get(&self.root(id)).copied()
    }
}

fn duplicate_note(original: &LogEntry) -> String {
    let logged = original
        .logged_date
        .map(|d| d.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    format!("Duplicate of {} (logged {logged})", original.label())
}
