//! Action-item log entries as read from the sheet store.

use std::cmp::Ordering;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Statuses that mark an entry as already handled. Resolved entries are not
/// scanned for fresh duplicates.
pub const RESOLVED_STATUSES: &[&str] = &[
    "duplicate",
    "completed",
    "complete",
    "done",
    "cancelled",
    "canceled",
    "moved to backlog",
];

/// The "completed" family. These stay in play as comparison targets so a
/// recreated item can be matched against the one that was already closed.
pub const COMPLETED_STATUSES: &[&str] = &["completed", "complete", "done"];

/// One actionable item in the log.
///
/// `id` belongs to the sheet store; nothing in this workspace generates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    /// 1-based position in the sheet, for human-readable reports.
    pub row_number: Option<u32>,
    pub text: String,
    pub status: String,
    pub logged_date: Option<NaiveDate>,
    pub occurrence_count: u32,
}

impl LogEntry {
    pub fn new(id: u64, text: impl Into<String>) -> Self {
        Self {
            id,
            row_number: None,
            text: text.into(),
            status: String::new(),
            logged_date: None,
            occurrence_count: 1,
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    pub fn with_logged_date(mut self, date: Option<NaiveDate>) -> Self {
        self.logged_date = date;
        self
    }

    pub fn with_row_number(mut self, row: u32) -> Self {
        self.row_number = Some(row);
        self
    }

    pub fn with_occurrence_count(mut self, count: u32) -> Self {
        self.occurrence_count = count.max(1);
        self
    }

    /// Entries with blank text never take part in comparison.
    pub fn is_comparable(&self) -> bool {
        !self.text.trim().is_empty()
    }

    pub fn is_resolved(&self) -> bool {
        status_in(&self.status, RESOLVED_STATUSES)
    }

    pub fn is_completed(&self) -> bool {
        status_in(&self.status, COMPLETED_STATUSES)
    }

    pub fn is_active(&self) -> bool {
        !self.is_resolved()
    }

    /// Row label for reports: the row number when known, else the store id.
    pub fn label(&self) -> String {
        match self.row_number {
            Some(n) => format!("Row {n}"),
            None => format!("#{}", self.id),
        }
    }
}

fn status_in(status: &str, set: &[&str]) -> bool {
    let status = status.trim().to_lowercase();
    set.contains(&status.as_str())
}

/// Which side of a confirmed duplicate pair is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precedence {
    /// The first argument is the original.
    First,
    /// The second argument is the original.
    Second,
}

/// Decide which of two entries is the original.
///
/// `first` must be the entry encountered first by the caller. A missing date
/// sorts before every real date; equal dates keep the first-encountered entry.
pub fn precedence(first: &LogEntry, second: &LogEntry) -> Precedence {
    match cmp_logged(first.logged_date, second.logged_date) {
        Ordering::Less | Ordering::Equal => Precedence::First,
        Ordering::Greater => Precedence::Second,
    }
}

fn cmp_logged(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Ordering {
    // `None < Some(_)` gives the minimal sentinel for free.
    a.cmp(&b)
}

/// Parse a `YYYY-MM-DD` date cell. Anything else is treated as absent.
pub fn parse_logged_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    // Sheet cells sometimes carry a full timestamp; the date part is enough.
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}
