//! The storage boundary the cleanup path writes through.

use actionlog_core::LogEntry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::http::SyncError;

/// Field changes for one row. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryUpdate {
    pub id: u64,
    pub status: Option<String>,
    pub notes: Option<String>,
    pub occurrence_count: Option<u32>,
}

impl EntryUpdate {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.notes.is_none() && self.occurrence_count.is_none()
    }
}

/// A log of action items held somewhere else (a sheet service, a test double).
#[async_trait]
pub trait SheetStore: Send + Sync {
    /// All rows with action text, in sheet order.
    async fn fetch_entries(&self) -> Result<Vec<LogEntry>, SyncError>;

    /// Apply field updates. Returns the number of rows updated.
    async fn update_rows(&self, updates: &[EntryUpdate]) -> Result<usize, SyncError>;

    /// Delete rows by id. Returns the number of rows deleted.
    async fn delete_rows(&self, ids: &[u64]) -> Result<usize, SyncError>;
}
