//! Sync layer: the sheet store holding the action-item log, and the cleanup
//! plans that write scan results back to it.

pub mod cleanup;
pub mod http;
pub mod store;

pub use cleanup::{CleanupMode, CleanupOutcome, CleanupPlan, DUPLICATE_STATUS};
pub use http::{ColumnMap, SheetClient, SyncError};
pub use store::{EntryUpdate, SheetStore};
