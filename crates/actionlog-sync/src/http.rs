//! HTTP client for a Smartsheet-style sheet API holding the action-item log.

use actionlog_core::{LogEntry, parse_logged_date};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::store::{EntryUpdate, SheetStore};

pub const DEFAULT_BASE_URL: &str = "https://api.smartsheet.com/2.0";

/// Rows sent per update or delete request.
const MAX_ROWS_PER_REQUEST: usize = 100;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no column configured for {0}")]
    MissingColumn(&'static str),
}

// ── Wire types ──

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sheet {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Row {
    pub id: u64,
    #[serde(default)]
    pub row_number: Option<u32>,
    #[serde(default)]
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    pub column_id: u64,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub display_value: Option<String>,
}

impl Cell {
    /// Raw value as text, falling back to the display value.
    pub fn text(&self) -> Option<String> {
        let raw = match &self.value {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::Bool(b)) => Some(b.to_string()),
            _ => None,
        };
        raw.or_else(|| self.display_value.clone())
            .filter(|s| !s.trim().is_empty())
    }

    /// Value as a positive count. Fractions are truncated.
    pub fn count(&self) -> Option<u32> {
        let n = match &self.value {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            _ => None,
        }?;
        (n.is_finite() && n >= 1.0).then(|| n.min(u32::MAX as f64) as u32)
    }
}

impl Row {
    pub fn cell(&self, column_id: u64) -> Option<&Cell> {
        self.cells.iter().find(|c| c.column_id == column_id)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct RowUpdate {
    id: u64,
    cells: Vec<CellUpdate>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct CellUpdate {
    column_id: u64,
    value: Value,
}

// ── Column mapping ──

/// Which sheet column holds which log field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMap {
    pub action: u64,
    pub status: u64,
    pub date_logged: u64,
    pub notes: u64,
    pub occurrence_count: Option<u64>,
}

impl ColumnMap {
    /// Map a sheet row to a log entry. Rows without action text are skipped.
    pub fn entry_from_row(&self, row: &Row) -> Option<LogEntry> {
        let text = row.cell(self.action).and_then(Cell::text)?;
        let status = row.cell(self.status).and_then(Cell::text).unwrap_or_default();
        let logged = row
            .cell(self.date_logged)
            .and_then(Cell::text)
            .and_then(|d| parse_logged_date(&d));
        let count = self
            .occurrence_count
            .and_then(|col| row.cell(col))
            .and_then(Cell::count)
            .unwrap_or(1);

        let mut entry = LogEntry::new(row.id, text.trim())
            .with_status(status.trim())
            .with_logged_date(logged)
            .with_occurrence_count(count);
        if let Some(n) = row.row_number {
            entry = entry.with_row_number(n);
        }
        Some(entry)
    }

    fn row_update(&self, update: &EntryUpdate) -> Result<RowUpdate, SyncError> {
        let mut cells = Vec::new();
        if let Some(status) = &update.status {
            cells.push(CellUpdate {
                column_id: self.status,
                value: Value::String(status.clone()),
            });
        }
        if let Some(count) = update.occurrence_count {
            let column_id = self
                .occurrence_count
                .ok_or(SyncError::MissingColumn("occurrence count"))?;
            cells.push(CellUpdate {
                column_id,
                value: Value::from(count),
            });
        }
        if let Some(notes) = &update.notes {
            cells.push(CellUpdate {
                column_id: self.notes,
                value: Value::String(notes.clone()),
            });
        }
        Ok(RowUpdate {
            id: update.id,
            cells,
        })
    }
}

// ── Client ──

/// Bearer-token client for one sheet.
pub struct SheetClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    sheet_id: u64,
    columns: ColumnMap,
}

impl SheetClient {
    /// `base_url` should be like `https://api.smartsheet.com/2.0` (no trailing slash).
    pub fn new(base_url: String, token: String, sheet_id: u64, columns: ColumnMap) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            sheet_id,
            columns,
        }
    }

    fn rows_url(&self) -> String {
        format!("{}/sheets/{}/rows", self.base_url, self.sheet_id)
    }

    /// Fetch the whole sheet, rows and cells included.
    pub async fn fetch_sheet(&self) -> Result<Sheet, SyncError> {
        let url = format!("{}/sheets/{}", self.base_url, self.sheet_id);

        info!(sheet_id = self.sheet_id, "fetching sheet");
        let resp = self.client.get(&url).bearer_auth(&self.token).send().await?;
        let resp = ensure_success(resp).await?;

        let sheet: Sheet = resp.json().await?;
        info!(name = %sheet.name, rows = sheet.rows.len(), "fetched sheet");
        Ok(sheet)
    }
}

#[async_trait]
impl SheetStore for SheetClient {
    async fn fetch_entries(&self) -> Result<Vec<LogEntry>, SyncError> {
        let sheet = self.fetch_sheet().await?;
        let entries: Vec<LogEntry> = sheet
            .rows
            .iter()
            .filter_map(|row| self.columns.entry_from_row(row))
            .collect();
        info!(entries = entries.len(), "mapped rows to entries");
        Ok(entries)
    }

    async fn update_rows(&self, updates: &[EntryUpdate]) -> Result<usize, SyncError> {
        let rows = updates
            .iter()
            .filter(|u| !u.is_empty())
            .map(|u| self.columns.row_update(u))
            .collect::<Result<Vec<_>, _>>()?;

        let url = self.rows_url();
        for batch in rows.chunks(MAX_ROWS_PER_REQUEST) {
            info!(count = batch.len(), "updating rows");
            let resp = self
                .client
                .put(&url)
                .bearer_auth(&self.token)
                .json(batch)
                .send()
                .await?;
            ensure_success(resp).await?;
        }
        Ok(rows.len())
    }

    async fn delete_rows(&self, ids: &[u64]) -> Result<usize, SyncError> {
        for batch in ids.chunks(MAX_ROWS_PER_REQUEST) {
            let url = delete_url(&self.rows_url(), batch);
            info!(count = batch.len(), "deleting rows");
            let resp = self
                .client
                .delete(&url)
                .bearer_auth(&self.token)
                .send()
                .await?;
            ensure_success(resp).await?;
        }
        Ok(ids.len())
    }
}

fn delete_url(rows_url: &str, ids: &[u64]) -> String {
    let ids: Vec<String> = ids.iter().map(u64::to_string).collect();
    format!("{rows_url}?ids={}", ids.join(","))
}

async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, SyncError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(SyncError::Server {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn columns() -> ColumnMap {
        ColumnMap {
            action: 11,
            status: 22,
            date_logged: 33,
            notes: 44,
            occurrence_count: Some(55),
        }
    }

    const SHEET_JSON: &str = r#"{
        "id": 9001,
        "name": "Action Item Log",
        "totalRowCount": 3,
        "rows": [
            {
                "id": 101,
                "rowNumber": 1,
                "cells": [
                    {"columnId": 11, "value": "Send the project plan to the client", "displayValue": "Send the project plan to the client"},
                    {"columnId": 22, "value": "Open"},
                    {"columnId": 33, "value": "2025-12-01"},
                    {"columnId": 55, "value": 3.0, "displayValue": "3"}
                ]
            },
            {
                "id": 102,
                "rowNumber": 2,
                "cells": [
                    {"columnId": 11},
                    {"columnId": 22, "value": "Open"}
                ]
            },
            {
                "id": 103,
                "rowNumber": 3,
                "cells": [
                    {"columnId": 11, "value": " Check 800 test number "},
                    {"columnId": 22, "value": "Completed"},
                    {"columnId": 33, "value": "next week"}
                ]
            }
        ]
    }"#;

    #[test]
    fn sheet_json_maps_to_entries() {
        let sheet: Sheet = serde_json::from_str(SHEET_JSON).unwrap();
        assert_eq!(sheet.rows.len(), 3);

        let entries: Vec<LogEntry> = sheet
            .rows
            .iter()
            .filter_map(|r| columns().entry_from_row(r))
            .collect();
        assert_eq!(entries.len(), 2);

        assert_eq!(entries[0].id, 101);
        assert_eq!(entries[0].row_number, Some(1));
        assert_eq!(entries[0].status, "Open");
        assert_eq!(entries[0].logged_date, NaiveDate::from_ymd_opt(2025, 12, 1));
        assert_eq!(entries[0].occurrence_count, 3);

        assert_eq!(entries[1].text, "Check 800 test number");
        assert!(entries[1].is_completed());
        assert_eq!(entries[1].logged_date, None);
        assert_eq!(entries[1].occurrence_count, 1);
    }

    #[test]
    fn cell_count_parses_numbers_and_strings() {
        let cell = |v: Value| Cell {
            column_id: 1,
            value: Some(v),
            display_value: None,
        };
        assert_eq!(cell(Value::from(4)).count(), Some(4));
        assert_eq!(cell(Value::from("2")).count(), Some(2));
        assert_eq!(cell(Value::from(0)).count(), None);
        assert_eq!(cell(Value::from("many")).count(), None);
    }

    #[test]
    fn cell_text_falls_back_to_display_value() {
        let cell = Cell {
            column_id: 1,
            value: None,
            display_value: Some("Shown".into()),
        };
        assert_eq!(cell.text().as_deref(), Some("Shown"));
    }

    #[test]
    fn row_update_serializes_camel_case() {
        let update = EntryUpdate {
            status: Some("Duplicate".into()),
            notes: Some("Duplicate of Row 4 (logged 2025-12-01)".into()),
            ..EntryUpdate::new(7)
        };
        let row = columns().row_update(&update).unwrap();
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": 7,
                "cells": [
                    {"columnId": 22, "value": "Duplicate"},
                    {"columnId": 44, "value": "Duplicate of Row 4 (logged 2025-12-01)"}
                ]
            })
        );
    }

    #[test]
    fn count_update_needs_column() {
        let mut cols = columns();
        cols.occurrence_count = None;
        let update = EntryUpdate {
            occurrence_count: Some(2),
            ..EntryUpdate::new(7)
        };
        assert!(matches!(
            cols.row_update(&update),
            Err(SyncError::MissingColumn(_))
        ));
    }

    #[test]
    fn delete_url_joins_ids() {
        assert_eq!(
            delete_url("https://api.example.com/2.0/sheets/9/rows", &[1, 22, 333]),
            "https://api.example.com/2.0/sheets/9/rows?ids=1,22,333"
        );
    }

    #[test]
    fn sheet_client_trims_trailing_slash() {
        let client = SheetClient::new(
            "https://api.smartsheet.com/2.0/".into(),
            "token".into(),
            9001,
            columns(),
        );
        assert_eq!(client.base_url, DEFAULT_BASE_URL);
        assert_eq!(client.rows_url(), "https://api.smartsheet.com/2.0/sheets/9001/rows");
    }
}
