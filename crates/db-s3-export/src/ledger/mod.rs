//! Per-table export ledger.
//!
//! Every table export gets one entry, opened before the scan is
//! resolved and closed with success or failure. The ledger lives in
//! memory for the duration of the run and is flushed once at the end,
//! as parquet via the storage engine, or as a local CSV when the
//! remote write fails and fallback is enabled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ExportError, Result};
use crate::transfer::TransferExecutor;

/// Final state of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    InProgress,
    Success,
    Failed,
}

impl EntryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryStatus::InProgress => "in_progress",
            EntryStatus::Success => "success",
            EntryStatus::Failed => "failed",
        }
    }
}

/// One table export attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub schema: String,
    pub table_name: String,
    pub full_name: String,
    pub s3_path: String,
    pub status: EntryStatus,
    pub message: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// In-memory ledger for one export run.
#[derive(Debug, Default)]
pub struct ExportLedger {
    entries: Vec<LedgerEntry>,
}

impl ExportLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an entry for a table export. Returns the entry id.
    pub fn start(&mut self, schema: &str, table: &str, s3_path: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.entries.push(LedgerEntry {
            id,
            schema: schema.to_string(),
            table_name: table.to_string(),
            full_name: format!("{schema}.{table}"),
            s3_path: s3_path.to_string(),
            status: EntryStatus::InProgress,
            message: String::new(),
            started_at: Utc::now(),
            finished_at: None,
        });
        id
    }

    /// Close an entry with its final status. Unknown ids are ignored
    /// with a warning rather than failing the run.
    pub fn finish(&mut self, id: Uuid, status: EntryStatus, message: impl Into<String>) {
        match self.entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                entry.status = status;
                entry.message = message.into();
                entry.finished_at = Some(Utc::now());
            }
            None => warn!(%id, "ledger entry not found"),
        }
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn success_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == EntryStatus::Success)
            .count()
    }

    pub fn failure_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == EntryStatus::Failed)
            .count()
    }

    /// Flush the ledger to `destination` as parquet. When the remote
    /// write fails and fallback is enabled, write a CSV under the
    /// fallback directory instead.
    pub async fn flush(&self, transfer: &TransferExecutor, destination: &str) -> Result<()> {
        let rows = self.render_rows();
        match transfer.write_rows(&column_names(), &rows, destination).await {
            Ok(()) => {
                info!(destination, entries = self.entries.len(), "export ledger written");
                Ok(())
            }
            Err(remote_err) if transfer.fallback_enabled() => {
                warn!(
                    destination,
                    error = %remote_err,
                    "ledger flush failed remotely, writing local CSV"
                );
                let local = transfer
                    .local_fallback_path(destination)
                    .with_extension("csv");
                crate::transfer::ensure_parent_dir(&local).await?;
                self.write_csv(&local)?;
                warn!(path = %local.display(), "export ledger saved locally");
                Ok(())
            }
            Err(remote_err) => Err(ExportError::LedgerFlush(format!(
                "{destination}: {remote_err}"
            ))),
        }
    }

    fn render_rows(&self) -> Vec<Vec<Option<String>>> {
        self.entries
            .iter()
            .map(|e| {
                vec![
                    Some(e.id.to_string()),
                    Some(e.schema.clone()),
                    Some(e.table_name.clone()),
                    Some(e.full_name.clone()),
                    Some(e.s3_path.clone()),
                    Some(e.status.as_str().to_string()),
                    Some(e.message.clone()),
                    Some(render_ts(e.started_at)),
                    e.finished_at.map(render_ts),
                ]
            })
            .collect()
    }

    fn write_csv(&self, path: &std::path::Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(COLUMNS)?;
        for row in self.render_rows() {
            let record: Vec<String> = row.into_iter().map(Option::unwrap_or_default).collect();
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

const COLUMNS: [&str; 9] = [
    "id",
    "schema",
    "table_name",
    "full_name",
    "s3_path",
    "status",
    "message",
    "started_at",
    "finished_at",
];

fn column_names() -> Vec<String> {
    COLUMNS.iter().map(|c| c.to_string()).collect()
}

fn render_ts(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;

    use crate::config::ExportConfig;
    use crate::engine::{CopyOptions, StorageEngine};
    use crate::scan::ScanSpec;

    /// Engine stub whose writes all fail remotely.
    struct UnreachableEngine;

    #[async_trait]
    impl StorageEngine for UnreachableEngine {
        async fn execute_copy(
            &self,
            _spec: &ScanSpec,
            _order_by: &[String],
            destination: &str,
            _options: &CopyOptions,
        ) -> Result<()> {
            Err(ExportError::transfer(destination, "unreachable"))
        }

        async fn write_literal(&self, destination: &str, _content: &str) -> Result<()> {
            Err(ExportError::artifact(destination, "unreachable"))
        }

        async fn copy_values(
            &self,
            _columns: &[String],
            _rows: &[Vec<Option<String>>],
            destination: &str,
            _options: &CopyOptions,
        ) -> Result<()> {
            Err(ExportError::LedgerFlush(destination.to_string()))
        }
    }

    #[test]
    fn test_entry_lifecycle() {
        let mut ledger = ExportLedger::new();
        let id = ledger.start("sales", "orders", "s3://b/sales/orders/orders.parquet");

        let entry = &ledger.entries()[0];
        assert_eq!(entry.status, EntryStatus::InProgress);
        assert_eq!(entry.full_name, "sales.orders");
        assert!(entry.finished_at.is_none());

        ledger.finish(id, EntryStatus::Success, "exported");
        let entry = &ledger.entries()[0];
        assert_eq!(entry.status, EntryStatus::Success);
        assert_eq!(entry.message, "exported");
        assert!(entry.finished_at.is_some());
    }

    #[test]
    fn test_counts() {
        let mut ledger = ExportLedger::new();
        let a = ledger.start("s", "t1", "s3://b/t1");
        let b = ledger.start("s", "t2", "s3://b/t2");
        let _open = ledger.start("s", "t3", "s3://b/t3");
        ledger.finish(a, EntryStatus::Success, "");
        ledger.finish(b, EntryStatus::Failed, "boom");

        assert_eq!(ledger.success_count(), 1);
        assert_eq!(ledger.failure_count(), 1);
        assert_eq!(ledger.entries().len(), 3);
    }

    #[test]
    fn test_finish_unknown_id_is_ignored() {
        let mut ledger = ExportLedger::new();
        ledger.start("s", "t", "s3://b/t");
        ledger.finish(Uuid::new_v4(), EntryStatus::Failed, "nope");
        assert_eq!(ledger.entries()[0].status, EntryStatus::InProgress);
    }

    #[test]
    fn test_render_rows_shape() {
        let mut ledger = ExportLedger::new();
        let id = ledger.start("sales", "orders", "s3://b/p");
        ledger.finish(id, EntryStatus::Failed, "it's broken");

        let rows = ledger.render_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), COLUMNS.len());
        assert_eq!(rows[0][5].as_deref(), Some("failed"));
        assert_eq!(rows[0][6].as_deref(), Some("it's broken"));
        assert!(rows[0][8].is_some());
    }

    #[tokio::test]
    async fn test_flush_falls_back_to_local_csv() {
        let tmp = tempfile::tempdir().unwrap();
        let export = ExportConfig {
            local_fallback: true,
            local_fallback_dir: tmp.path().to_string_lossy().into_owned(),
            ..ExportConfig::default()
        };
        let transfer = TransferExecutor::new(Arc::new(UnreachableEngine), &export);

        let mut ledger = ExportLedger::new();
        let id = ledger.start("sales", "orders", "s3://b/sales/orders/orders.parquet");
        ledger.finish(id, EntryStatus::Success, "ok");

        let destination = "s3://b/logs/export_log_20240307_140509.parquet";
        ledger.flush(&transfer, destination).await.unwrap();

        let local = transfer.local_fallback_path(destination).with_extension("csv");
        let contents = std::fs::read_to_string(&local).unwrap();
        assert!(contents.starts_with("id,schema,table_name"));
        assert!(contents.contains("sales.orders"));
    }

    #[tokio::test]
    async fn test_flush_errors_when_fallback_disabled() {
        let export = ExportConfig {
            local_fallback: false,
            ..ExportConfig::default()
        };
        let transfer = TransferExecutor::new(Arc::new(UnreachableEngine), &export);

        let ledger = ExportLedger::new();
        let err = ledger
            .flush(&transfer, "s3://b/logs/export_log.parquet")
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::LedgerFlush(_)));
    }

    #[test]
    fn test_write_csv() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("export_log.csv");

        let mut ledger = ExportLedger::new();
        let id = ledger.start("sales", "orders", "s3://b/p");
        ledger.finish(id, EntryStatus::Success, "ok");
        ledger.write_csv(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(
            lines.next().unwrap(),
            "id,schema,table_name,full_name,s3_path,status,message,started_at,finished_at"
        );
        assert!(lines.next().unwrap().contains("sales.orders"));
    }
}
