//! Storage engine abstraction.
//!
//! The storage engine owns the movement of bytes: scanning source rows
//! and writing parquet/text artifacts to the destination. Everything
//! above it (transfer, ledger, orchestrator) talks to this trait, which
//! keeps those layers testable without a live engine.

pub mod duckdb;

use async_trait::async_trait;

pub use self::duckdb::DuckDbEngine;

use crate::config::ExportConfig;
use crate::error::Result;
use crate::scan::ScanSpec;

/// Options applied to every parquet COPY.
#[derive(Debug, Clone)]
pub struct CopyOptions {
    pub compression: String,
    pub row_group_size: usize,
}

impl CopyOptions {
    pub fn from_config(export: &ExportConfig) -> Self {
        Self {
            compression: export.compression.clone(),
            row_group_size: export.row_group_size,
        }
    }
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            compression: "zstd".into(),
            row_group_size: 100_000,
        }
    }
}

/// Executes scans and writes against the destination.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Scan a table per `spec` and write the rows to `destination` as
    /// parquet. `order_by` is applied for native scans; ODBC scans
    /// carry their ordering inside the pushed-down statement.
    async fn execute_copy(
        &self,
        spec: &ScanSpec,
        order_by: &[String],
        destination: &str,
        options: &CopyOptions,
    ) -> Result<()>;

    /// Write a text blob (DDL, JSON, definitions) to `destination`.
    async fn write_literal(&self, destination: &str, content: &str) -> Result<()>;

    /// Write in-memory rows to `destination` as parquet. Used for the
    /// export ledger. `rows` are string-rendered values, `None` is NULL.
    async fn copy_values(
        &self,
        columns: &[String],
        rows: &[Vec<Option<String>>],
        destination: &str,
        options: &CopyOptions,
    ) -> Result<()>;
}
