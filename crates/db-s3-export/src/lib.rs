//! # db-s3-export
//!
//! Snapshot export of relational databases to S3, driven by an
//! embedded DuckDB engine.
//!
//! Connects to a SQL Server, PostgreSQL, or Oracle source, extracts
//! the full schema catalog, and writes:
//!
//! - **Table data** as zstd-compressed parquet, one file per table,
//!   deterministically ordered
//! - **DDL and definitions** for tables, views, and routines as text
//! - **A metadata snapshot** of the whole catalog as JSON
//! - **An export ledger** recording the outcome of every table
//!
//! A failing table never aborts the run; only connection and metadata
//! extraction failures do.
//!
//! ## Example
//!
//! ```rust,no_run
//! use db_s3_export::{Config, Orchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> db_s3_export::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let mut orchestrator = Orchestrator::new(config).await?;
//!     let result = orchestrator.run(CancellationToken::new()).await?;
//!     println!(
//!         "exported {} of {} tables",
//!         result.tables_succeeded, result.tables_total
//!     );
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod orchestrator;
pub mod scan;
pub mod transfer;

// Re-exports for convenient access
pub use config::{AuthMode, Config, EngineKind, ExportConfig, SourceConfig, StorageConfig};
pub use crate::core::schema::{DatabaseMetadata, TableDescriptor};
pub use crate::core::ExportTarget;
pub use engine::{CopyOptions, DuckDbEngine, StorageEngine};
pub use error::{ExportError, Result};
pub use ledger::{EntryStatus, ExportLedger, LedgerEntry};
pub use orchestrator::{ExportResult, Orchestrator, Phase};
pub use scan::{select_sort_order, ScanSpec};
pub use transfer::TransferExecutor;
