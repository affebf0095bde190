//! Export run orchestration.
//!
//! Drives one export run end to end: connect to the source catalog,
//! extract metadata, write the metadata artifacts, export every table,
//! flush the ledger. Connection and metadata failures abort the run;
//! a failing table only marks its ledger entry and the run moves on.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::catalog::{self, CatalogAdapter};
use crate::config::Config;
use crate::core::paths::ExportTarget;
use crate::core::schema::{DatabaseMetadata, TableDescriptor};
use crate::engine::{DuckDbEngine, StorageEngine};
use crate::error::{ExportError, Result};
use crate::ledger::{EntryStatus, ExportLedger};
use crate::scan::{self, select_sort_order};
use crate::transfer::TransferExecutor;

/// Run phase, in strict forward order. `Failed` is only reachable
/// before table export begins; after that, failures are per table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Init,
    Connected,
    MetadataExtracted,
    Exporting,
    Done,
    Failed,
}

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct ExportResult {
    pub database: String,
    pub tables_total: usize,
    pub tables_succeeded: usize,
    pub tables_failed: usize,
    pub views_written: usize,
    pub routines_written: usize,
    pub metadata_path: String,
    pub ledger_path: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

pub struct Orchestrator {
    config: Config,
    catalog: Box<dyn CatalogAdapter>,
    transfer: TransferExecutor,
    target: ExportTarget,
    ledger: ExportLedger,
    phase: Phase,
}

impl Orchestrator {
    /// Build an orchestrator with the default DuckDB storage engine.
    pub async fn new(config: Config) -> Result<Self> {
        let catalog = catalog::for_engine(&config.source)?;
        let engine: Arc<dyn StorageEngine> =
            Arc::new(DuckDbEngine::initialize(config.source.engine, &config.storage).await?);
        Ok(Self::with_collaborators(config, catalog, engine))
    }

    /// Build an orchestrator over explicit collaborators. Used by tests
    /// to substitute the catalog and storage engine.
    pub fn with_collaborators(
        config: Config,
        catalog: Box<dyn CatalogAdapter>,
        engine: Arc<dyn StorageEngine>,
    ) -> Self {
        let transfer = TransferExecutor::new(engine, &config.export);
        let target = ExportTarget::new(config.storage.bucket_root.clone());
        Self {
            config,
            catalog,
            transfer,
            target,
            ledger: ExportLedger::new(),
            phase: Phase::Init,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn ledger(&self) -> &ExportLedger {
        &self.ledger
    }

    /// Execute the run. The returned error, if any, reflects only
    /// connection and metadata health; per-table outcomes live in the
    /// ledger and the result counts.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<ExportResult> {
        let started_at = Utc::now();
        info!(
            engine = %self.config.source.engine,
            database = %self.config.source.database,
            root = %self.target.root(),
            "starting export run"
        );

        let metadata = match self.connect_and_extract().await {
            Ok(metadata) => metadata,
            Err(e) => {
                self.phase = Phase::Failed;
                return Err(e);
            }
        };

        let (metadata_path, views_written, routines_written) =
            self.write_metadata_artifacts(&metadata, started_at).await;

        self.phase = Phase::Exporting;
        for table in &metadata.tables {
            if cancel.is_cancelled() {
                warn!("cancellation requested, stopping table export");
                self.flush_ledger(started_at).await;
                return Err(ExportError::Cancelled);
            }
            export_table(
                &self.config,
                &self.transfer,
                &self.target,
                &mut self.ledger,
                table,
            )
            .await;
        }

        let ledger_path = self.flush_ledger(started_at).await;
        if let Err(e) = self.catalog.close().await {
            warn!(error = %e, "error closing catalog connection");
        }
        self.phase = Phase::Done;

        let result = ExportResult {
            database: metadata.database.clone(),
            tables_total: metadata.tables.len(),
            tables_succeeded: self.ledger.success_count(),
            tables_failed: self.ledger.failure_count(),
            views_written,
            routines_written,
            metadata_path,
            ledger_path,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            tables = result.tables_total,
            succeeded = result.tables_succeeded,
            failed = result.tables_failed,
            "export run complete"
        );
        Ok(result)
    }

    async fn connect_and_extract(&mut self) -> Result<DatabaseMetadata> {
        self.catalog.connect().await?;
        self.phase = Phase::Connected;

        let metadata = self.catalog.extract_metadata().await.map_err(|e| match e {
            ExportError::MetadataExtraction(_) => e,
            other => ExportError::MetadataExtraction(other.to_string()),
        })?;
        self.phase = Phase::MetadataExtracted;
        info!(tables = metadata.tables.len(), "metadata extracted");
        Ok(metadata)
    }

    /// Write the JSON snapshot, per-table DDL, and view/routine
    /// definitions. Artifact failures are logged, never fatal.
    async fn write_metadata_artifacts(
        &self,
        metadata: &DatabaseMetadata,
        stamp: DateTime<Utc>,
    ) -> (String, usize, usize) {
        let metadata_path = self.target.metadata_json(stamp);
        match serde_json::to_string_pretty(metadata) {
            Ok(json) => {
                if let Err(e) = self.transfer.write_blob(&metadata_path, &json).await {
                    error!(path = %metadata_path, error = %e, "failed to write metadata snapshot");
                }
            }
            Err(e) => error!(error = %e, "failed to serialize metadata snapshot"),
        }

        for table in &metadata.tables {
            let path = self.target.table_ddl(&table.schema, &table.name);
            if let Err(e) = self.transfer.write_blob(&path, &table.ddl).await {
                warn!(table = %table.full_name(), error = %e, "failed to write table DDL");
            }
        }

        let mut views_written = 0;
        for view in &metadata.views {
            let path = self.target.view_definition(&view.schema, &view.name);
            match self.transfer.write_blob(&path, &view.definition).await {
                Ok(()) => views_written += 1,
                Err(e) => warn!(view = %view.full_name(), error = %e, "failed to write view definition"),
            }
        }

        let mut routines_written = 0;
        for routine in &metadata.routines {
            let path = self.target.routine_definition(&routine.schema, &routine.name);
            match self.transfer.write_blob(&path, &routine.definition).await {
                Ok(()) => routines_written += 1,
                Err(e) => warn!(routine = %routine.full_name(), error = %e, "failed to write routine definition"),
            }
        }

        (metadata_path, views_written, routines_written)
    }

    async fn flush_ledger(&self, stamp: DateTime<Utc>) -> String {
        let path = self.target.export_log(stamp);
        if let Err(e) = self.ledger.flush(&self.transfer, &path).await {
            error!(path = %path, error = %e, "failed to flush export ledger");
        }
        path
    }
}

/// Export one table, recording the outcome in the ledger. Never
/// returns an error: failure is a ledger state.
async fn export_table(
    config: &Config,
    transfer: &TransferExecutor,
    target: &ExportTarget,
    ledger: &mut ExportLedger,
    table: &TableDescriptor,
) {
    let destination = target.table_data(&table.schema, &table.name);
    let entry = ledger.start(&table.schema, &table.name, &destination);

    let sort_order = select_sort_order(table);
    let spec = match scan::resolve(&config.source, table, &sort_order) {
        Ok(spec) => spec,
        Err(e) => {
            error!(table = %table.full_name(), error = %e, "scan resolution failed");
            ledger.finish(entry, EntryStatus::Failed, e.to_string());
            return;
        }
    };

    info!(table = %table.full_name(), destination = %destination, "exporting table");
    match transfer.write_table(&spec, &sort_order, &destination).await {
        Ok(()) => {
            info!(table = %table.full_name(), "table exported");
            ledger.finish(
                entry,
                EntryStatus::Success,
                format!("Exported to {destination}"),
            );
        }
        Err(e) => {
            error!(table = %table.full_name(), error = %e, "table export failed");
            ledger.finish(entry, EntryStatus::Failed, e.to_string());
        }
    }
}
