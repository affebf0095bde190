//! Transfer execution and the local fallback policy.
//!
//! Wraps the storage engine with the one piece of policy it should not
//! know about: when a remote write fails and fallback is enabled, the
//! artifact is written under a local directory instead, at the remote
//! path with its scheme prefix stripped. Table data is never written
//! locally; only text artifacts and the ledger fall back.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, warn};

use crate::config::ExportConfig;
use crate::engine::{CopyOptions, StorageEngine};
use crate::error::{ExportError, Result};
use crate::scan::ScanSpec;

pub struct TransferExecutor {
    engine: Arc<dyn StorageEngine>,
    options: CopyOptions,
    fallback_enabled: bool,
    fallback_dir: PathBuf,
}

impl TransferExecutor {
    pub fn new(engine: Arc<dyn StorageEngine>, export: &ExportConfig) -> Self {
        Self {
            engine,
            options: CopyOptions::from_config(export),
            fallback_enabled: export.local_fallback,
            fallback_dir: PathBuf::from(&export.local_fallback_dir),
        }
    }

    pub fn options(&self) -> &CopyOptions {
        &self.options
    }

    /// Copy one table's rows to `destination`. No fallback: a failed
    /// table copy is recorded in the ledger, not retried locally.
    pub async fn write_table(
        &self,
        spec: &ScanSpec,
        order_by: &[String],
        destination: &str,
    ) -> Result<()> {
        self.engine
            .execute_copy(spec, order_by, destination, &self.options)
            .await
    }

    /// Write a text artifact, falling back to a local file when the
    /// remote write fails and fallback is enabled.
    pub async fn write_blob(&self, destination: &str, content: &str) -> Result<()> {
        match self.engine.write_literal(destination, content).await {
            Ok(()) => Ok(()),
            Err(remote_err) if self.fallback_enabled => {
                warn!(
                    destination,
                    error = %remote_err,
                    "remote write failed, falling back to local file"
                );
                let local = self.local_fallback_path(destination);
                if let Some(parent) = local.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&local, content).await.map_err(|e| {
                    error!(path = %local.display(), "local fallback write failed");
                    ExportError::artifact(
                        destination,
                        format!("remote: {remote_err}; local: {e}"),
                    )
                })?;
                warn!(path = %local.display(), "artifact saved locally instead");
                Ok(())
            }
            Err(remote_err) => Err(ExportError::artifact(destination, remote_err.to_string())),
        }
    }

    /// Write in-memory rows as parquet; used by the ledger flush.
    pub async fn write_rows(
        &self,
        columns: &[String],
        rows: &[Vec<Option<String>>],
        destination: &str,
    ) -> Result<()> {
        self.engine
            .copy_values(columns, rows, destination, &self.options)
            .await
    }

    pub fn fallback_enabled(&self) -> bool {
        self.fallback_enabled
    }

    /// Map a remote destination to its local fallback path: strip the
    /// scheme prefix and join the remainder under the fallback dir.
    pub fn local_fallback_path(&self, destination: &str) -> PathBuf {
        let stripped = strip_scheme(destination);
        self.fallback_dir.join(stripped)
    }
}

fn strip_scheme(destination: &str) -> &str {
    match destination.find("://") {
        Some(idx) => &destination[idx + 3..],
        None => destination.trim_start_matches('/'),
    }
}

/// Ensure the parent directory of `path` exists. Shared by callers that
/// write local files outside the executor.
pub async fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Engine stub that fails remote writes and records calls.
    struct FailingEngine {
        literal_calls: Mutex<Vec<String>>,
    }

    impl FailingEngine {
        fn new() -> Self {
            Self {
                literal_calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl StorageEngine for FailingEngine {
        async fn execute_copy(
            &self,
            _spec: &ScanSpec,
            _order_by: &[String],
            destination: &str,
            _options: &CopyOptions,
        ) -> Result<()> {
            Err(ExportError::transfer(destination, "simulated failure"))
        }

        async fn write_literal(&self, destination: &str, _content: &str) -> Result<()> {
            self.literal_calls
                .lock()
                .unwrap()
                .push(destination.to_string());
            Err(ExportError::artifact(destination, "simulated failure"))
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

    fn executor_with(dir: &Path, fallback: bool) -> TransferExecutor {
        let export = ExportConfig {
            local_fallback: fallback,
            local_fallback_dir: dir.to_string_lossy().into_owned(),
            ..ExportConfig::default()
        };
        TransferExecutor::new(Arc::new(FailingEngine::new()), &export)
    }

    #[test]
    fn test_strip_scheme() {
        assert_eq!(strip_scheme("s3://bucket/a/b.sql"), "bucket/a/b.sql");
        assert_eq!(strip_scheme("gs://bucket/x"), "bucket/x");
        assert_eq!(strip_scheme("/already/local"), "already/local");
    }

    #[test]
    fn test_local_fallback_path() {
        let executor = executor_with(Path::new("local_export"), true);
        assert_eq!(
            executor.local_fallback_path("s3://bucket/metadata/tables/sales/orders.sql"),
            PathBuf::from("local_export/bucket/metadata/tables/sales/orders.sql")
        );
    }

    #[tokio::test]
    async fn test_write_blob_falls_back_to_local_file() {
        let tmp = tempfile::tempdir().unwrap();
        let executor = executor_with(tmp.path(), true);

        let destination = "s3://bucket/metadata/tables/sales/orders.sql";
        let content = "CREATE TABLE orders (id int);";
        executor.write_blob(destination, content).await.unwrap();

        let local = executor.local_fallback_path(destination);
        let written = std::fs::read_to_string(&local).unwrap();
        assert_eq!(written, content);
    }

    #[tokio::test]
    async fn test_write_blob_fails_when_fallback_disabled() {
        let tmp = tempfile::tempdir().unwrap();
        let executor = executor_with(tmp.path(), false);

        let err = executor
            .write_blob("s3://bucket/x.sql", "content")
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::ArtifactWrite { .. }));
        // Nothing written locally.
        assert!(std::fs::read_dir(tmp.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn test_write_table_has_no_fallback() {
        let tmp = tempfile::tempdir().unwrap();
        let executor = executor_with(tmp.path(), true);
        let spec = ScanSpec::NativeScan {
            connection_string: "host=h".into(),
            schema: "public".into(),
            table: "orders".into(),
        };
        let err = executor
            .write_table(&spec, &[], "s3://bucket/public/orders/orders.parquet")
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::Transfer { .. }));
        assert!(std::fs::read_dir(tmp.path()).unwrap().next().is_none());
    }
}
