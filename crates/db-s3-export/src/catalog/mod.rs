//! Source catalog adapters.
//!
//! One adapter per engine, each speaking the engine's native catalog:
//! `sys.*` over TDS for SQL Server, `information_schema`/`pg_catalog`
//! over the postgres wire protocol, and `ALL_*` views over ODBC for
//! Oracle. Adapters produce the engine-neutral [`DatabaseMetadata`]
//! model; nothing downstream knows which catalog it came from.

pub mod mssql;
#[cfg(feature = "oracle")]
pub mod oracle;
pub mod postgres;

use async_trait::async_trait;

use crate::config::{EngineKind, SourceConfig};
use crate::core::schema::DatabaseMetadata;
use crate::error::Result;

#[cfg(not(feature = "oracle"))]
use crate::error::ExportError;

/// Extracts schema metadata from a source database.
///
/// Lifecycle: `connect`, then `extract_metadata` (any number of times,
/// in practice once per run), then `close`.
#[async_trait]
pub trait CatalogAdapter: Send {
    fn engine(&self) -> EngineKind;

    async fn connect(&mut self) -> Result<()>;

    async fn extract_metadata(&mut self) -> Result<DatabaseMetadata>;

    async fn close(&mut self) -> Result<()>;
}

/// Build the adapter for the configured engine.
pub fn for_engine(source: &SourceConfig) -> Result<Box<dyn CatalogAdapter>> {
    match source.engine {
        EngineKind::SqlServer => Ok(Box::new(mssql::MssqlCatalog::new(source.clone()))),
        EngineKind::Postgres => Ok(Box::new(postgres::PostgresCatalog::new(source.clone()))),
        #[cfg(feature = "oracle")]
        EngineKind::Oracle => Ok(Box::new(oracle::OracleCatalog::new(source.clone()))),
        #[cfg(not(feature = "oracle"))]
        EngineKind::Oracle => Err(ExportError::UnsupportedEngine(
            "oracle (build with the 'oracle' feature)".into(),
        )),
    }
}
