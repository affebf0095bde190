//! Error types for the export library.

use thiserror::Error;

/// Main error type for export operations.
#[derive(Error, Debug)]
pub enum ExportError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Engine kind string not recognized.
    #[error("Unsupported source engine: {0}")]
    UnsupportedEngine(String),

    /// Source database connection failed. Fatal: aborts the run.
    #[error("Source connection failed: {0}")]
    Connect(String),

    /// Catalog metadata extraction failed. Fatal: aborts the run.
    #[error("Metadata extraction failed: {0}")]
    MetadataExtraction(String),

    /// Scan specification could not be built for a table. Recovered
    /// per table: the table is skipped and recorded as failed.
    #[error("Scan resolution failed for table {table}: {message}")]
    ScanResolution { table: String, message: String },

    /// Data transfer failed for a specific table. Recovered per table.
    #[error("Transfer failed for table {table}: {message}")]
    Transfer { table: String, message: String },

    /// Metadata artifact write failed (remote and fallback).
    #[error("Artifact write failed for {path}: {message}")]
    ArtifactWrite { path: String, message: String },

    /// Export ledger flush failed (remote and fallback).
    #[error("Ledger flush failed: {0}")]
    LedgerFlush(String),

    /// Storage engine (DuckDB) error.
    #[error("Storage engine error: {0}")]
    Engine(#[from] duckdb::Error),

    /// SQL Server catalog error.
    #[error("SQL Server catalog error: {0}")]
    Mssql(#[from] tiberius::error::Error),

    /// PostgreSQL catalog error.
    #[error("PostgreSQL catalog error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Oracle (ODBC) catalog error.
    #[cfg(feature = "oracle")]
    #[error("Oracle catalog error: {0}")]
    Odbc(#[from] odbc_api::Error),

    /// IO error (file operations, local fallback writes)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV error (local ledger fallback)
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Export run was cancelled (SIGINT, etc.)
    #[error("Export cancelled")]
    Cancelled,
}

impl ExportError {
    /// Create a ScanResolution error.
    pub fn scan(table: impl Into<String>, message: impl Into<String>) -> Self {
        ExportError::ScanResolution {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Transfer error.
    pub fn transfer(table: impl Into<String>, message: impl Into<String>) -> Self {
        ExportError::Transfer {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create an ArtifactWrite error.
    pub fn artifact(path: impl Into<String>, message: impl Into<String>) -> Self {
        ExportError::ArtifactWrite {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }

    /// Process exit code for this error.
    ///
    /// Only connection and metadata extraction failures are fatal to a run;
    /// per-table failures never surface here (they live in the ledger).
    pub fn exit_code(&self) -> u8 {
        match self {
            ExportError::Config(_) | ExportError::UnsupportedEngine(_) | ExportError::Yaml(_) => 2,
            ExportError::Connect(_) => 3,
            ExportError::MetadataExtraction(_) => 4,
            ExportError::Cancelled => 130,
            _ => 1,
        }
    }
}

/// Result type alias for export operations.
pub type Result<T> = std::result::Result<T, ExportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(ExportError::Config("x".into()).exit_code(), 2);
        assert_eq!(ExportError::Connect("x".into()).exit_code(), 3);
        assert_eq!(ExportError::MetadataExtraction("x".into()).exit_code(), 4);
        assert_eq!(ExportError::transfer("t", "m").exit_code(), 1);
    }

    #[test]
    fn test_transfer_error_message() {
        let err = ExportError::transfer("sales.orders", "connection reset");
        assert_eq!(
            err.to_string(),
            "Transfer failed for table sales.orders: connection reset"
        );
    }
}
