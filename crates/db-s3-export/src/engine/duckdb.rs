//! DuckDB-backed storage engine.
//!
//! A single in-memory DuckDB connection does all the heavy lifting:
//! the httpfs extension writes to S3, the nanodbc community extension
//! scans ODBC sources, and the postgres extension scans PostgreSQL
//! natively. The connection is not Sync, so calls are serialized
//! through a mutex and run on the blocking pool.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use duckdb::Connection;
use tracing::{debug, info};

use super::{CopyOptions, StorageEngine};
use crate::config::{EngineKind, StorageConfig};
use crate::core::identifier::{escape_literal, quote_pg};
use crate::error::{ExportError, Result};
use crate::scan::ScanSpec;

pub struct DuckDbEngine {
    conn: Arc<Mutex<Connection>>,
}

impl DuckDbEngine {
    /// Open an in-memory engine, load the extensions needed for
    /// `engine_kind`, and register S3 credentials.
    pub async fn initialize(engine_kind: EngineKind, storage: &StorageConfig) -> Result<Self> {
        if let Some(profile) = &storage.aws_profile {
            // The credential chain reads AWS_PROFILE from the environment.
            std::env::set_var("AWS_PROFILE", profile);
        }

        let setup = render_setup(engine_kind, storage);
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection> {
            let conn = Connection::open_in_memory()?;
            conn.execute_batch(&setup)?;
            Ok(conn)
        })
        .await
        .map_err(join_error)??;

        info!(engine = %engine_kind, "storage engine initialized");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn execute_batch(&self, sql: String) -> Result<()> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || -> Result<()> {
            let guard = conn
                .lock()
                .map_err(|_| ExportError::Config("storage engine mutex poisoned".into()))?;
            guard.execute_batch(&sql)?;
            Ok(())
        })
        .await
        .map_err(join_error)?
    }
}

#[async_trait]
impl StorageEngine for DuckDbEngine {
    async fn execute_copy(
        &self,
        spec: &ScanSpec,
        order_by: &[String],
        destination: &str,
        options: &CopyOptions,
    ) -> Result<()> {
        let sql = render_copy(spec, order_by, destination, options);
        debug!(destination, "executing table copy");
        self.execute_batch(sql).await
    }

    async fn write_literal(&self, destination: &str, content: &str) -> Result<()> {
        let sql = render_literal_copy(destination, content);
        debug!(destination, bytes = content.len(), "writing text artifact");
        self.execute_batch(sql).await
    }

    async fn copy_values(
        &self,
        columns: &[String],
        rows: &[Vec<Option<String>>],
        destination: &str,
        options: &CopyOptions,
    ) -> Result<()> {
        let sql = render_values_copy(columns, rows, destination, options);
        debug!(destination, rows = rows.len(), "writing row set");
        self.execute_batch(sql).await
    }
}

fn join_error(e: tokio::task::JoinError) -> ExportError {
    ExportError::Io(std::io::Error::other(format!(
        "storage engine task failed: {e}"
    )))
}

/// Extension installs plus the S3 secret, as one batch.
fn render_setup(engine_kind: EngineKind, storage: &StorageConfig) -> String {
    let mut sql = String::from("INSTALL httpfs;\nLOAD httpfs;\n");
    match engine_kind {
        EngineKind::SqlServer | EngineKind::Oracle => {
            sql.push_str("INSTALL nanodbc FROM community;\nLOAD nanodbc;\n");
        }
        EngineKind::Postgres => {
            sql.push_str("INSTALL postgres;\nLOAD postgres;\n");
        }
    }
    if let Some(secret) = render_secret(storage) {
        sql.push_str(&secret);
    }
    sql
}

/// CREATE SECRET statement for S3 access, or None when the engine
/// should rely on ambient credentials.
fn render_secret(storage: &StorageConfig) -> Option<String> {
    if storage.aws_profile.is_some() {
        return Some(format!(
            "CREATE SECRET aws_secret (\n    TYPE S3,\n    PROVIDER CREDENTIAL_CHAIN,\n    CHAIN 'config;env',\n    REGION '{}'\n);\n",
            escape_literal(&storage.region)
        ));
    }

    match (&storage.access_key_id, &storage.secret_access_key) {
        (Some(key_id), Some(secret)) => {
            let mut params = format!(
                "    TYPE S3,\n    KEY_ID '{}',\n    SECRET '{}',\n    REGION '{}'",
                escape_literal(key_id),
                escape_literal(secret),
                escape_literal(&storage.region)
            );
            if let Some(token) = &storage.session_token {
                params.push_str(&format!(
                    ",\n    SESSION_TOKEN '{}'",
                    escape_literal(token)
                ));
            }
            Some(format!("CREATE SECRET aws_secret (\n{}\n);\n", params))
        }
        _ => None,
    }
}

/// The scan half of a table copy: a SELECT over the source scanner.
fn render_scan(spec: &ScanSpec, order_by: &[String]) -> String {
    match spec {
        ScanSpec::OdbcQuery {
            connection_string,
            sql_text,
        } => format!(
            "SELECT * FROM odbc_query(connection='{}', query='{}')",
            escape_literal(connection_string),
            escape_literal(sql_text)
        ),
        ScanSpec::NativeScan {
            connection_string,
            schema,
            table,
        } => {
            let mut sql = format!(
                "SELECT * FROM postgres_scan('{}', '{}', '{}')",
                escape_literal(connection_string),
                escape_literal(schema),
                escape_literal(table)
            );
            if !order_by.is_empty() {
                let cols: Vec<String> = order_by.iter().map(|c| quote_pg(c)).collect();
                sql.push_str(" ORDER BY ");
                sql.push_str(&cols.join(", "));
            }
            sql
        }
    }
}

fn render_copy(
    spec: &ScanSpec,
    order_by: &[String],
    destination: &str,
    options: &CopyOptions,
) -> String {
    format!(
        "COPY ({}) TO '{}' (FORMAT 'parquet', COMPRESSION '{}', ROW_GROUP_SIZE {});",
        render_scan(spec, order_by),
        escape_literal(destination),
        escape_literal(&options.compression.to_uppercase()),
        options.row_group_size
    )
}

fn render_literal_copy(destination: &str, content: &str) -> String {
    format!(
        "COPY (SELECT '{}' AS content) TO '{}' (FORMAT 'csv', HEADER false);",
        escape_literal(content),
        escape_literal(destination)
    )
}

fn render_values_copy(
    columns: &[String],
    rows: &[Vec<Option<String>>],
    destination: &str,
    options: &CopyOptions,
) -> String {
    let select = if rows.is_empty() {
        // Typed empty relation so the parquet file still carries the schema.
        let null_cols: Vec<String> = columns
            .iter()
            .map(|c| format!("CAST(NULL AS VARCHAR) AS {}", quote_pg(c)))
            .collect();
        format!("SELECT {} LIMIT 0", null_cols.join(", "))
    } else {
        let value_rows: Vec<String> = rows
            .iter()
            .map(|row| {
                let cells: Vec<String> = row
                    .iter()
                    .map(|cell| match cell {
                        Some(v) => format!("'{}'", escape_literal(v)),
                        None => "NULL".to_string(),
                    })
                    .collect();
                format!("({})", cells.join(", "))
            })
            .collect();
        let col_names: Vec<String> = columns.iter().map(|c| quote_pg(c)).collect();
        format!(
            "SELECT * FROM (VALUES {}) AS t({})",
            value_rows.join(", "),
            col_names.join(", ")
        )
    };

    format!(
        "COPY ({}) TO '{}' (FORMAT 'parquet', COMPRESSION '{}', ROW_GROUP_SIZE {});",
        select,
        escape_literal(destination),
        escape_literal(&options.compression.to_uppercase()),
        options.row_group_size
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> CopyOptions {
        CopyOptions::default()
    }

    #[test]
    fn test_render_odbc_copy() {
        let spec = ScanSpec::OdbcQuery {
            connection_string: "Driver={X};Uid=u;Pwd=p;".into(),
            sql_text: "SELECT * FROM [dbo].[t] ORDER BY [id]".into(),
        };
        let sql = render_copy(&spec, &[], "s3://b/dbo/t/t.parquet", &options());
        assert_eq!(
            sql,
            "COPY (SELECT * FROM odbc_query(connection='Driver={X};Uid=u;Pwd=p;', \
             query='SELECT * FROM [dbo].[t] ORDER BY [id]')) \
             TO 's3://b/dbo/t/t.parquet' \
             (FORMAT 'parquet', COMPRESSION 'ZSTD', ROW_GROUP_SIZE 100000);"
        );
    }

    #[test]
    fn test_render_native_scan_applies_order() {
        let spec = ScanSpec::NativeScan {
            connection_string: "host=h port=5432 dbname=d user=u password=p".into(),
            schema: "public".into(),
            table: "orders".into(),
        };
        let sql = render_scan(&spec, &["order_id".into(), "line_no".into()]);
        assert_eq!(
            sql,
            "SELECT * FROM postgres_scan('host=h port=5432 dbname=d user=u password=p', \
             'public', 'orders') ORDER BY \"order_id\", \"line_no\""
        );
    }

    #[test]
    fn test_quotes_in_literals_are_doubled() {
        let spec = ScanSpec::NativeScan {
            connection_string: "host=h password=it's".into(),
            schema: "pub'lic".into(),
            table: "o'rders".into(),
        };
        let sql = render_scan(&spec, &[]);
        assert!(sql.contains("password=it''s"));
        assert!(sql.contains("'pub''lic'"));
        assert!(sql.contains("'o''rders'"));
    }

    #[test]
    fn test_render_literal_copy_escapes_content() {
        let sql = render_literal_copy("s3://b/x.sql", "CREATE TABLE t (name varchar); -- O'Brien");
        assert!(sql.contains("O''Brien"));
        assert!(sql.ends_with("(FORMAT 'csv', HEADER false);"));
    }

    #[test]
    fn test_render_values_copy() {
        let columns = vec!["id".to_string(), "status".to_string()];
        let rows = vec![
            vec![Some("1".to_string()), Some("success".to_string())],
            vec![Some("2".to_string()), None],
        ];
        let sql = render_values_copy(&columns, &rows, "s3://b/log.parquet", &options());
        assert!(sql.contains("(VALUES ('1', 'success'), ('2', NULL)) AS t(\"id\", \"status\")"));
    }

    #[test]
    fn test_render_values_copy_empty_rows() {
        let columns = vec!["id".to_string()];
        let sql = render_values_copy(&columns, &[], "s3://b/log.parquet", &options());
        assert!(sql.contains("CAST(NULL AS VARCHAR) AS \"id\""));
        assert!(sql.contains("LIMIT 0"));
    }

    #[test]
    fn test_render_setup_per_engine() {
        let storage = StorageConfig {
            bucket_root: "s3://b".into(),
            region: "us-east-1".into(),
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            aws_profile: None,
        };
        let mssql = render_setup(EngineKind::SqlServer, &storage);
        assert!(mssql.contains("INSTALL nanodbc FROM community;"));
        let pg = render_setup(EngineKind::Postgres, &storage);
        assert!(pg.contains("INSTALL postgres;"));
        assert!(!pg.contains("nanodbc"));
    }

    #[test]
    fn test_render_secret_static_keys_with_token() {
        let storage = StorageConfig {
            bucket_root: "s3://b".into(),
            region: "eu-west-1".into(),
            access_key_id: Some("AKIA".into()),
            secret_access_key: Some("SECRET".into()),
            session_token: Some("TOKEN".into()),
            aws_profile: None,
        };
        let secret = render_secret(&storage).unwrap();
        assert!(secret.contains("KEY_ID 'AKIA'"));
        assert!(secret.contains("SESSION_TOKEN 'TOKEN'"));
        assert!(secret.contains("REGION 'eu-west-1'"));
    }

    #[test]
    fn test_render_secret_profile_uses_credential_chain() {
        let storage = StorageConfig {
            bucket_root: "s3://b".into(),
            region: "us-east-1".into(),
            access_key_id: Some("AKIA".into()),
            secret_access_key: Some("SECRET".into()),
            session_token: None,
            aws_profile: Some("export".into()),
        };
        let secret = render_secret(&storage).unwrap();
        assert!(secret.contains("PROVIDER CREDENTIAL_CHAIN"));
        assert!(!secret.contains("KEY_ID"));
    }

    #[test]
    fn test_render_secret_absent_without_credentials() {
        let storage = StorageConfig {
            bucket_root: "s3://b".into(),
            region: "us-east-1".into(),
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            aws_profile: None,
        };
        assert!(render_secret(&storage).is_none());
    }
}
