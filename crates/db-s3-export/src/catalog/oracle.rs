//! Oracle catalog adapter.
//!
//! Reads the `ALL_*` dictionary views through the platform ODBC driver
//! manager. ODBC handles are not Send-friendly enough to hold across
//! awaits, so no connection survives between calls: `connect` opens a
//! short-lived probe connection to surface credential and driver
//! problems at the connect phase, and the extraction runs as one
//! blocking task that opens its own connection for its whole duration.

use async_trait::async_trait;
use odbc_api::{buffers::TextRowSet, Connection, ConnectionOptions, Cursor, Environment};
use tracing::{debug, info};

use super::CatalogAdapter;
use crate::config::{EngineKind, SourceConfig};
use crate::core::identifier::escape_literal;
use crate::core::schema::{
    ColumnInfo, DatabaseMetadata, ForeignKeyInfo, IndexInfo, IndexKind, KeyInfo, RoutineInfo,
    RoutineKind, SequenceInfo, TableDescriptor, ViewInfo,
};
use crate::error::{ExportError, Result};

const FETCH_BATCH_SIZE: usize = 1000;
const MAX_CELL_BYTES: usize = 4096;

pub struct OracleCatalog {
    source: SourceConfig,
    connected: bool,
}

impl OracleCatalog {
    pub fn new(source: SourceConfig) -> Self {
        Self {
            source,
            connected: false,
        }
    }
}

#[async_trait]
impl CatalogAdapter for OracleCatalog {
    fn engine(&self) -> EngineKind {
        EngineKind::Oracle
    }

    async fn connect(&mut self) -> Result<()> {
        let conn_str = self.source.odbc_connection_string();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let env = Environment::new()?;
            env.connect_with_connection_string(&conn_str, ConnectionOptions::default())
                .map_err(|e| ExportError::Connect(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| ExportError::Connect(format!("connect task failed: {e}")))??;

        self.connected = true;
        info!(host = %self.source.host, service = %self.source.database, "connected to Oracle catalog");
        Ok(())
    }

    async fn extract_metadata(&mut self) -> Result<DatabaseMetadata> {
        if !self.connected {
            return Err(ExportError::Connect(
                "catalog connection not established".into(),
            ));
        }

        let source = self.source.clone();
        let metadata = tokio::task::spawn_blocking(move || extract_blocking(&source))
            .await
            .map_err(|e| {
                ExportError::MetadataExtraction(format!("extraction task failed: {e}"))
            })??;

        info!(
            tables = metadata.tables.len(),
            views = metadata.views.len(),
            routines = metadata.routines.len(),
            sequences = metadata.sequences.len(),
            "Oracle metadata extracted"
        );
        Ok(metadata)
    }

    async fn close(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }
}

fn extract_blocking(source: &SourceConfig) -> Result<DatabaseMetadata> {
    let env = Environment::new()?;
    let conn = env
        .connect_with_connection_string(
            &source.odbc_connection_string(),
            ConnectionOptions::default(),
        )
        .map_err(|e| ExportError::Connect(e.to_string()))?;

    let owner = source.user.to_uppercase();

    let listed = query_rows(
        &conn,
        &format!(
            "SELECT owner, table_name FROM all_tables \
             WHERE owner = '{}' ORDER BY owner, table_name",
            escape_literal(&owner)
        ),
    )?;

    let mut tables = Vec::with_capacity(listed.len());
    for row in listed {
        let schema = cell(&row, 0);
        let name = cell(&row, 1);
        debug!(table = %format!("{schema}.{name}"), "extracting table metadata");
        let columns = get_columns(&conn, &schema, &name)?;
        let primary_key = get_primary_key(&conn, &schema, &name)?;
        let indexes = get_indexes(&conn, &schema, &name)?;
        let foreign_keys = get_foreign_keys(&conn, &schema, &name)?;
        let ddl = render_ddl(&schema, &name, &columns);
        tables.push(TableDescriptor {
            schema,
            name,
            ddl,
            columns,
            primary_key,
            indexes,
            foreign_keys,
        });
    }

    let views = get_views(&conn, &owner)?;
    let routines = get_routines(&conn, &owner)?;
    let sequences = get_sequences(&conn, &owner)?;

    Ok(DatabaseMetadata {
        database: source.database.clone(),
        server: source.host.clone(),
        tables,
        views,
        routines,
        sequences,
    })
}

fn get_columns(conn: &Connection<'_>, schema: &str, table: &str) -> Result<Vec<ColumnInfo>> {
    let sql = format!(
        "SELECT column_name, data_type, data_length, data_precision, data_scale, \
         nullable, data_default, column_id \
         FROM all_tab_columns \
         WHERE owner = '{}' AND table_name = '{}' \
         ORDER BY column_id",
        escape_literal(schema),
        escape_literal(table)
    );
    let rows = query_rows(conn, &sql)?;
    Ok(rows
        .iter()
        .map(|row| {
            let base_type = cell(row, 1);
            let data_length = opt_i64(row, 2);
            let data_precision = opt_i64(row, 3);
            let data_scale = opt_i64(row, 4);
            ColumnInfo {
                name: cell(row, 0),
                data_type: render_type(&base_type, data_length, data_precision, data_scale),
                is_nullable: cell(row, 5) != "N",
                is_identity: false,
                default: opt_cell(row, 6).map(|d| d.trim().to_string()),
                ordinal_pos: opt_i64(row, 7).unwrap_or(0) as i32,
            }
        })
        .collect())
}

fn get_primary_key(conn: &Connection<'_>, schema: &str, table: &str) -> Result<Option<KeyInfo>> {
    let sql = format!(
        "SELECT c.constraint_name, \
         LISTAGG(cc.column_name, ',') WITHIN GROUP (ORDER BY cc.position) AS columns \
         FROM all_constraints c \
         JOIN all_cons_columns cc ON c.constraint_name = cc.constraint_name AND c.owner = cc.owner \
         WHERE c.constraint_type = 'P' AND c.owner = '{}' AND c.table_name = '{}' \
         GROUP BY c.constraint_name",
        escape_literal(schema),
        escape_literal(table)
    );
    let rows = query_rows(conn, &sql)?;
    Ok(rows.first().map(|row| KeyInfo {
        name: cell(row, 0),
        columns: split_csv(&cell(row, 1)),
    }))
}

fn get_indexes(conn: &Connection<'_>, schema: &str, table: &str) -> Result<Vec<IndexInfo>> {
    // Excludes the index backing the primary key constraint.
    let sql = format!(
        "SELECT i.index_name, i.uniqueness, \
         LISTAGG(ic.column_name, ',') WITHIN GROUP (ORDER BY ic.column_position) AS columns \
         FROM all_indexes i \
         LEFT JOIN all_ind_columns ic ON i.index_name = ic.index_name AND i.owner = ic.index_owner \
         WHERE i.owner = '{0}' AND i.table_name = '{1}' \
         AND NOT EXISTS ( \
             SELECT 1 FROM all_constraints c \
             WHERE c.constraint_type = 'P' AND c.index_name = i.index_name AND c.owner = i.owner \
         ) \
         GROUP BY i.index_name, i.uniqueness \
         ORDER BY i.index_name",
        escape_literal(schema),
        escape_literal(table)
    );
    let rows = query_rows(conn, &sql)?;
    Ok(rows
        .iter()
        .map(|row| {
            let is_unique = cell(row, 1) == "UNIQUE";
            IndexInfo {
                name: cell(row, 0),
                columns: split_csv(&cell(row, 2)),
                is_unique,
                kind: if is_unique {
                    IndexKind::Unique
                } else {
                    IndexKind::Other
                },
            }
        })
        .collect())
}

fn get_foreign_keys(
    conn: &Connection<'_>,
    schema: &str,
    table: &str,
) -> Result<Vec<ForeignKeyInfo>> {
    let sql = format!(
        "SELECT c.constraint_name, r.owner AS ref_schema, rc.table_name AS ref_table, \
         LISTAGG(cc.column_name, ',') WITHIN GROUP (ORDER BY cc.position) AS columns, \
         LISTAGG(rcc.column_name, ',') WITHIN GROUP (ORDER BY rcc.position) AS ref_columns, \
         c.delete_rule \
         FROM all_constraints c \
         JOIN all_cons_columns cc ON c.constraint_name = cc.constraint_name AND c.owner = cc.owner \
         JOIN all_constraints r ON c.r_constraint_name = r.constraint_name AND c.r_owner = r.owner \
         JOIN all_constraints rc ON r.constraint_name = rc.constraint_name AND r.owner = rc.owner \
         JOIN all_cons_columns rcc ON r.constraint_name = rcc.constraint_name AND r.owner = rcc.owner \
         WHERE c.constraint_type = 'R' AND c.owner = '{}' AND c.table_name = '{}' \
         GROUP BY c.constraint_name, r.owner, rc.table_name, c.delete_rule",
        escape_literal(schema),
        escape_literal(table)
    );
    let rows = query_rows(conn, &sql)?;
    Ok(rows
        .iter()
        .map(|row| ForeignKeyInfo {
            name: cell(row, 0),
            referenced_schema: cell(row, 1),
            referenced_table: cell(row, 2),
            columns: split_csv(&cell(row, 3)),
            referenced_columns: split_csv(&cell(row, 4)),
            on_delete: opt_cell(row, 5),
            on_update: None,
        })
        .collect())
}

fn get_views(conn: &Connection<'_>, owner: &str) -> Result<Vec<ViewInfo>> {
    let sql = format!(
        "SELECT owner, view_name, text FROM all_views \
         WHERE owner = '{}' ORDER BY owner, view_name",
        escape_literal(owner)
    );
    let rows = query_rows(conn, &sql)?;
    Ok(rows
        .iter()
        .map(|row| ViewInfo {
            schema: cell(row, 0),
            name: cell(row, 1),
            definition: cell(row, 2),
        })
        .collect())
}

fn get_routines(conn: &Connection<'_>, owner: &str) -> Result<Vec<RoutineInfo>> {
    let sql = format!(
        "SELECT owner, object_name, object_type FROM all_procedures \
         WHERE owner = '{}' AND object_type IN ('PROCEDURE', 'FUNCTION') \
         ORDER BY owner, object_name",
        escape_literal(owner)
    );
    let rows = query_rows(conn, &sql)?;

    let mut routines = Vec::with_capacity(rows.len());
    for row in rows {
        let schema = cell(&row, 0);
        let name = cell(&row, 1);
        let object_type = cell(&row, 2);

        let source_sql = format!(
            "SELECT text FROM all_source \
             WHERE owner = '{}' AND name = '{}' AND type = '{}' \
             ORDER BY line",
            escape_literal(&schema),
            escape_literal(&name),
            escape_literal(&object_type)
        );
        let source_rows = query_rows(conn, &source_sql)?;
        let definition: String = source_rows.iter().map(|r| cell(r, 0)).collect();

        routines.push(RoutineInfo {
            schema,
            name,
            kind: if object_type == "PROCEDURE" {
                RoutineKind::Procedure
            } else {
                RoutineKind::Function
            },
            definition,
        });
    }
    Ok(routines)
}

fn get_sequences(conn: &Connection<'_>, owner: &str) -> Result<Vec<SequenceInfo>> {
    let sql = format!(
        "SELECT sequence_owner, sequence_name, min_value, max_value, increment_by, last_number \
         FROM all_sequences \
         WHERE sequence_owner = '{}' \
         ORDER BY sequence_owner, sequence_name",
        escape_literal(owner)
    );
    let rows = query_rows(conn, &sql)?;
    Ok(rows
        .iter()
        .map(|row| SequenceInfo {
            schema: cell(row, 0),
            name: cell(row, 1),
            start_value: None,
            increment_by: opt_cell(row, 4),
            min_value: opt_cell(row, 2),
            max_value: opt_cell(row, 3),
            last_value: opt_cell(row, 5),
        })
        .collect())
}

/// Run a query and buffer every row as text cells.
fn query_rows(conn: &Connection<'_>, sql: &str) -> Result<Vec<Vec<Option<String>>>> {
    let mut rows = Vec::new();
    if let Some(mut cursor) = conn.execute(sql, ())? {
        let mut buffers =
            TextRowSet::for_cursor(FETCH_BATCH_SIZE, &mut cursor, Some(MAX_CELL_BYTES))?;
        let mut row_cursor = cursor.bind_buffer(&mut buffers)?;
        while let Some(batch) = row_cursor.fetch()? {
            for row_idx in 0..batch.num_rows() {
                let row: Vec<Option<String>> = (0..batch.num_cols())
                    .map(|col_idx| {
                        batch
                            .at(col_idx, row_idx)
                            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                    })
                    .collect();
                rows.push(row);
            }
        }
    }
    Ok(rows)
}

fn cell(row: &[Option<String>], idx: usize) -> String {
    row.get(idx).and_then(|c| c.clone()).unwrap_or_default()
}

fn opt_cell(row: &[Option<String>], idx: usize) -> Option<String> {
    row.get(idx).and_then(|c| c.clone()).filter(|s| !s.is_empty())
}

fn opt_i64(row: &[Option<String>], idx: usize) -> Option<i64> {
    opt_cell(row, idx).and_then(|s| s.trim().parse().ok())
}

fn render_type(
    base_type: &str,
    data_length: Option<i64>,
    data_precision: Option<i64>,
    data_scale: Option<i64>,
) -> String {
    match base_type {
        "VARCHAR2" | "CHAR" | "NVARCHAR2" | "NCHAR" => match data_length {
            Some(len) => format!("{base_type}({len})"),
            None => base_type.to_string(),
        },
        "NUMBER" => match (data_precision, data_scale) {
            (Some(precision), Some(scale)) if scale > 0 => {
                format!("NUMBER({precision},{scale})")
            }
            (Some(precision), _) => format!("NUMBER({precision})"),
            _ => "NUMBER".to_string(),
        },
        _ => base_type.to_string(),
    }
}

fn render_ddl(schema: &str, table: &str, columns: &[ColumnInfo]) -> String {
    let mut parts = vec![
        format!("-- Table: {schema}.{table}"),
        format!("CREATE TABLE \"{schema}\".\"{table}\" ("),
    ];
    let column_defs: Vec<String> = columns
        .iter()
        .map(|col| {
            let mut def = format!("    \"{}\" {}", col.name, col.data_type);
            if !col.is_nullable {
                def.push_str(" NOT NULL");
            }
            if let Some(default) = &col.default {
                def.push_str(&format!(" DEFAULT {default}"));
            }
            def
        })
        .collect();
    parts.push(column_defs.join(",\n"));
    parts.push(");".to_string());
    parts.join("\n")
}
