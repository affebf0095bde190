//! Scan specification: how the storage engine reads a table.

pub mod sort;

pub use sort::select_sort_order;

use crate::config::{EngineKind, SourceConfig};
use crate::core::identifier::{quote_mssql, quote_oracle, validate_identifier};
use crate::core::schema::TableDescriptor;
use crate::error::{ExportError, Result};

/// How a table's rows are read by the storage engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanSpec {
    /// Rows come back from a SQL statement pushed through the ODBC
    /// scanner. The ORDER BY is baked into the statement.
    OdbcQuery {
        connection_string: String,
        sql_text: String,
    },
    /// Rows come from the native postgres scanner. Ordering is applied
    /// by the transfer layer over the scanned relation.
    NativeScan {
        connection_string: String,
        schema: String,
        table: String,
    },
}

/// Build the scan specification for one table.
///
/// `sort_order` is the column list from [`select_sort_order`]; for ODBC
/// engines it is rendered into the statement here, for PostgreSQL it is
/// left to the transfer layer.
pub fn resolve(
    source: &SourceConfig,
    table: &TableDescriptor,
    sort_order: &[String],
) -> Result<ScanSpec> {
    validate_identifier(&table.schema)
        .map_err(|e| ExportError::scan(table.full_name(), e.to_string()))?;
    validate_identifier(&table.name)
        .map_err(|e| ExportError::scan(table.full_name(), e.to_string()))?;
    for col in sort_order {
        validate_identifier(col)
            .map_err(|e| ExportError::scan(table.full_name(), e.to_string()))?;
    }

    match source.engine {
        EngineKind::SqlServer => Ok(ScanSpec::OdbcQuery {
            connection_string: source.odbc_connection_string(),
            sql_text: select_statement(table, sort_order, quote_mssql),
        }),
        EngineKind::Oracle => Ok(ScanSpec::OdbcQuery {
            connection_string: source.odbc_connection_string(),
            sql_text: select_statement(table, sort_order, quote_oracle),
        }),
        EngineKind::Postgres => Ok(ScanSpec::NativeScan {
            connection_string: source.native_connection_string(),
            schema: table.schema.clone(),
            table: table.name.clone(),
        }),
    }
}

fn select_statement(
    table: &TableDescriptor,
    sort_order: &[String],
    quote: fn(&str) -> String,
) -> String {
    let mut sql = format!(
        "SELECT * FROM {}.{}",
        quote(&table.schema),
        quote(&table.name)
    );
    if !sort_order.is_empty() {
        let cols: Vec<String> = sort_order.iter().map(|c| quote(c)).collect();
        sql.push_str(" ORDER BY ");
        sql.push_str(&cols.join(", "));
    }
    sql
}
