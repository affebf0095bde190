//! PostgreSQL catalog adapter.
//!
//! Reads `information_schema` and `pg_catalog` over tokio-postgres.
//! The information_schema domains (sql_identifier and friends) do not
//! map to Rust types directly, so every projected column carries an
//! explicit cast.

use async_trait::async_trait;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error, info};

use super::CatalogAdapter;
use crate::config::{EngineKind, SourceConfig};
use crate::core::schema::{
    ColumnInfo, DatabaseMetadata, ForeignKeyInfo, IndexInfo, IndexKind, KeyInfo, RoutineInfo,
    RoutineKind, SequenceInfo, TableDescriptor, ViewInfo,
};
use crate::error::{ExportError, Result};

pub struct PostgresCatalog {
    source: SourceConfig,
    client: Option<Client>,
}

/// Column row plus the type detail needed only for DDL.
struct PgColumn {
    info: ColumnInfo,
    udt_name: String,
    char_max_length: Option<i32>,
    numeric_precision: Option<i32>,
    numeric_scale: Option<i32>,
}

impl PostgresCatalog {
    pub fn new(source: SourceConfig) -> Self {
        Self {
            source,
            client: None,
        }
    }

    fn client(&self) -> Result<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| ExportError::Connect("catalog connection not established".into()))
    }
}

#[async_trait]
impl CatalogAdapter for PostgresCatalog {
    fn engine(&self) -> EngineKind {
        EngineKind::Postgres
    }

    async fn connect(&mut self) -> Result<()> {
        let conn_str = self.source.native_connection_string();
        let (client, connection) = tokio_postgres::connect(&conn_str, NoTls)
            .await
            .map_err(|e| ExportError::Connect(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "postgres catalog connection closed");
            }
        });

        self.client = Some(client);
        info!(host = %self.source.host, database = %self.source.database, "connected to PostgreSQL catalog");
        Ok(())
    }

    async fn extract_metadata(&mut self) -> Result<DatabaseMetadata> {
        let client = self.client()?;

        let listed = list_tables(client).await?;
        let mut tables = Vec::with_capacity(listed.len());
        for (schema, name) in listed {
            debug!(table = %format!("{schema}.{name}"), "extracting table metadata");
            let columns = get_columns(client, &schema, &name).await?;
            let primary_key = get_primary_key(client, &schema, &name).await?;
            let indexes = get_indexes(client, &schema, &name).await?;
            let foreign_keys = get_foreign_keys(client, &schema, &name).await?;
            let ddl = render_ddl(&schema, &name, &columns);
            tables.push(TableDescriptor {
                schema,
                name,
                ddl,
                columns: columns.into_iter().map(|c| c.info).collect(),
                primary_key,
                indexes,
                foreign_keys,
            });
        }

        let views = get_views(client).await?;
        let routines = get_routines(client).await?;
        let sequences = get_sequences(client).await?;

        info!(
            tables = tables.len(),
            views = views.len(),
            routines = routines.len(),
            sequences = sequences.len(),
            "PostgreSQL metadata extracted"
        );

        Ok(DatabaseMetadata {
            database: self.source.database.clone(),
            server: self.source.host.clone(),
            tables,
            views,
            routines,
            sequences,
        })
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping the client closes the connection task.
        self.client = None;
        Ok(())
    }
}

async fn list_tables(client: &Client) -> Result<Vec<(String, String)>> {
    let sql = r#"
        SELECT schemaname::text, tablename::text
        FROM pg_tables
        WHERE schemaname NOT IN ('pg_catalog', 'information_schema')
        ORDER BY schemaname, tablename
    "#;
    let rows = client.query(sql, &[]).await?;
    Ok(rows
        .iter()
        .map(|row| (row.get::<_, String>(0), row.get::<_, String>(1)))
        .collect())
}

async fn get_columns(client: &Client, schema: &str, table: &str) -> Result<Vec<PgColumn>> {
    let sql = r#"
        SELECT
            column_name::text,
            data_type::text,
            udt_name::text,
            character_maximum_length::int,
            numeric_precision::int,
            numeric_scale::int,
            (is_nullable = 'YES') AS is_nullable,
            (is_identity = 'YES') AS is_identity,
            column_default::text,
            ordinal_position::int
        FROM information_schema.columns
        WHERE table_schema = $1 AND table_name = $2
        ORDER BY ordinal_position
    "#;
    let rows = client.query(sql, &[&schema, &table]).await?;
    Ok(rows
        .iter()
        .map(|row| PgColumn {
            info: ColumnInfo {
                name: row.get(0),
                data_type: row.get(1),
                is_nullable: row.get(6),
                is_identity: row.get(7),
                default: row.get(8),
                ordinal_pos: row.get(9),
            },
            udt_name: row.get(2),
            char_max_length: row.get(3),
            numeric_precision: row.get(4),
            numeric_scale: row.get(5),
        })
        .collect())
}

async fn get_primary_key(client: &Client, schema: &str, table: &str) -> Result<Option<KeyInfo>> {
    let sql = r#"
        SELECT
            tc.constraint_name::text,
            string_agg(kcu.column_name::text, ',' ORDER BY kcu.ordinal_position) AS columns
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
            ON tc.constraint_name = kcu.constraint_name
            AND tc.table_schema = kcu.table_schema
            AND tc.table_name = kcu.table_name
        WHERE tc.constraint_type = 'PRIMARY KEY'
            AND tc.table_schema = $1
            AND tc.table_name = $2
        GROUP BY tc.constraint_name
    "#;
    let rows = client.query(sql, &[&schema, &table]).await?;
    Ok(rows.first().map(|row| KeyInfo {
        name: row.get(0),
        columns: split_csv(row.get::<_, String>(1).as_str()),
    }))
}

async fn get_indexes(client: &Client, schema: &str, table: &str) -> Result<Vec<IndexInfo>> {
    let sql = r#"
        SELECT
            i.relname::text AS index_name,
            ix.indisunique AS is_unique,
            array_to_string(array_agg(a.attname ORDER BY array_position(ix.indkey, a.attnum)), ',') AS columns
        FROM pg_class t
        JOIN pg_namespace n ON n.oid = t.relnamespace
        JOIN pg_index ix ON t.oid = ix.indrelid
        JOIN pg_class i ON i.oid = ix.indexrelid
        JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey)
        WHERE n.nspname = $1
            AND t.relname = $2
            AND NOT ix.indisprimary
        GROUP BY i.relname, ix.indisunique
        ORDER BY i.relname
    "#;
    let rows = client.query(sql, &[&schema, &table]).await?;
    Ok(rows
        .iter()
        .map(|row| {
            let is_unique: bool = row.get(1);
            IndexInfo {
                name: row.get(0),
                columns: split_csv(row.get::<_, String>(2).as_str()),
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

async fn get_foreign_keys(
    client: &Client,
    schema: &str,
    table: &str,
) -> Result<Vec<ForeignKeyInfo>> {
    let sql = r#"
        SELECT
            tc.constraint_name::text,
            ccu.table_schema::text AS ref_schema,
            ccu.table_name::text AS ref_table,
            string_agg(kcu.column_name::text, ',' ORDER BY kcu.ordinal_position) AS columns,
            string_agg(ccu.column_name::text, ',' ORDER BY kcu.ordinal_position) AS ref_columns,
            rc.delete_rule::text,
            rc.update_rule::text
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
            ON tc.constraint_name = kcu.constraint_name
            AND tc.table_schema = kcu.table_schema
        JOIN information_schema.constraint_column_usage ccu
            ON tc.constraint_name = ccu.constraint_name
            AND tc.table_schema = ccu.table_schema
        JOIN information_schema.referential_constraints rc
            ON tc.constraint_name = rc.constraint_name
            AND tc.table_schema = rc.constraint_schema
        WHERE tc.constraint_type = 'FOREIGN KEY'
            AND tc.table_schema = $1
            AND tc.table_name = $2
        GROUP BY tc.constraint_name, ccu.table_schema, ccu.table_name, rc.delete_rule, rc.update_rule
    "#;
    let rows = client.query(sql, &[&schema, &table]).await?;
    Ok(rows
        .iter()
        .map(|row| ForeignKeyInfo {
            name: row.get(0),
            referenced_schema: row.get(1),
            referenced_table: row.get(2),
            columns: split_csv(row.get::<_, String>(3).as_str()),
            referenced_columns: split_csv(row.get::<_, String>(4).as_str()),
            on_delete: row.get(5),
            on_update: row.get(6),
        })
        .collect())
}

async fn get_views(client: &Client) -> Result<Vec<ViewInfo>> {
    let sql = r#"
        SELECT schemaname::text, viewname::text, definition::text
        FROM pg_views
        WHERE schemaname NOT IN ('pg_catalog', 'information_schema')
        ORDER BY schemaname, viewname
    "#;
    let rows = client.query(sql, &[]).await?;
    Ok(rows
        .iter()
        .map(|row| ViewInfo {
            schema: row.get(0),
            name: row.get(1),
            definition: row.get(2),
        })
        .collect())
}

async fn get_routines(client: &Client) -> Result<Vec<RoutineInfo>> {
    // Aggregates and window functions have no reproducible definition
    // text, so only plain functions and procedures are extracted.
    let sql = r#"
        SELECT
            n.nspname::text AS schema_name,
            p.proname::text AS routine_name,
            (p.prokind = 'p') AS is_procedure,
            pg_get_functiondef(p.oid)::text AS definition
        FROM pg_proc p
        JOIN pg_namespace n ON p.pronamespace = n.oid
        WHERE n.nspname NOT IN ('pg_catalog', 'information_schema')
            AND p.prokind IN ('f', 'p')
        ORDER BY n.nspname, p.proname
    "#;
    let rows = client.query(sql, &[]).await?;
    Ok(rows
        .iter()
        .map(|row| RoutineInfo {
            schema: row.get(0),
            name: row.get(1),
            kind: if row.get::<_, bool>(2) {
                RoutineKind::Procedure
            } else {
                RoutineKind::Function
            },
            definition: row.get(3),
        })
        .collect())
}

async fn get_sequences(client: &Client) -> Result<Vec<SequenceInfo>> {
    let sql = r#"
        SELECT
            schemaname::text,
            sequencename::text,
            start_value::text,
            increment_by::text,
            min_value::text,
            max_value::text,
            last_value::text
        FROM pg_sequences
        WHERE schemaname NOT IN ('pg_catalog', 'information_schema')
        ORDER BY schemaname, sequencename
    "#;
    let rows = client.query(sql, &[]).await?;
    Ok(rows
        .iter()
        .map(|row| SequenceInfo {
            schema: row.get(0),
            name: row.get(1),
            start_value: row.get(2),
            increment_by: row.get(3),
            min_value: row.get(4),
            max_value: row.get(5),
            last_value: row.get(6),
        })
        .collect())
}

fn render_ddl(schema: &str, table: &str, columns: &[PgColumn]) -> String {
    let mut parts = vec![
        format!("-- Table: {schema}.{table}"),
        format!("CREATE TABLE \"{schema}\".\"{table}\" ("),
    ];
    let column_defs: Vec<String> = columns
        .iter()
        .map(|col| {
            let type_text = if let Some(len) = col.char_max_length {
                format!("{}({})", col.udt_name, len)
            } else if let (Some(precision), Some(scale)) =
                (col.numeric_precision, col.numeric_scale)
            {
                if col.info.data_type == "numeric" || col.info.data_type == "decimal" {
                    format!("{}({},{})", col.info.data_type, precision, scale)
                } else {
                    col.info.data_type.clone()
                }
            } else {
                col.info.data_type.clone()
            };

            let mut def = format!("    \"{}\" {}", col.info.name, type_text);
            if !col.info.is_nullable {
                def.push_str(" NOT NULL");
            }
            if let Some(default) = &col.info.default {
                def.push_str(&format!(" DEFAULT {default}"));
            }
            def
        })
        .collect();
    parts.push(column_defs.join(",\n"));
    parts.push(");".to_string());
    parts.join("\n")
}

fn split_csv(csv: &str) -> Vec<String> {
    if csv.is_empty() {
        return Vec::new();
    }
    csv.split(',').map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pg_column(name: &str, data_type: &str) -> PgColumn {
        PgColumn {
            info: ColumnInfo {
                name: name.into(),
                data_type: data_type.into(),
                is_nullable: true,
                is_identity: false,
                default: None,
                ordinal_pos: 1,
            },
            udt_name: data_type.into(),
            char_max_length: None,
            numeric_precision: None,
            numeric_scale: None,
        }
    }

    #[test]
    fn test_render_ddl_varchar_and_numeric() {
        let mut name = pg_column("name", "character varying");
        name.udt_name = "varchar".into();
        name.char_max_length = Some(120);
        name.info.is_nullable = false;

        let mut amount = pg_column("amount", "numeric");
        amount.numeric_precision = Some(12);
        amount.numeric_scale = Some(2);
        amount.info.default = Some("0".into());

        let ddl = render_ddl("public", "orders", &[name, amount]);
        assert!(ddl.starts_with("-- Table: public.orders\n"));
        assert!(ddl.contains("\"name\" varchar(120) NOT NULL"));
        assert!(ddl.contains("\"amount\" numeric(12,2) DEFAULT 0"));
        assert!(ddl.ends_with(");"));
    }

    #[test]
    fn test_render_ddl_plain_type_with_precision() {
        // Integer columns report precision but must not render it.
        let mut id = pg_column("id", "integer");
        id.numeric_precision = Some(32);
        id.numeric_scale = Some(0);
        let ddl = render_ddl("public", "t", &[id]);
        assert!(ddl.contains("\"id\" integer"));
        assert!(!ddl.contains("integer(32"));
    }
}
