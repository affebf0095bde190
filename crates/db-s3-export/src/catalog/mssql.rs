//! SQL Server catalog adapter.
//!
//! Reads `sys.*` catalog views over a single Tiberius connection and
//! renders SQL Server flavored DDL.

use async_trait::async_trait;
use tiberius::{AuthMethod, Client, Config, Query, Row};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};

use super::CatalogAdapter;
use crate::config::{AuthMode, EngineKind, SourceConfig};
use crate::core::schema::{
    ColumnInfo, DatabaseMetadata, ForeignKeyInfo, IndexInfo, IndexKind, KeyInfo, RoutineInfo,
    RoutineKind, TableDescriptor, ViewInfo,
};
use crate::error::{ExportError, Result};

type MssqlClient = Client<Compat<TcpStream>>;

pub struct MssqlCatalog {
    source: SourceConfig,
    client: Option<MssqlClient>,
}

/// Column row plus the identity seed/increment needed only for DDL.
struct MssqlColumn {
    info: ColumnInfo,
    seed: i64,
    increment: i64,
}

impl MssqlCatalog {
    pub fn new(source: SourceConfig) -> Self {
        Self {
            source,
            client: None,
        }
    }

    fn build_config(&self) -> Result<Config> {
        let mut config = Config::new();
        config.host(&self.source.host);
        config.port(self.source.port());
        config.database(&self.source.database);

        match self.source.auth {
            AuthMode::Windows => {
                #[cfg(feature = "integrated-auth")]
                config.authentication(AuthMethod::Integrated);
                #[cfg(not(feature = "integrated-auth"))]
                return Err(ExportError::Config(
                    "windows auth requires building with the integrated-auth feature".into(),
                ));
            }
            AuthMode::Password => {
                config.authentication(AuthMethod::sql_server(
                    &self.source.user,
                    &self.source.password,
                ));
            }
        }

        config.trust_cert();
        Ok(config)
    }

    fn client(&mut self) -> Result<&mut MssqlClient> {
        self.client
            .as_mut()
            .ok_or_else(|| ExportError::Connect("catalog connection not established".into()))
    }
}

#[async_trait]
impl CatalogAdapter for MssqlCatalog {
    fn engine(&self) -> EngineKind {
        EngineKind::SqlServer
    }

    async fn connect(&mut self) -> Result<()> {
        let config = self.build_config()?;
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| ExportError::Connect(format!("{}: {e}", config.get_addr())))?;
        tcp.set_nodelay(true).ok();

        let client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| ExportError::Connect(e.to_string()))?;
        self.client = Some(client);
        info!(host = %self.source.host, database = %self.source.database, "connected to SQL Server catalog");
        Ok(())
    }

    async fn extract_metadata(&mut self) -> Result<DatabaseMetadata> {
        let database = self.source.database.clone();
        let server = self.source.host.clone();
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
        let mut routines = get_procedures(client).await?;
        routines.extend(get_functions(client).await?);

        info!(
            tables = tables.len(),
            views = views.len(),
            routines = routines.len(),
            "SQL Server metadata extracted"
        );

        Ok(DatabaseMetadata {
            database,
            server,
            tables,
            views,
            routines,
            sequences: Vec::new(),
        })
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            client.close().await?;
        }
        Ok(())
    }
}

async fn list_tables(client: &mut MssqlClient) -> Result<Vec<(String, String)>> {
    let sql = r#"
        SELECT s.name AS schema_name, t.name AS table_name
        FROM sys.tables t
        INNER JOIN sys.schemas s ON t.schema_id = s.schema_id
        WHERE t.is_ms_shipped = 0
        ORDER BY s.name, t.name
    "#;
    let rows = client.simple_query(sql).await?.into_first_result().await?;
    rows.iter()
        .map(|row| Ok((get_str(row, 0)?, get_str(row, 1)?)))
        .collect()
}

async fn get_columns(
    client: &mut MssqlClient,
    schema: &str,
    table: &str,
) -> Result<Vec<MssqlColumn>> {
    let sql = r#"
        SELECT
            c.name,
            CASE
                WHEN t.name IN ('varchar', 'char', 'varbinary', 'binary', 'nvarchar', 'nchar')
                THEN CONCAT(t.name,
                    CASE
                        WHEN c.max_length = -1 THEN '(MAX)'
                        WHEN t.name LIKE 'n%' THEN CONCAT('(', c.max_length/2, ')')
                        ELSE CONCAT('(', c.max_length, ')')
                    END)
                WHEN t.name IN ('decimal', 'numeric')
                THEN CONCAT(t.name, '(', c.precision, ',', c.scale, ')')
                ELSE t.name
            END AS type,
            c.is_nullable,
            c.is_identity,
            CAST(ISNULL(ic.seed_value, 0) AS BIGINT) AS seed_value,
            CAST(ISNULL(ic.increment_value, 0) AS BIGINT) AS increment_value,
            OBJECT_DEFINITION(c.default_object_id) AS default_definition,
            c.column_id
        FROM sys.columns c
        INNER JOIN sys.types t ON c.user_type_id = t.user_type_id
        INNER JOIN sys.tables tb ON c.object_id = tb.object_id
        INNER JOIN sys.schemas s ON tb.schema_id = s.schema_id
        LEFT JOIN sys.identity_columns ic ON c.object_id = ic.object_id AND c.column_id = ic.column_id
        WHERE s.name = @P1 AND tb.name = @P2
        ORDER BY c.column_id
    "#;
    let mut query = Query::new(sql);
    query.bind(schema);
    query.bind(table);
    let rows = query.query(client).await?.into_first_result().await?;

    rows.iter()
        .map(|row| {
            Ok(MssqlColumn {
                info: ColumnInfo {
                    name: get_str(row, 0)?,
                    data_type: get_str(row, 1)?,
                    is_nullable: get_bool(row, 2)?,
                    is_identity: get_bool(row, 3)?,
                    default: get_opt_str(row, 6)?,
                    ordinal_pos: get_i32(row, 7)?,
                },
                seed: get_i64(row, 4)?,
                increment: get_i64(row, 5)?,
            })
        })
        .collect()
}

async fn get_primary_key(
    client: &mut MssqlClient,
    schema: &str,
    table: &str,
) -> Result<Option<KeyInfo>> {
    let sql = r#"
        SELECT
            kc.name AS constraint_name,
            STRING_AGG(c.name, ',') WITHIN GROUP (ORDER BY ic.key_ordinal) AS columns
        FROM sys.key_constraints kc
        INNER JOIN sys.indexes i ON kc.parent_object_id = i.object_id AND kc.unique_index_id = i.index_id
        INNER JOIN sys.index_columns ic ON i.object_id = ic.object_id AND i.index_id = ic.index_id
        INNER JOIN sys.columns c ON ic.object_id = c.object_id AND ic.column_id = c.column_id
        INNER JOIN sys.tables t ON kc.parent_object_id = t.object_id
        INNER JOIN sys.schemas s ON t.schema_id = s.schema_id
        WHERE kc.type = 'PK' AND s.name = @P1 AND t.name = @P2
        GROUP BY kc.name
    "#;
    let mut query = Query::new(sql);
    query.bind(schema);
    query.bind(table);
    let rows = query.query(client).await?.into_first_result().await?;

    match rows.first() {
        Some(row) => Ok(Some(KeyInfo {
            name: get_str(row, 0)?,
            columns: split_csv(&get_str(row, 1)?),
        })),
        None => Ok(None),
    }
}

async fn get_indexes(
    client: &mut MssqlClient,
    schema: &str,
    table: &str,
) -> Result<Vec<IndexInfo>> {
    let sql = r#"
        SELECT
            i.name AS index_name,
            i.type_desc AS index_type,
            i.is_unique,
            STRING_AGG(
                c.name + CASE WHEN ic.is_descending_key = 1 THEN ' DESC' ELSE ' ASC' END,
                ','
            ) WITHIN GROUP (ORDER BY ic.key_ordinal) AS columns
        FROM sys.indexes i
        INNER JOIN sys.index_columns ic ON i.object_id = ic.object_id AND i.index_id = ic.index_id
        INNER JOIN sys.columns c ON ic.object_id = c.object_id AND ic.column_id = c.column_id
        INNER JOIN sys.tables t ON i.object_id = t.object_id
        INNER JOIN sys.schemas s ON t.schema_id = s.schema_id
        WHERE s.name = @P1 AND t.name = @P2 AND i.is_primary_key = 0 AND i.type > 0
        GROUP BY i.name, i.type_desc, i.is_unique
        ORDER BY i.name
    "#;
    let mut query = Query::new(sql);
    query.bind(schema);
    query.bind(table);
    let rows = query.query(client).await?.into_first_result().await?;

    rows.iter()
        .map(|row| {
            let type_desc = get_str(row, 1)?;
            let is_unique = get_bool(row, 2)?;
            Ok(IndexInfo {
                name: get_str(row, 0)?,
                columns: split_indexed_columns(&get_str(row, 3)?),
                is_unique,
                kind: index_kind(&type_desc, is_unique),
            })
        })
        .collect()
}

async fn get_foreign_keys(
    client: &mut MssqlClient,
    schema: &str,
    table: &str,
) -> Result<Vec<ForeignKeyInfo>> {
    let sql = r#"
        SELECT
            fk.name AS constraint_name,
            OBJECT_SCHEMA_NAME(fk.referenced_object_id) AS ref_schema,
            OBJECT_NAME(fk.referenced_object_id) AS ref_table,
            STRING_AGG(c.name, ',') WITHIN GROUP (ORDER BY fkc.constraint_column_id) AS columns,
            STRING_AGG(rc.name, ',') WITHIN GROUP (ORDER BY fkc.constraint_column_id) AS ref_columns,
            fk.delete_referential_action_desc,
            fk.update_referential_action_desc
        FROM sys.foreign_keys fk
        INNER JOIN sys.foreign_key_columns fkc ON fk.object_id = fkc.constraint_object_id
        INNER JOIN sys.columns c ON fkc.parent_object_id = c.object_id AND fkc.parent_column_id = c.column_id
        INNER JOIN sys.columns rc ON fkc.referenced_object_id = rc.object_id AND fkc.referenced_column_id = rc.column_id
        INNER JOIN sys.tables t ON fk.parent_object_id = t.object_id
        INNER JOIN sys.schemas s ON t.schema_id = s.schema_id
        WHERE s.name = @P1 AND t.name = @P2
        GROUP BY fk.name, fk.referenced_object_id, fk.delete_referential_action_desc, fk.update_referential_action_desc
    "#;
    let mut query = Query::new(sql);
    query.bind(schema);
    query.bind(table);
    let rows = query.query(client).await?.into_first_result().await?;

    rows.iter()
        .map(|row| {
            Ok(ForeignKeyInfo {
                name: get_str(row, 0)?,
                referenced_schema: get_str(row, 1)?,
                referenced_table: get_str(row, 2)?,
                columns: split_csv(&get_str(row, 3)?),
                referenced_columns: split_csv(&get_str(row, 4)?),
                on_delete: get_opt_str(row, 5)?,
                on_update: get_opt_str(row, 6)?,
            })
        })
        .collect()
}

async fn get_views(client: &mut MssqlClient) -> Result<Vec<ViewInfo>> {
    let sql = r#"
        SELECT s.name AS schema_name, v.name AS view_name, m.definition
        FROM sys.views v
        INNER JOIN sys.schemas s ON v.schema_id = s.schema_id
        INNER JOIN sys.sql_modules m ON v.object_id = m.object_id
        WHERE v.is_ms_shipped = 0
        ORDER BY s.name, v.name
    "#;
    let rows = client.simple_query(sql).await?.into_first_result().await?;
    rows.iter()
        .map(|row| {
            Ok(ViewInfo {
                schema: get_str(row, 0)?,
                name: get_str(row, 1)?,
                definition: get_str(row, 2)?,
            })
        })
        .collect()
}

async fn get_procedures(client: &mut MssqlClient) -> Result<Vec<RoutineInfo>> {
    let sql = r#"
        SELECT s.name AS schema_name, p.name AS procedure_name, m.definition
        FROM sys.procedures p
        INNER JOIN sys.schemas s ON p.schema_id = s.schema_id
        INNER JOIN sys.sql_modules m ON p.object_id = m.object_id
        WHERE p.is_ms_shipped = 0
        ORDER BY s.name, p.name
    "#;
    let rows = client.simple_query(sql).await?.into_first_result().await?;
    rows.iter()
        .map(|row| {
            Ok(RoutineInfo {
                schema: get_str(row, 0)?,
                name: get_str(row, 1)?,
                kind: RoutineKind::Procedure,
                definition: get_str(row, 2)?,
            })
        })
        .collect()
}

async fn get_functions(client: &mut MssqlClient) -> Result<Vec<RoutineInfo>> {
    let sql = r#"
        SELECT s.name AS schema_name, o.name AS function_name, m.definition
        FROM sys.objects o
        INNER JOIN sys.schemas s ON o.schema_id = s.schema_id
        INNER JOIN sys.sql_modules m ON o.object_id = m.object_id
        WHERE o.type IN ('FN', 'IF', 'TF') AND o.is_ms_shipped = 0
        ORDER BY s.name, o.name
    "#;
    let rows = client.simple_query(sql).await?.into_first_result().await?;
    rows.iter()
        .map(|row| {
            Ok(RoutineInfo {
                schema: get_str(row, 0)?,
                name: get_str(row, 1)?,
                kind: RoutineKind::Function,
                definition: get_str(row, 2)?,
            })
        })
        .collect()
}

fn render_ddl(schema: &str, table: &str, columns: &[MssqlColumn]) -> String {
    let mut parts = vec![
        format!("-- Table: {schema}.{table}"),
        format!("CREATE TABLE [{schema}].[{table}] ("),
    ];
    let column_defs: Vec<String> = columns
        .iter()
        .map(|col| {
            let mut def = format!("    [{}] {}", col.info.name, col.info.data_type);
            if !col.info.is_nullable {
                def.push_str(" NOT NULL");
            }
            if col.info.is_identity {
                def.push_str(&format!(" IDENTITY({},{})", col.seed, col.increment));
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

fn index_kind(type_desc: &str, is_unique: bool) -> IndexKind {
    if type_desc.eq_ignore_ascii_case("CLUSTERED") {
        IndexKind::Clustered
    } else if is_unique {
        IndexKind::Unique
    } else {
        IndexKind::Other
    }
}

/// Strip the ' ASC'/' DESC' suffix the catalog query appends to each
/// indexed column.
fn split_indexed_columns(csv: &str) -> Vec<String> {
    split_csv(csv)
        .into_iter()
        .map(|col| {
            col.strip_suffix(" ASC")
                .or_else(|| col.strip_suffix(" DESC"))
                .unwrap_or(&col)
                .to_string()
        })
        .collect()
}

fn split_csv(csv: &str) -> Vec<String> {
    if csv.is_empty() {
        return Vec::new();
    }
    csv.split(',').map(|s| s.to_string()).collect()
}

fn get_str(row: &Row, idx: usize) -> Result<String> {
    Ok(row.try_get::<&str, _>(idx)?.unwrap_or_default().to_string())
}

fn get_opt_str(row: &Row, idx: usize) -> Result<Option<String>> {
    Ok(row.try_get::<&str, _>(idx)?.map(|s| s.to_string()))
}

fn get_bool(row: &Row, idx: usize) -> Result<bool> {
    Ok(row.try_get::<bool, _>(idx)?.unwrap_or(false))
}

fn get_i32(row: &Row, idx: usize) -> Result<i32> {
    Ok(row.try_get::<i32, _>(idx)?.unwrap_or(0))
}

fn get_i64(row: &Row, idx: usize) -> Result<i64> {
    Ok(row.try_get::<i64, _>(idx)?.unwrap_or(0))
}
