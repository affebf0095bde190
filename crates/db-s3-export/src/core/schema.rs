//! Extracted database object descriptions.
//!
//! These types are what the catalog adapters produce and everything
//! downstream (sort selection, scan resolution, metadata artifacts)
//! consumes. They serialize directly into the metadata JSON artifact.

use serde::{Deserialize, Serialize};

/// Complete metadata snapshot for a source database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseMetadata {
    /// Database (or Oracle service) name.
    pub database: String,
    /// Host the snapshot was taken from.
    pub server: String,
    pub tables: Vec<TableDescriptor>,
    pub views: Vec<ViewInfo>,
    pub routines: Vec<RoutineInfo>,
    pub sequences: Vec<SequenceInfo>,
}

impl DatabaseMetadata {
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }
}

/// A single user table: identity, rendered DDL, and the catalog facts
/// needed to pick a deterministic export order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub schema: String,
    pub name: String,
    /// Rendered CREATE TABLE statement.
    pub ddl: String,
    pub columns: Vec<ColumnInfo>,
    pub primary_key: Option<KeyInfo>,
    pub indexes: Vec<IndexInfo>,
    pub foreign_keys: Vec<ForeignKeyInfo>,
}

impl TableDescriptor {
    /// Dotted `schema.name` form used in logs and the ledger.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

/// A table column in ordinal order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    #[serde(default)]
    pub is_identity: bool,
    #[serde(default)]
    pub default: Option<String>,
    pub ordinal_pos: i32,
}

/// Primary key constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyInfo {
    pub name: String,
    /// Key columns in key ordinal order.
    pub columns: Vec<String>,
}

/// Physical kind of a secondary index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// Clustered index (SQL Server). Defines the physical row order.
    Clustered,
    Unique,
    Other,
}

/// A secondary index (the primary key constraint is not listed here).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    /// Indexed columns, bare names without direction suffixes.
    pub columns: Vec<String>,
    pub is_unique: bool,
    pub kind: IndexKind,
}

/// Foreign key constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKeyInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub referenced_schema: String,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
    #[serde(default)]
    pub on_delete: Option<String>,
    #[serde(default)]
    pub on_update: Option<String>,
}

/// A view and its defining statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewInfo {
    pub schema: String,
    pub name: String,
    pub definition: String,
}

impl ViewInfo {
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

/// Kind of a stored routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutineKind {
    Procedure,
    Function,
}

impl RoutineKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RoutineKind::Procedure => "procedure",
            RoutineKind::Function => "function",
        }
    }
}

/// A stored procedure or function and its source text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutineInfo {
    pub schema: String,
    pub name: String,
    pub kind: RoutineKind,
    pub definition: String,
}

impl RoutineInfo {
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

/// A sequence. Numeric bounds are kept as strings because Oracle
/// sequences routinely exceed i64 range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceInfo {
    pub schema: String,
    pub name: String,
    #[serde(default)]
    pub start_value: Option<String>,
    #[serde(default)]
    pub increment_by: Option<String>,
    #[serde(default)]
    pub min_value: Option<String>,
    #[serde(default)]
    pub max_value: Option<String>,
    #[serde(default)]
    pub last_value: Option<String>,
}
