//! Core data model shared across the crate.

pub mod identifier;
pub mod paths;
pub mod schema;

pub use paths::ExportTarget;
pub use schema::{
    ColumnInfo, DatabaseMetadata, ForeignKeyInfo, IndexInfo, IndexKind, KeyInfo, RoutineInfo,
    RoutineKind, SequenceInfo, TableDescriptor, ViewInfo,
};
