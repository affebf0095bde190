//! Destination path layout under the storage root.
//!
//! Every artifact the exporter writes has its path built here, so the
//! layout lives in one place:
//!
//! ```text
//! {root}/{schema}/{table}/{table}.parquet
//! {root}/metadata/metadata_{stamp}.json
//! {root}/metadata/tables/{schema}/{table}.sql
//! {root}/metadata/views/{schema}/{view}.sql
//! {root}/metadata/procedures/{schema}/{name}.sql
//! {root}/logs/export_log_{stamp}.parquet
//! ```

use chrono::{DateTime, Utc};

/// Builds destination paths under a fixed storage root.
#[derive(Debug, Clone)]
pub struct ExportTarget {
    root: String,
}

impl ExportTarget {
    /// Create a target rooted at `root`. Trailing slashes are stripped.
    pub fn new(root: impl Into<String>) -> Self {
        let mut root = root.into();
        while root.ends_with('/') {
            root.pop();
        }
        Self { root }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Parquet data file for a table.
    pub fn table_data(&self, schema: &str, table: &str) -> String {
        format!("{}/{}/{}/{}.parquet", self.root, schema, table, table)
    }

    /// DDL text file for a table.
    pub fn table_ddl(&self, schema: &str, table: &str) -> String {
        format!("{}/metadata/tables/{}/{}.sql", self.root, schema, table)
    }

    /// Database metadata JSON, stamped at `at`.
    pub fn metadata_json(&self, at: DateTime<Utc>) -> String {
        format!("{}/metadata/metadata_{}.json", self.root, stamp(at))
    }

    /// Definition file for a view.
    pub fn view_definition(&self, schema: &str, view: &str) -> String {
        format!("{}/metadata/views/{}/{}.sql", self.root, schema, view)
    }

    /// Definition file for a stored routine (procedure or function).
    pub fn routine_definition(&self, schema: &str, name: &str) -> String {
        format!("{}/metadata/procedures/{}/{}.sql", self.root, schema, name)
    }

    /// Export ledger parquet, stamped at `at`.
    pub fn export_log(&self, at: DateTime<Utc>) -> String {
        format!("{}/logs/export_log_{}.parquet", self.root, stamp(at))
    }
}

/// Filename timestamp, second resolution.
pub fn stamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d_%H%M%S").to_string()
}
