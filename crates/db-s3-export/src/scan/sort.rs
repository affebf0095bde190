//! Sort order selection for table exports.

use tracing::debug;

use crate::core::schema::{IndexKind, TableDescriptor};

/// Pick the column list used to order a table's export.
///
/// Rules, in strict priority order:
/// 1. primary key columns, in key ordinal order
/// 2. columns of the first clustered index
/// 3. columns of the first unique index
/// 4. the first column by ordinal position
/// 5. no ordering (empty list)
///
/// Pure over the descriptor: the same input always yields the same
/// column list, so repeated exports of an unchanged table produce
/// identically ordered files.
pub fn select_sort_order(table: &TableDescriptor) -> Vec<String> {
    if let Some(pk) = &table.primary_key {
        if !pk.columns.is_empty() {
            debug!(table = %table.full_name(), key = %pk.name, "ordering by primary key");
            return pk.columns.clone();
        }
    }

    if let Some(clustered) = table
        .indexes
        .iter()
        .find(|ix| ix.kind == IndexKind::Clustered && !ix.columns.is_empty())
    {
        debug!(table = %table.full_name(), index = %clustered.name, "ordering by clustered index");
        return clustered.columns.clone();
    }

    if let Some(unique) = table
        .indexes
        .iter()
        .find(|ix| ix.is_unique && !ix.columns.is_empty())
    {
        debug!(table = %table.full_name(), index = %unique.name, "ordering by unique index");
        return unique.columns.clone();
    }

    if let Some(first) = table
        .columns
        .iter()
        .min_by_key(|c| c.ordinal_pos)
    {
        debug!(table = %table.full_name(), column = %first.name, "ordering by first column");
        return vec![first.name.clone()];
    }

    debug!(table = %table.full_name(), "no usable ordering, export unordered");
    Vec::new()
}
