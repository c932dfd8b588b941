//! One-shot index inventory from pg_stat_user_indexes.
//!
//! Records only which (schema, table) pairs have at least one index;
//! the advice synthesizer flags tables absent from this inventory.

use tracing::warn;

use crate::models::IndexInfo;

use super::queries::build_index_snapshot_query;
use super::{Inspector, QUERY_TIMEOUT};

impl Inspector {
    /// Collects distinct (schema, table) pairs that have an index.
    pub fn collect_index_snapshot(&mut self) -> Vec<IndexInfo> {
        match self.query_rows(build_index_snapshot_query(), QUERY_TIMEOUT) {
            Ok(rows) => rows
                .iter()
                .map(|row| IndexInfo {
                    schema: row.get("schemaname"),
                    table: row.get("relname"),
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, "index snapshot unavailable");
                Vec::new()
            }
        }
    }
}
