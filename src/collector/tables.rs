//! One-shot table snapshot from pg_stat_user_tables.
//!
//! Live-row estimates are used by the advice synthesizer to size
//! sequential-scan targets. A failed query yields an empty snapshot.

use tracing::warn;

use crate::models::TableInfo;

use super::queries::build_table_snapshot_query;
use super::{Inspector, QUERY_TIMEOUT};

impl Inspector {
    /// Collects (schema, table, live-row estimate) records.
    pub fn collect_table_snapshot(&mut self) -> Vec<TableInfo> {
        match self.query_rows(build_table_snapshot_query(), QUERY_TIMEOUT) {
            Ok(rows) => rows
                .iter()
                .map(|row| TableInfo {
                    schema: row.get("schemaname"),
                    name: row.get("relname"),
                    live_rows: row.get("n_live_tup"),
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, "table snapshot unavailable");
                Vec::new()
            }
        }
    }
}
