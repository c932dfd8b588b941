//! Capability probing for the statement-statistics extension.
//!
//! Column names and availability in pg_stat_statements vary across
//! PostgreSQL and extension versions. The probe runs once per run and
//! produces a [`StatementsCapability`] descriptor; every downstream SQL
//! builder branches only on its flags instead of re-probing.
//!
//! All probes are pure read-only introspection, each bounded by its own
//! short timeout so a slow metadata query cannot block the pipeline.

use tracing::debug;

use crate::models::StatementsCapability;

use super::{Inspector, PROBE_TIMEOUT};

const EXTENSION_PROBE: &str = "SELECT 1 FROM pg_extension WHERE extname = 'pg_stat_statements'";

const RELATION_PROBE: &str = "SELECT 1 FROM pg_class c \
     JOIN pg_namespace n ON n.oid = c.relnamespace \
     WHERE c.relname = 'pg_stat_statements'";

const FUNCTION_PROBE: &str = "SELECT 1 FROM pg_proc WHERE proname = 'pg_stat_statements'";

const BEST_EFFORT_PROBE: &str = "SELECT 1 FROM pg_stat_statements LIMIT 1";

const SCHEMA_LOOKUP: &str = "SELECT n.nspname FROM pg_class c \
     JOIN pg_namespace n ON n.oid = c.relnamespace \
     WHERE c.relname = 'pg_stat_statements' \
     LIMIT 1";

const SEARCH_PATH_PROBE: &str = "SELECT 1 FROM pg_stat_statements LIMIT 0";

fn column_probe(column: &str) -> String {
    format!(
        "SELECT 1 FROM information_schema.columns \
         WHERE table_name = 'pg_stat_statements' AND column_name = '{}'",
        column
    )
}

impl Inspector {
    /// Detects the statement-statistics extension and resolves its
    /// feature set.
    ///
    /// Returns `None` when the relation cannot be found by any of the
    /// detection steps; statistics collection is then skipped for the
    /// run. This is reduced functionality, never an error.
    pub fn probe_statements_capability(&mut self) -> Option<StatementsCapability> {
        if !self.statements_relation_exists() {
            debug!("pg_stat_statements not detected, statistics skipped");
            return None;
        }

        let capability = StatementsCapability {
            schema: self.resolve_statements_schema(),
            has_exec_time_columns: self.has_column("total_exec_time"),
            has_io_time_columns: self.has_column("blk_read_time"),
            has_block_columns: self.has_column("shared_blks_read"),
        };
        debug!(
            schema = %capability.schema,
            exec_time = capability.has_exec_time_columns,
            io_time = capability.has_io_time_columns,
            blocks = capability.has_block_columns,
            "pg_stat_statements capability resolved"
        );
        Some(capability)
    }

    /// Tries the detection steps in order; the first success wins.
    fn statements_relation_exists(&mut self) -> bool {
        for probe in [EXTENSION_PROBE, RELATION_PROBE, FUNCTION_PROBE] {
            match self.query_rows(probe, PROBE_TIMEOUT) {
                Ok(rows) if !rows.is_empty() => return true,
                Ok(_) => {}
                Err(_) => {}
            }
        }
        // Last resort: the relation may be visible even when the
        // catalogs above are not readable by this role.
        self.query_rows(BEST_EFFORT_PROBE, PROBE_TIMEOUT).is_ok()
    }

    /// Resolves the schema hosting the relation. Empty string means the
    /// unqualified name already resolves through the search path.
    fn resolve_statements_schema(&mut self) -> String {
        if self.query_rows(SEARCH_PATH_PROBE, PROBE_TIMEOUT).is_ok() {
            return String::new();
        }

        match self.query_rows(SCHEMA_LOOKUP, PROBE_TIMEOUT) {
            Ok(rows) => rows
                .first()
                .map(|row| row.get::<_, String>(0))
                .unwrap_or_default(),
            Err(_) => String::new(),
        }
    }

    fn has_column(&mut self, column: &str) -> bool {
        match self.query_rows(&column_probe(column), PROBE_TIMEOUT) {
            Ok(rows) => !rows.is_empty(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_probe_targets_information_schema() {
        let q = column_probe("total_exec_time");
        assert!(q.contains("information_schema.columns"));
        assert!(q.contains("table_name = 'pg_stat_statements'"));
        assert!(q.contains("column_name = 'total_exec_time'"));
    }

    #[test]
    fn detection_probes_cover_all_catalog_paths() {
        assert!(EXTENSION_PROBE.contains("pg_extension"));
        assert!(RELATION_PROBE.contains("pg_class"));
        assert!(RELATION_PROBE.contains("pg_namespace"));
        assert!(FUNCTION_PROBE.contains("pg_proc"));
        assert!(BEST_EFFORT_PROBE.contains("pg_stat_statements"));
    }
}
