//! Per-database pipeline orchestration and report assembly.
//!
//! One [`DatabaseReport`] per inspected database, produced by running
//! the full pipeline strictly sequentially: capability probe → ranked
//! lists → snapshots → explain passes → findings. Every failure along
//! the way degrades the report instead of aborting it.

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use crate::analysis::{Finding, run_analysis};
use crate::collector::Inspector;
use crate::collector::explain::{ExplainBudget, run_explain_pass};
use crate::models::StatementReport;

/// Self-contained result of one run.
#[derive(Serialize)]
pub struct Report {
    pub generated_at: String,
    pub databases: Vec<DatabaseReport>,
}

impl Report {
    pub fn new() -> Self {
        Self {
            generated_at: Utc::now().to_rfc3339(),
            databases: Vec::new(),
        }
    }
}

impl Default for Report {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything collected for one database.
#[derive(Serialize)]
pub struct DatabaseReport {
    pub datname: String,
    /// True iff at least one of the by-total-time or by-calls lists
    /// came back non-empty.
    pub statistics_available: bool,
    pub statements: StatementReport,
    pub findings: Vec<Finding>,
    /// Connection-level error, when the database could not be reached.
    pub error: Option<String>,
}

impl DatabaseReport {
    fn unavailable(datname: String, error: String) -> Self {
        Self {
            datname,
            statistics_available: false,
            statements: StatementReport::default(),
            findings: Vec::new(),
            error: Some(error),
        }
    }
}

/// Runs the statement insight pipeline against one database.
pub fn inspect_database(
    datname: String,
    inspector: &mut Inspector,
    explain_limit: i64,
) -> DatabaseReport {
    if let Err(e) = inspector.try_connect() {
        return DatabaseReport::unavailable(datname, e.to_string());
    }

    let Some(capability) = inspector.probe_statements_capability() else {
        // Statistics extension absent: reduced functionality, not an error.
        info!(database = %datname, "statement statistics unavailable");
        return DatabaseReport {
            datname,
            statistics_available: false,
            statements: StatementReport::default(),
            findings: Vec::new(),
            error: None,
        };
    };

    let mut statements = inspector.collect_statement_report(&capability);
    let tables = inspector.collect_table_snapshot();
    let indexes = inspector.collect_index_snapshot();
    debug!(
        database = %datname,
        tables = tables.len(),
        indexed_tables = indexes.len(),
        "snapshots collected"
    );

    if statements.available() {
        // Only the two lists the report leads with earn plan attempts,
        // each under its own fresh budget.
        let mut budget = ExplainBudget::new(explain_limit);
        run_explain_pass(
            inspector,
            &mut statements.by_total_time,
            &tables,
            &indexes,
            &mut budget,
        );

        let mut budget = ExplainBudget::new(explain_limit);
        run_explain_pass(
            inspector,
            &mut statements.by_calls,
            &tables,
            &indexes,
            &mut budget,
        );
    }

    let findings = run_analysis(&statements);
    info!(
        database = %datname,
        findings = findings.len(),
        "database inspection finished"
    );

    DatabaseReport {
        datname,
        statistics_available: statements.available(),
        statements,
        findings,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_database_reported_without_statistics() {
        let mut inspector =
            Inspector::with_connection_string("host=/nonexistent dbname=x".to_string());
        let report = inspect_database("x".to_string(), &mut inspector, 10);

        assert_eq!(report.datname, "x");
        assert!(!report.statistics_available);
        assert!(report.error.is_some());
        assert!(report.findings.is_empty());
    }
}
