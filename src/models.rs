//! Data records produced by the statement insight pipeline.
//!
//! Everything here is a plain in-memory record: created fresh on every
//! run, consumed read-only by the analysis rules and the report output,
//! never persisted between runs.

use serde::{Deserialize, Serialize};

/// Resolved feature set of the statement-statistics extension.
///
/// Probed once per run; every SQL builder that needs time/IO/block
/// columns branches on these flags instead of re-probing. Columns whose
/// flag is false never appear in generated SQL.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatementsCapability {
    /// Schema hosting pg_stat_statements. Empty when the unqualified
    /// name resolves through the search path.
    pub schema: String,

    /// Modern time-column names (total_exec_time and friends) present.
    /// Older extension versions expose total_time/mean_time instead.
    pub has_exec_time_columns: bool,

    /// blk_read_time / blk_write_time columns present.
    pub has_io_time_columns: bool,

    /// Per-block-type read/write counter columns present.
    pub has_block_columns: bool,
}

impl StatementsCapability {
    /// Returns the relation name to use in FROM clauses,
    /// schema-qualified when a schema was resolved.
    pub fn relation(&self) -> String {
        if self.schema.is_empty() {
            "pg_stat_statements".to_string()
        } else {
            format!("{}.pg_stat_statements", self.schema)
        }
    }
}

/// Structured interpretation of one EXPLAIN plan.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct PlanAdvice {
    /// Raw plan text as returned by EXPLAIN. May be empty when only
    /// heuristic suggestions were produced.
    pub plan: String,

    /// Short human labels in a fixed order, e.g. "Seq Scan on orders",
    /// "Hash Join", "Parallel operation(s)".
    pub highlights: Vec<String>,

    /// Prioritized suggestion strings.
    pub suggestions: Vec<String>,

    /// At least one suggestion recommends adding or using an index.
    pub can_index: bool,

    /// At least one suggestion recommends rewriting the query.
    pub can_refactor: bool,
}

impl PlanAdvice {
    /// True when the advice carries no plan text, highlights or
    /// suggestions. Empty advice is never attached to a statement.
    pub fn is_empty(&self) -> bool {
        self.plan.is_empty() && self.highlights.is_empty() && self.suggestions.is_empty()
    }
}

/// One aggregated statement row from the statistics extension.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct StatementInfo {
    /// Query text verbatim, may contain positional placeholders $1…$n.
    /// Source: `pg_stat_statements.query`
    pub query: String,

    /// Number of times the statement was executed.
    /// Source: `pg_stat_statements.calls`
    pub calls: i64,

    /// Total elapsed time in milliseconds.
    /// Source: `total_exec_time` (or legacy `total_time`)
    pub total_time: f64,

    /// Mean elapsed time in milliseconds.
    /// Source: `mean_exec_time` (or legacy `mean_time`)
    pub mean_time: f64,

    /// Total rows retrieved or affected.
    /// Source: `pg_stat_statements.rows`
    pub rows: i64,

    /// blk_read_time + blk_write_time in milliseconds; 0 when the I/O
    /// time columns are unavailable.
    pub io_time: f64,

    /// Approximate CPU time: total minus I/O time; equals total time
    /// when the I/O time columns are unavailable.
    pub cpu_time: f64,

    /// Sum of shared/local/temp blocks read and written; 0 when the
    /// block counter columns are unavailable.
    pub blocks: i64,

    /// Call rate normalized by the stats-window age. Left 0 when the
    /// window age is non-positive.
    pub calls_per_hour: f64,

    /// Attached by the explain stage; absent when the statement was
    /// not selected or plan collection failed.
    pub advice: Option<PlanAdvice>,

    /// Set whenever non-empty advice is attached.
    pub needs_attention: bool,
}

/// Up to five independently-ordered statement lists for one database.
///
/// A list whose query failed entirely is simply empty; this is reduced
/// functionality, not an error.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StatementReport {
    pub by_total_time: Vec<StatementInfo>,
    pub by_cpu_time: Vec<StatementInfo>,
    pub by_io_time: Vec<StatementInfo>,
    pub by_calls: Vec<StatementInfo>,
    pub by_blocks: Vec<StatementInfo>,
}

impl StatementReport {
    /// Statistics are considered available iff at least one of the
    /// by-total-time or by-calls lists is non-empty.
    pub fn available(&self) -> bool {
        !self.by_total_time.is_empty() || !self.by_calls.is_empty()
    }
}

/// One table from the external table-size snapshot.
/// Source: `pg_stat_user_tables`
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct TableInfo {
    pub schema: String,
    pub name: String,
    /// Estimated live rows. Source: `n_live_tup`
    pub live_rows: i64,
}

/// One (schema, table) pair from the index inventory snapshot:
/// the table has at least one index.
/// Source: `pg_stat_user_indexes`
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IndexInfo {
    pub schema: String,
    pub table: String,
}
