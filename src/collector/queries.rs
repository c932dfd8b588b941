//! SQL query builders for the statement-statistics extension.
//!
//! All builders branch only on the resolved [`StatementsCapability`]
//! flags and the chosen time-column variant; columns whose flag is
//! false never appear in the generated SQL.

use crate::models::StatementsCapability;

/// Row cap for every ranked list.
pub(crate) const RANKED_LIST_LIMIT: usize = 20;

/// Which time-column naming the extension exposes.
///
/// Modern extension versions renamed total_time/mean_time to
/// total_exec_time/mean_exec_time. The ranker tries the variant
/// suggested by the capability probe first and falls back once.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeColumns {
    Exec,
    Legacy,
}

impl TimeColumns {
    pub(crate) fn total(self) -> &'static str {
        match self {
            TimeColumns::Exec => "s.total_exec_time",
            TimeColumns::Legacy => "s.total_time",
        }
    }

    pub(crate) fn mean(self) -> &'static str {
        match self {
            TimeColumns::Exec => "s.mean_exec_time",
            TimeColumns::Legacy => "s.mean_time",
        }
    }

    /// The other variant, for the single retry on query failure.
    pub(crate) fn flipped(self) -> Self {
        match self {
            TimeColumns::Exec => TimeColumns::Legacy,
            TimeColumns::Legacy => TimeColumns::Exec,
        }
    }
}

/// Ordering dimension of a ranked statement list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RankKind {
    TotalTime,
    CpuTime,
    IoTime,
    Calls,
    Blocks,
}

impl RankKind {
    pub(crate) fn label(self) -> &'static str {
        match self {
            RankKind::TotalTime => "total time",
            RankKind::CpuTime => "cpu time",
            RankKind::IoTime => "io time",
            RankKind::Calls => "calls",
            RankKind::Blocks => "io blocks",
        }
    }
}

fn io_time_expr(cap: &StatementsCapability) -> &'static str {
    if cap.has_io_time_columns {
        "s.blk_read_time + s.blk_write_time"
    } else {
        "0"
    }
}

fn cpu_time_expr(cap: &StatementsCapability, time: TimeColumns) -> String {
    if cap.has_io_time_columns {
        format!("{} - (s.blk_read_time + s.blk_write_time)", time.total())
    } else {
        time.total().to_string()
    }
}

fn blocks_expr(cap: &StatementsCapability) -> &'static str {
    if cap.has_block_columns {
        "s.shared_blks_read + s.shared_blks_written \
         + s.local_blks_read + s.local_blks_written \
         + s.temp_blks_read + s.temp_blks_written"
    } else {
        "0"
    }
}

/// Ordering expression for a list; degrades to the plain total-time
/// column when the list's natural expression is unavailable.
fn order_expr(cap: &StatementsCapability, time: TimeColumns, kind: RankKind) -> String {
    match kind {
        RankKind::TotalTime => time.total().to_string(),
        RankKind::Calls => "s.calls".to_string(),
        RankKind::CpuTime => {
            if cap.has_io_time_columns {
                cpu_time_expr(cap, time)
            } else {
                time.total().to_string()
            }
        }
        RankKind::IoTime => {
            if cap.has_io_time_columns {
                io_time_expr(cap).to_string()
            } else {
                time.total().to_string()
            }
        }
        RankKind::Blocks => {
            if cap.has_block_columns {
                blocks_expr(cap).to_string()
            } else {
                time.total().to_string()
            }
        }
    }
}

/// Builds one ranked-list query against the statistics relation.
pub(crate) fn build_ranked_statements_query(
    cap: &StatementsCapability,
    time: TimeColumns,
    kind: RankKind,
) -> String {
    format!(
        r#"
            SELECT
                COALESCE(s.query, '') as query,
                COALESCE(s.calls, 0)::bigint as calls,
                COALESCE({total}, 0)::double precision as total_time,
                COALESCE({mean}, 0)::double precision as mean_time,
                COALESCE(s.rows, 0)::bigint as rows,
                COALESCE({io}, 0)::double precision as io_time,
                COALESCE({cpu}, 0)::double precision as cpu_time,
                COALESCE({blocks}, 0)::bigint as blocks
            FROM {relation} s
            ORDER BY {order} DESC
            LIMIT {limit}
        "#,
        total = time.total(),
        mean = time.mean(),
        io = io_time_expr(cap),
        cpu = cpu_time_expr(cap, time),
        blocks = blocks_expr(cap),
        relation = cap.relation(),
        order = order_expr(cap, time, kind),
        limit = RANKED_LIST_LIMIT,
    )
}

/// Stats-window age in seconds from pg_stat_statements_info (PG 14+).
pub(crate) fn stats_age_from_info_query() -> &'static str {
    r#"
        SELECT COALESCE(EXTRACT(EPOCH FROM (now() - stats_reset)), 0)::double precision as age
        FROM pg_stat_statements_info
    "#
}

/// Fallback stats-window age from pg_stat_database for the current
/// database, for servers without pg_stat_statements_info.
pub(crate) fn stats_age_from_database_query() -> &'static str {
    r#"
        SELECT COALESCE(EXTRACT(EPOCH FROM (now() - stats_reset)), 0)::double precision as age
        FROM pg_stat_database
        WHERE datname = current_database()
    "#
}

/// One-shot table snapshot: live-row estimates for sizing advice.
pub(crate) fn build_table_snapshot_query() -> &'static str {
    r#"
        SELECT
            COALESCE(schemaname, '') as schemaname,
            COALESCE(relname, '') as relname,
            COALESCE(n_live_tup, 0)::bigint as n_live_tup
        FROM pg_stat_user_tables
    "#
}

/// One-shot index inventory: (schema, table) pairs with at least one index.
pub(crate) fn build_index_snapshot_query() -> &'static str {
    r#"
        SELECT DISTINCT
            COALESCE(schemaname, '') as schemaname,
            COALESCE(relname, '') as relname
        FROM pg_stat_user_indexes
    "#
}
