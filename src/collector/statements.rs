//! Ranked statement collection from the statistics extension.
//!
//! Produces up to five independently-ordered lists (total time, cpu
//! time, io time, calls, io blocks), each capped at
//! [`RANKED_LIST_LIMIT`] rows. A list whose query fails entirely is
//! simply empty; the run continues with whatever it has.

use tracing::{debug, warn};

use crate::models::{StatementInfo, StatementReport, StatementsCapability};

use super::queries::{
    RANKED_LIST_LIMIT, RankKind, TimeColumns, build_ranked_statements_query,
    stats_age_from_database_query, stats_age_from_info_query,
};
use super::{Inspector, PROBE_TIMEOUT, QUERY_TIMEOUT};

/// Trivial transaction-control statements excluded from every list.
const TRANSACTION_CONTROL: [&str; 3] = ["BEGIN", "COMMIT", "DISCARD ALL"];

fn is_transaction_control(query: &str) -> bool {
    let trimmed = query.trim().trim_end_matches(';').trim();
    TRANSACTION_CONTROL
        .iter()
        .any(|stmt| trimmed.eq_ignore_ascii_case(stmt))
}

/// Normalizes call counts into calls-per-hour using the stats-window
/// age. Left at zero when the window age is non-positive: never divide
/// by a non-positive duration.
pub(crate) fn apply_call_rate(list: &mut [StatementInfo], window_age_secs: f64) {
    if window_age_secs <= 0.0 {
        return;
    }
    let hours = window_age_secs / 3600.0;
    for stmt in list {
        stmt.calls_per_hour = stmt.calls as f64 / hours;
    }
}

impl Inspector {
    /// Collects all five ranked lists for one database.
    ///
    /// The time-column variant chosen by the first successful query is
    /// reused for every subsequent list in the same run.
    pub fn collect_statement_report(&mut self, cap: &StatementsCapability) -> StatementReport {
        let mut time = if cap.has_exec_time_columns {
            TimeColumns::Exec
        } else {
            TimeColumns::Legacy
        };

        let window_age_secs = self.stats_window_age_secs();

        let mut report = StatementReport {
            by_total_time: self.fetch_ranked_list(cap, &mut time, RankKind::TotalTime),
            by_cpu_time: self.fetch_ranked_list(cap, &mut time, RankKind::CpuTime),
            by_io_time: self.fetch_ranked_list(cap, &mut time, RankKind::IoTime),
            by_calls: self.fetch_ranked_list(cap, &mut time, RankKind::Calls),
            by_blocks: self.fetch_ranked_list(cap, &mut time, RankKind::Blocks),
        };

        for list in [
            &mut report.by_total_time,
            &mut report.by_cpu_time,
            &mut report.by_io_time,
            &mut report.by_calls,
            &mut report.by_blocks,
        ] {
            apply_call_rate(list, window_age_secs);
        }

        report
    }

    /// Fetches one ranked list. Tries the current time-column variant
    /// first; on query failure retries identically with the other
    /// variant and sticks with whichever succeeded.
    fn fetch_ranked_list(
        &mut self,
        cap: &StatementsCapability,
        time: &mut TimeColumns,
        kind: RankKind,
    ) -> Vec<StatementInfo> {
        let query = build_ranked_statements_query(cap, *time, kind);
        match self.query_rows(&query, QUERY_TIMEOUT) {
            Ok(rows) => return parse_statement_rows(&rows),
            Err(e) => {
                debug!(list = kind.label(), error = %e, "ranked list failed, retrying with other time columns");
            }
        }

        let flipped = time.flipped();
        let query = build_ranked_statements_query(cap, flipped, kind);
        match self.query_rows(&query, QUERY_TIMEOUT) {
            Ok(rows) => {
                *time = flipped;
                parse_statement_rows(&rows)
            }
            Err(e) => {
                warn!(list = kind.label(), error = %e, "ranked list unavailable");
                Vec::new()
            }
        }
    }

    /// Elapsed time since the statistics extension was last reset.
    ///
    /// pg_stat_statements_info exists on PG 14+; older servers fall
    /// back to the per-database stats_reset timestamp. Both failing
    /// leaves the age at 0 and calls-per-hour stays 0.
    pub fn stats_window_age_secs(&mut self) -> f64 {
        for query in [stats_age_from_info_query(), stats_age_from_database_query()] {
            if let Ok(rows) = self.query_rows(query, PROBE_TIMEOUT)
                && let Some(row) = rows.first()
            {
                return row.get::<_, f64>("age");
            }
        }
        0.0
    }
}

fn parse_statement_rows(rows: &[postgres::Row]) -> Vec<StatementInfo> {
    let mut out = Vec::with_capacity(rows.len().min(RANKED_LIST_LIMIT));
    for row in rows {
        let query: String = row.get("query");
        if is_transaction_control(&query) {
            continue;
        }
        out.push(StatementInfo {
            query,
            calls: row.get("calls"),
            total_time: row.get("total_time"),
            mean_time: row.get("mean_time"),
            rows: row.get("rows"),
            io_time: row.get("io_time"),
            cpu_time: row.get("cpu_time"),
            blocks: row.get("blocks"),
            calls_per_hour: 0.0,
            advice: None,
            needs_attention: false,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_statement(query: &str, calls: i64) -> StatementInfo {
        StatementInfo {
            query: query.to_string(),
            calls,
            ..Default::default()
        }
    }

    #[test]
    fn transaction_control_matched_case_insensitively() {
        assert!(is_transaction_control("BEGIN"));
        assert!(is_transaction_control("begin"));
        assert!(is_transaction_control("  Commit ; "));
        assert!(is_transaction_control("discard all"));
        assert!(!is_transaction_control("SELECT 1"));
        assert!(!is_transaction_control("BEGIN WORK"));
    }

    #[test]
    fn call_rate_normalized_by_window_age() {
        let mut list = vec![make_statement("SELECT 1", 7200)];
        apply_call_rate(&mut list, 2.0 * 3600.0);
        assert!((list[0].calls_per_hour - 3600.0).abs() < 1e-9);
    }

    #[test]
    fn call_rate_left_zero_for_non_positive_age() {
        let mut list = vec![make_statement("SELECT 1", 100)];
        apply_call_rate(&mut list, 0.0);
        assert_eq!(list[0].calls_per_hour, 0.0);

        apply_call_rate(&mut list, -5.0);
        assert_eq!(list[0].calls_per_hour, 0.0);
    }

    #[test]
    fn call_rate_applied_uniformly() {
        let mut list = vec![make_statement("a", 10), make_statement("b", 20)];
        apply_call_rate(&mut list, 3600.0);
        assert!((list[0].calls_per_hour - 10.0).abs() < 1e-9);
        assert!((list[1].calls_per_hour - 20.0).abs() < 1e-9);
    }
}
