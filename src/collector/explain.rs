//! Safe plan collection under a two-tier explain budget.
//!
//! The budgeter walks one ranked list, deduplicates by exact query
//! text, filters to the read-only statement-shape allow-list and
//! decides which statements get a live plan attempt. The executor then
//! obtains an estimate-only plan without ever executing the statement:
//! EXPLAIN never carries ANALYZE, so there are no row-level side
//! effects and no risk of runaway execution.
//!
//! Failures at any step silently skip the candidate. Partial coverage
//! is acceptable and expected: the role may lack privilege, or a
//! statement's table may have been dropped since it was captured.

use std::collections::HashSet;
use std::time::Duration;

use tracing::debug;

use crate::analysis::advice::synthesize_advice;
use crate::analysis::plan_signals::extract_signals;
use crate::models::{IndexInfo, StatementInfo, TableInfo};

use super::PlanRunner;

/// Primary explain cap when the configured limit is non-positive.
pub const DEFAULT_EXPLAIN_LIMIT: usize = 10;

/// Fixed overflow cap for statistical outliers admitted after the
/// primary budget is exhausted.
pub const OUTLIER_CAP: usize = 5;

/// Mean execution time that alone marks a statement as a suspect.
const SUSPECT_MEAN_MS: f64 = 20.0;
/// Mean time threshold for the frequent-statement suspect rule.
const SUSPECT_HOT_MEAN_MS: f64 = 5.0;
/// Call count threshold for the frequent-statement suspect rule.
const SUSPECT_HOT_CALLS: i64 = 1000;

const PREPARE_TIMEOUT: Duration = Duration::from_secs(3);
const EXPLAIN_TIMEOUT: Duration = Duration::from_secs(5);
const DEALLOCATE_TIMEOUT: Duration = Duration::from_secs(1);

/// Transient per-pass budget state.
///
/// Created fresh for each ranked list submitted to an explain pass and
/// discarded afterwards; no state is shared across lists or databases.
pub struct ExplainBudget {
    primary_limit: usize,
    primary_used: usize,
    outlier_used: usize,
    seen: HashSet<String>,
    sequence: usize,
}

impl ExplainBudget {
    /// Builds a budget from the configured limit. Zero or negative
    /// falls back to the default of 10.
    pub fn new(configured_limit: i64) -> Self {
        let primary_limit = if configured_limit > 0 {
            configured_limit as usize
        } else {
            DEFAULT_EXPLAIN_LIMIT
        };
        Self {
            primary_limit,
            primary_used: 0,
            outlier_used: 0,
            seen: HashSet::new(),
            sequence: 0,
        }
    }

    /// Number of statements that received advice in this pass.
    pub fn selected(&self) -> usize {
        self.primary_used + self.outlier_used
    }

    fn has_room(&self) -> bool {
        self.primary_used < self.primary_limit || self.outlier_used < OUTLIER_CAP
    }

    fn primary_exhausted(&self) -> bool {
        self.primary_used >= self.primary_limit
    }

    /// Records the text; returns false if it was already seen in this pass.
    fn mark_seen(&mut self, text: &str) -> bool {
        self.seen.insert(text.to_string())
    }

    /// Charges a successful plan collection, primary counter preferred.
    fn consume(&mut self) {
        if self.primary_used < self.primary_limit {
            self.primary_used += 1;
        } else {
            self.outlier_used += 1;
        }
    }

    fn next_statement_name(&mut self) -> String {
        self.sequence += 1;
        format!("pgsleuth_expl_{}", self.sequence)
    }
}

/// Only read-only statement shapes are ever sent to EXPLAIN.
pub fn is_safe_statement(query: &str) -> bool {
    let upper = query.trim().to_uppercase();
    upper.starts_with("SELECT") || upper.starts_with("WITH")
}

/// Statistical outlier worth explaining even after the primary budget
/// is exhausted: genuinely slow, or moderately slow but very hot.
pub fn is_suspect(stmt: &StatementInfo) -> bool {
    stmt.mean_time >= SUSPECT_MEAN_MS
        || (stmt.mean_time >= SUSPECT_HOT_MEAN_MS && stmt.calls >= SUSPECT_HOT_CALLS)
}

/// True when the text carries positional parameter markers ($1…$n).
fn has_parameter_markers(query: &str) -> bool {
    let bytes = query.as_bytes();
    bytes
        .windows(2)
        .any(|w| w[0] == b'$' && w[1].is_ascii_digit())
}

/// Replaces every positional parameter marker with the literal NULL.
///
/// Sacrifices plan accuracy for parameterized queries but guarantees
/// forward progress when PREPARE cannot infer parameter types.
fn substitute_null_params(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    let mut chars = query.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '$' && chars.peek().is_some_and(|n| n.is_ascii_digit()) {
            out.push_str("NULL");
            while chars.peek().is_some_and(|n| n.is_ascii_digit()) {
                chars.next();
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Runs one explain pass over a ranked list, in original order,
/// attaching advice to the statements that earn it.
pub fn run_explain_pass(
    runner: &mut dyn PlanRunner,
    statements: &mut [StatementInfo],
    tables: &[TableInfo],
    indexes: &[IndexInfo],
    budget: &mut ExplainBudget,
) {
    for stmt in statements.iter_mut() {
        if !budget.has_room() {
            break;
        }

        let trimmed = stmt.query.trim();
        if trimmed.is_empty() || !budget.mark_seen(trimmed) {
            continue;
        }
        if !is_safe_statement(trimmed) {
            continue;
        }

        // Past the primary limit only suspects are worth a plan;
        // skipping here consumes no budget.
        if budget.primary_exhausted() && !is_suspect(stmt) {
            continue;
        }

        let name = budget.next_statement_name();
        let Some(plan_lines) = collect_plan(runner, &stmt.query, &name) else {
            continue;
        };

        let signals = extract_signals(&plan_lines);
        let advice = synthesize_advice(plan_lines.join("\n"), &signals, tables, indexes);
        if advice.is_empty() {
            continue;
        }

        stmt.needs_attention = true;
        stmt.advice = Some(advice);
        budget.consume();
    }

    debug!(
        selected = budget.selected(),
        "explain pass over ranked list finished"
    );
}

/// Obtains raw plan lines for one candidate, or nothing, silently.
///
/// Parameterized texts go through PREPARE / EXPLAIN EXECUTE /
/// DEALLOCATE; the deallocation runs even when an earlier step failed
/// so prepared statements never leak across the session. A failed
/// PREPARE falls back to a single NULL-substituted plain EXPLAIN.
fn collect_plan(runner: &mut dyn PlanRunner, query: &str, name: &str) -> Option<Vec<String>> {
    if !has_parameter_markers(query) {
        return runner
            .query_lines(&format!("EXPLAIN {}", query), EXPLAIN_TIMEOUT)
            .ok();
    }

    let prepared = runner.execute(&format!("PREPARE {} AS {}", name, query), PREPARE_TIMEOUT);

    let plan = match prepared {
        Ok(()) => runner
            .query_lines(&format!("EXPLAIN EXECUTE {}", name), EXPLAIN_TIMEOUT)
            .ok(),
        Err(_) => None,
    };

    let _ = runner.execute(&format!("DEALLOCATE {}", name), DEALLOCATE_TIMEOUT);

    if prepared.is_err() {
        let rewritten = substitute_null_params(query);
        return runner
            .query_lines(&format!("EXPLAIN {}", rewritten), EXPLAIN_TIMEOUT)
            .ok();
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::CollectError;

    /// Scripted stand-in for a live connection: records every SQL it
    /// is given and answers from a fixed script.
    struct ScriptedRunner {
        issued: Vec<String>,
        fail_prefixes: Vec<&'static str>,
        plan: Vec<String>,
    }

    impl ScriptedRunner {
        fn with_plan(lines: &[&str]) -> Self {
            Self {
                issued: Vec::new(),
                fail_prefixes: Vec::new(),
                plan: lines.iter().map(|l| l.to_string()).collect(),
            }
        }

        fn failing_on(mut self, prefix: &'static str) -> Self {
            self.fail_prefixes.push(prefix);
            self
        }

        fn fails(&self, sql: &str) -> bool {
            self.fail_prefixes.iter().any(|p| sql.starts_with(p))
        }

        fn issued_with_prefix(&self, prefix: &str) -> usize {
            self.issued.iter().filter(|s| s.starts_with(prefix)).count()
        }
    }

    impl PlanRunner for ScriptedRunner {
        fn execute(&mut self, sql: &str, _timeout: Duration) -> Result<(), CollectError> {
            self.issued.push(sql.to_string());
            if self.fails(sql) {
                Err(CollectError::QueryError("scripted failure".to_string()))
            } else {
                Ok(())
            }
        }

        fn query_lines(
            &mut self,
            sql: &str,
            _timeout: Duration,
        ) -> Result<Vec<String>, CollectError> {
            self.issued.push(sql.to_string());
            if self.fails(sql) {
                Err(CollectError::QueryError("scripted failure".to_string()))
            } else {
                Ok(self.plan.clone())
            }
        }
    }

    fn make_statement(query: &str, mean_time: f64, calls: i64) -> StatementInfo {
        StatementInfo {
            query: query.to_string(),
            mean_time,
            calls,
            ..Default::default()
        }
    }

    fn seq_scan_plan() -> Vec<&'static str> {
        vec!["Seq Scan on orders  (cost=0.00..155.00 rows=10000 width=4)"]
    }

    #[test]
    fn safe_statement_allow_list() {
        assert!(is_safe_statement("SELECT * FROM t"));
        assert!(is_safe_statement("  select 1"));
        assert!(is_safe_statement("WITH x AS (SELECT 1) SELECT * FROM x"));
        assert!(!is_safe_statement("DELETE FROM t WHERE id=$1"));
        assert!(!is_safe_statement("UPDATE t SET a=1"));
        assert!(!is_safe_statement("INSERT INTO t VALUES (1)"));
        assert!(!is_safe_statement("VACUUM t"));
    }

    #[test]
    fn suspect_thresholds() {
        assert!(is_suspect(&make_statement("q", 25.0, 10)));
        assert!(is_suspect(&make_statement("q", 20.0, 1)));
        assert!(is_suspect(&make_statement("q", 5.0, 1000)));
        assert!(!is_suspect(&make_statement("q", 5.0, 999)));
        assert!(!is_suspect(&make_statement("q", 4.9, 100_000)));
        assert!(!is_suspect(&make_statement("q", 1.0, 10)));
    }

    #[test]
    fn null_substitution_replaces_all_markers() {
        assert_eq!(
            substitute_null_params("SELECT * FROM t WHERE a=$1 AND b=$23"),
            "SELECT * FROM t WHERE a=NULL AND b=NULL"
        );
        assert_eq!(
            substitute_null_params("SELECT price * 2 FROM t"),
            "SELECT price * 2 FROM t"
        );
        // Bare dollar without digits is not a marker.
        assert_eq!(substitute_null_params("SELECT '$'"), "SELECT '$'");
    }

    #[test]
    fn parameter_marker_detection() {
        assert!(has_parameter_markers("SELECT * FROM t WHERE id=$1"));
        assert!(!has_parameter_markers("SELECT * FROM t"));
        assert!(!has_parameter_markers("SELECT '$' FROM t"));
    }

    #[test]
    fn unsafe_statements_never_explained() {
        let mut runner = ScriptedRunner::with_plan(&seq_scan_plan());
        let mut stmts = vec![make_statement("DELETE FROM t WHERE id=$1", 100.0, 5000)];
        let mut budget = ExplainBudget::new(10);

        run_explain_pass(&mut runner, &mut stmts, &[], &[], &mut budget);

        assert!(runner.issued.is_empty(), "no SQL may be issued");
        assert!(stmts[0].advice.is_none());
        assert!(!stmts[0].needs_attention);
    }

    #[test]
    fn duplicate_texts_explained_once() {
        let mut runner = ScriptedRunner::with_plan(&seq_scan_plan());
        let mut stmts = vec![
            make_statement("SELECT * FROM orders", 1.0, 1),
            make_statement("SELECT * FROM orders", 1.0, 1),
        ];
        let mut budget = ExplainBudget::new(10);

        run_explain_pass(&mut runner, &mut stmts, &[], &[], &mut budget);

        assert_eq!(runner.issued_with_prefix("EXPLAIN"), 1);
        assert!(stmts[0].advice.is_some());
        assert!(stmts[1].advice.is_none());
    }

    #[test]
    fn primary_budget_caps_plain_candidates() {
        let mut runner = ScriptedRunner::with_plan(&seq_scan_plan());
        // 8 distinct non-suspect statements, limit 3: only first 3 explained.
        let mut stmts: Vec<StatementInfo> = (0..8)
            .map(|i| make_statement(&format!("SELECT {} FROM t", i), 1.0, 1))
            .collect();
        let mut budget = ExplainBudget::new(3);

        run_explain_pass(&mut runner, &mut stmts, &[], &[], &mut budget);

        let with_advice = stmts.iter().filter(|s| s.advice.is_some()).count();
        assert_eq!(with_advice, 3);
        assert_eq!(budget.selected(), 3);
    }

    #[test]
    fn suspect_selected_after_primary_budget_full() {
        // Primary budget already full: a 25ms/10-call statement
        // still gets a plan through the outlier cap.
        let mut runner = ScriptedRunner::with_plan(&seq_scan_plan());
        let mut stmts: Vec<StatementInfo> = (0..10)
            .map(|i| make_statement(&format!("SELECT {} FROM t", i), 1.0, 1))
            .collect();
        stmts.push(make_statement("SELECT * FROM t", 25.0, 10));
        let mut budget = ExplainBudget::new(10);

        run_explain_pass(&mut runner, &mut stmts, &[], &[], &mut budget);

        assert!(stmts[10].advice.is_some(), "suspect admitted as outlier");
        assert_eq!(budget.selected(), 11);
    }

    #[test]
    fn outlier_cap_limits_suspects() {
        let mut runner = ScriptedRunner::with_plan(&seq_scan_plan());
        // Primary limit 1 + outlier cap 5: out of 10 suspects only 6 pass.
        let mut stmts: Vec<StatementInfo> = (0..10)
            .map(|i| make_statement(&format!("SELECT {} FROM big", i), 50.0, 10))
            .collect();
        let mut budget = ExplainBudget::new(1);

        run_explain_pass(&mut runner, &mut stmts, &[], &[], &mut budget);

        let with_advice = stmts.iter().filter(|s| s.advice.is_some()).count();
        assert_eq!(with_advice, 1 + OUTLIER_CAP);
    }

    #[test]
    fn failed_explain_consumes_no_budget() {
        let mut runner = ScriptedRunner::with_plan(&seq_scan_plan()).failing_on("EXPLAIN");
        let mut stmts = vec![
            make_statement("SELECT 1 FROM a", 1.0, 1),
            make_statement("SELECT 2 FROM b", 1.0, 1),
        ];
        let mut budget = ExplainBudget::new(1);

        run_explain_pass(&mut runner, &mut stmts, &[], &[], &mut budget);

        assert_eq!(budget.selected(), 0);
        assert!(stmts.iter().all(|s| s.advice.is_none()));
        // Both candidates were attempted: the failure freed the slot.
        assert_eq!(runner.issued_with_prefix("EXPLAIN"), 2);
    }

    #[test]
    fn parameterized_query_uses_prepare_protocol() {
        let mut runner = ScriptedRunner::with_plan(&seq_scan_plan());
        let mut stmts = vec![make_statement("SELECT * FROM t WHERE id=$1", 1.0, 1)];
        let mut budget = ExplainBudget::new(10);

        run_explain_pass(&mut runner, &mut stmts, &[], &[], &mut budget);

        assert_eq!(runner.issued.len(), 3);
        assert!(runner.issued[0].starts_with("PREPARE pgsleuth_expl_1 AS SELECT"));
        assert_eq!(runner.issued[1], "EXPLAIN EXECUTE pgsleuth_expl_1");
        assert_eq!(runner.issued[2], "DEALLOCATE pgsleuth_expl_1");
        assert!(stmts[0].advice.is_some());
    }

    #[test]
    fn prepare_failure_falls_back_to_null_substitution() {
        // PREPARE fails: DEALLOCATE is still issued for the failed
        // name, and the NULL-substituted EXPLAIN runs exactly once.
        let mut runner = ScriptedRunner::with_plan(&seq_scan_plan()).failing_on("PREPARE");
        let mut stmts = vec![make_statement("SELECT * FROM t WHERE id=$1", 1.0, 1)];
        let mut budget = ExplainBudget::new(10);

        run_explain_pass(&mut runner, &mut stmts, &[], &[], &mut budget);

        assert_eq!(runner.issued.len(), 3);
        assert!(runner.issued[0].starts_with("PREPARE"));
        assert_eq!(runner.issued[1], "DEALLOCATE pgsleuth_expl_1");
        assert_eq!(
            runner.issued[2],
            "EXPLAIN SELECT * FROM t WHERE id=NULL"
        );
        assert!(stmts[0].advice.is_some());
        assert!(stmts[0].needs_attention);
    }

    #[test]
    fn explain_never_carries_analyze() {
        let mut runner = ScriptedRunner::with_plan(&seq_scan_plan());
        let mut stmts = vec![
            make_statement("SELECT * FROM t", 1.0, 1),
            make_statement("SELECT * FROM u WHERE id=$1", 1.0, 1),
        ];
        let mut budget = ExplainBudget::new(10);

        run_explain_pass(&mut runner, &mut stmts, &[], &[], &mut budget);

        assert!(runner.issued.iter().all(|sql| !sql.contains("ANALYZE")));
    }

    #[test]
    fn budget_defaults_on_non_positive_limit() {
        assert_eq!(ExplainBudget::new(0).primary_limit, DEFAULT_EXPLAIN_LIMIT);
        assert_eq!(ExplainBudget::new(-3).primary_limit, DEFAULT_EXPLAIN_LIMIT);
        assert_eq!(ExplainBudget::new(7).primary_limit, 7);
    }

    #[test]
    fn attention_flag_set_with_advice() {
        let mut runner = ScriptedRunner::with_plan(&seq_scan_plan());
        let mut stmts = vec![make_statement("SELECT * FROM orders", 1.0, 1)];
        let mut budget = ExplainBudget::new(10);

        run_explain_pass(&mut runner, &mut stmts, &[], &[], &mut budget);

        let advice = stmts[0].advice.as_ref().unwrap();
        assert!(!advice.is_empty());
        assert!(stmts[0].needs_attention);
    }
}
