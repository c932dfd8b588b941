use crate::analysis::rules::Rule;
use crate::analysis::{Finding, ReportContext, Severity};
use crate::models::{StatementInfo, StatementReport};

/// Distinct advised statements across all five lists, deduplicated by
/// exact query text (the same statement may rank in several lists).
fn advised_statements(report: &StatementReport) -> Vec<&StatementInfo> {
    let mut seen: Vec<&str> = Vec::new();
    let mut out = Vec::new();
    for list in [
        &report.by_total_time,
        &report.by_cpu_time,
        &report.by_io_time,
        &report.by_calls,
        &report.by_blocks,
    ] {
        for stmt in list {
            if stmt.advice.is_some() && !seen.contains(&stmt.query.as_str()) {
                seen.push(&stmt.query);
                out.push(stmt);
            }
        }
    }
    out
}

fn truncated_query(stmt: &StatementInfo) -> Option<String> {
    if stmt.query.is_empty() {
        None
    } else {
        Some(stmt.query.chars().take(120).collect())
    }
}

fn has_highlight(stmt: &StatementInfo, pred: impl Fn(&str) -> bool) -> bool {
    stmt.advice
        .as_ref()
        .is_some_and(|a| a.highlights.iter().any(|h| pred(h)))
}

// ============================================================
// SeqScanSlowQueriesRule
// ============================================================

pub struct SeqScanSlowQueriesRule;

impl Rule for SeqScanSlowQueriesRule {
    fn id(&self) -> &'static str {
        "slow_queries_seq_scan"
    }

    fn evaluate(&self, ctx: &ReportContext) -> Vec<Finding> {
        let offenders: Vec<&StatementInfo> = ctx
            .report
            .by_total_time
            .iter()
            .filter(|s| has_highlight(s, |h| h.starts_with("Seq Scan")))
            .collect();

        if offenders.is_empty() {
            return Vec::new();
        }

        vec![Finding {
            rule_id: "slow_queries_seq_scan",
            severity: Severity::Warning,
            title: format!(
                "{} of the slowest statements rely on sequential scans",
                offenders.len()
            ),
            detail: truncated_query(offenders[0]),
        }]
    }
}

// ============================================================
// IndexImprovementsRule
// ============================================================

pub struct IndexImprovementsRule;

impl Rule for IndexImprovementsRule {
    fn id(&self) -> &'static str {
        "index_improvements"
    }

    fn evaluate(&self, ctx: &ReportContext) -> Vec<Finding> {
        let candidates: Vec<&StatementInfo> = advised_statements(ctx.report)
            .into_iter()
            .filter(|s| s.advice.as_ref().is_some_and(|a| a.can_index))
            .collect();

        if candidates.is_empty() {
            return Vec::new();
        }

        let severity = if candidates.len() >= 3 {
            Severity::Warning
        } else {
            Severity::Info
        };

        vec![Finding {
            rule_id: "index_improvements",
            severity,
            title: format!(
                "Index improvements possible for {} statement(s)",
                candidates.len()
            ),
            detail: truncated_query(candidates[0]),
        }]
    }
}

// ============================================================
// QueryRefactoringRule
// ============================================================

pub struct QueryRefactoringRule;

impl Rule for QueryRefactoringRule {
    fn id(&self) -> &'static str {
        "query_refactoring"
    }

    fn evaluate(&self, ctx: &ReportContext) -> Vec<Finding> {
        let candidates: Vec<&StatementInfo> = advised_statements(ctx.report)
            .into_iter()
            .filter(|s| s.advice.as_ref().is_some_and(|a| a.can_refactor))
            .collect();

        if candidates.is_empty() {
            return Vec::new();
        }

        vec![Finding {
            rule_id: "query_refactoring",
            severity: Severity::Info,
            title: format!(
                "Query refactoring suggested for {} statement(s)",
                candidates.len()
            ),
            detail: truncated_query(candidates[0]),
        }]
    }
}

// ============================================================
// SortWithoutIndexRule
// ============================================================

pub struct SortWithoutIndexRule;

impl Rule for SortWithoutIndexRule {
    fn id(&self) -> &'static str {
        "sort_without_index"
    }

    fn evaluate(&self, ctx: &ReportContext) -> Vec<Finding> {
        let candidates: Vec<&StatementInfo> = advised_statements(ctx.report)
            .into_iter()
            .filter(|s| has_highlight(s, |h| h == "Sort"))
            .collect();

        if candidates.is_empty() {
            return Vec::new();
        }

        vec![Finding {
            rule_id: "sort_without_index",
            severity: Severity::Info,
            title: format!(
                "Sorting lacks index support in {} statement(s)",
                candidates.len()
            ),
            detail: truncated_query(candidates[0]),
        }]
    }
}

// ============================================================
// JoinMissingIndexesRule
// ============================================================

pub struct JoinMissingIndexesRule;

impl Rule for JoinMissingIndexesRule {
    fn id(&self) -> &'static str {
        "join_missing_indexes"
    }

    fn evaluate(&self, ctx: &ReportContext) -> Vec<Finding> {
        let candidates: Vec<&StatementInfo> = advised_statements(ctx.report)
            .into_iter()
            .filter(|s| {
                has_highlight(s, |h| {
                    h == "Join" || h == "Nested Loop" || h == "Hash Join" || h == "Merge Join"
                })
            })
            .collect();

        if candidates.is_empty() {
            return Vec::new();
        }

        vec![Finding {
            rule_id: "join_missing_indexes",
            severity: Severity::Info,
            title: format!(
                "Joins may be missing indexes in {} statement(s)",
                candidates.len()
            ),
            detail: truncated_query(candidates[0]),
        }]
    }
}

// ============================================================
// Tests
// ============================================================
