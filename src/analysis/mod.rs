//! Interpretation of collected statement data.
//!
//! - `plan_signals` — raw plan text → structural signal set
//! - `advice` — signals + snapshots → per-statement PlanAdvice
//! - `rules` — finished StatementReport → human-readable findings

pub mod advice;
pub mod plan_signals;
pub mod rules;

use serde::Serialize;

use crate::models::StatementReport;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
}

/// One human-readable finding produced by a rule.
#[derive(Clone, Debug, Serialize)]
pub struct Finding {
    pub rule_id: &'static str,
    pub severity: Severity,
    pub title: String,
    pub detail: Option<String>,
}

/// Read-only context passed to each rule.
pub struct ReportContext<'a> {
    pub report: &'a StatementReport,
}

/// Evaluates every rule against one finished statement report.
pub fn run_analysis(report: &StatementReport) -> Vec<Finding> {
    let ctx = ReportContext { report };
    rules::all_rules()
        .iter()
        .flat_map(|rule| rule.evaluate(&ctx))
        .collect()
}
