//! Advice synthesis: plan signals + table/index snapshots → PlanAdvice.
//!
//! Highlights follow a fixed order (seq-scan tables, bitmap, sort,
//! join kind, parallelism, CTE). Each suggestion is independently
//! triggered; the two booleans record whether any suggestion points at
//! indexing or at rewriting the query.

use crate::models::{IndexInfo, PlanAdvice, TableInfo};

use super::plan_signals::PlanSignals;

/// Live-row count above which a sequential scan warrants an index.
const LARGE_TABLE_ROWS: i64 = 100_000;

/// Builds the advice for one statement from its extracted signals.
pub fn synthesize_advice(
    plan: String,
    signals: &PlanSignals,
    tables: &[TableInfo],
    indexes: &[IndexInfo],
) -> PlanAdvice {
    let mut advice = PlanAdvice {
        plan,
        ..Default::default()
    };

    collect_highlights(&mut advice, signals);
    collect_suggestions(&mut advice, signals, tables, indexes);

    advice
}

fn collect_highlights(advice: &mut PlanAdvice, signals: &PlanSignals) {
    for table in &signals.seq_scan_tables {
        advice.highlights.push(format!("Seq Scan on {}", table));
    }
    if signals.has_bitmap {
        advice.highlights.push("Bitmap Heap Scan".to_string());
    }
    if signals.has_sort {
        advice.highlights.push("Sort".to_string());
    }
    if signals.has_nested_loop {
        advice.highlights.push("Nested Loop".to_string());
    }
    if signals.has_hash_join {
        advice.highlights.push("Hash Join".to_string());
    }
    if signals.has_merge_join {
        advice.highlights.push("Merge Join".to_string());
    }
    if signals.has_any_join
        && !signals.has_nested_loop
        && !signals.has_hash_join
        && !signals.has_merge_join
    {
        advice.highlights.push("Join".to_string());
    }
    if signals.has_parallel {
        advice.highlights.push("Parallel operation(s)".to_string());
    }
    if signals.has_cte {
        advice.highlights.push("CTE/WITH used".to_string());
    }
}

fn collect_suggestions(
    advice: &mut PlanAdvice,
    signals: &PlanSignals,
    tables: &[TableInfo],
    indexes: &[IndexInfo],
) {
    for scanned in &signals.seq_scan_tables {
        if let Some(table) = find_table(tables, scanned) {
            if table.live_rows > LARGE_TABLE_ROWS {
                advice.suggestions.push(format!(
                    "Table {} has ~{} live rows and is read by a sequential scan; \
                     add or use an index matching the filter columns",
                    scanned, table.live_rows
                ));
            } else {
                advice.suggestions.push(format!(
                    "Sequential scan on {} ({} live rows); verify a full scan is \
                     intentional for this small table",
                    scanned, table.live_rows
                ));
            }
            advice.can_index = true;

            if !has_index(indexes, scanned) {
                advice.suggestions.push(format!(
                    "Table {} has no indexes; create one for the most selective \
                     filter columns",
                    scanned
                ));
                advice.can_index = true;
            }
        }
    }

    if signals.has_bitmap {
        advice.suggestions.push(
            "Bitmap heap scans present; composite or covering indexes over the \
             combined predicates could serve these lookups directly"
                .to_string(),
        );
        advice.can_index = true;
    }

    if signals.has_sort {
        advice.suggestions.push(
            "Explicit sort step detected; an index matching the ORDER BY columns \
             would let the planner skip it"
                .to_string(),
        );
        advice.can_index = true;
    }

    if signals.has_any_join {
        advice.suggestions.push(
            "Join present; verify the join keys are indexed on both sides".to_string(),
        );
        advice.can_index = true;
    }

    if signals.has_cte {
        advice.suggestions.push(
            "CTE/WITH used; consider inlining it if the subquery is not reused".to_string(),
        );
        advice.can_refactor = true;
    }

    // Seq scans over tables the snapshot does not know: nothing points
    // at a concrete index, so the query itself is the lever.
    if !signals.seq_scan_tables.is_empty() && !advice.can_index {
        advice.suggestions.push(
            "Sequential scans over tables missing from the statistics snapshot; \
             consider rewriting the query or narrowing its scope"
                .to_string(),
        );
        advice.can_refactor = true;
    }
}

/// Matches a scanned identifier against the snapshot by bare relname or
/// schema-qualified name, since EXPLAIN may print either form.
fn find_table<'a>(tables: &'a [TableInfo], scanned: &str) -> Option<&'a TableInfo> {
    tables
        .iter()
        .find(|t| t.name == scanned || format!("{}.{}", t.schema, t.name) == scanned)
}

fn has_index(indexes: &[IndexInfo], scanned: &str) -> bool {
    indexes
        .iter()
        .any(|i| i.table == scanned || format!("{}.{}", i.schema, i.table) == scanned)
}
