//! Structural signal extraction from raw plan text.
//!
//! This is a best-effort line scanner over known plan-node markers, not
//! a plan-tree parser. Unrecognized or future node syntax contributes
//! no signal; the same input always yields the same signal set.

/// Structural signals found in one plan.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlanSignals {
    /// Tables targeted by sequential scans, in order of first
    /// appearance, deduplicated.
    pub seq_scan_tables: Vec<String>,
    pub has_sort: bool,
    pub has_bitmap: bool,
    pub has_nested_loop: bool,
    pub has_hash_join: bool,
    pub has_merge_join: bool,
    /// Any join marker at all, including kinds not singled out above.
    pub has_any_join: bool,
    pub has_parallel: bool,
    pub has_cte: bool,
}

const SEQ_SCAN_MARKER: &str = "seq scan on ";

/// Scans plan lines for known structural markers, case-insensitively.
pub fn extract_signals(lines: &[String]) -> PlanSignals {
    let mut signals = PlanSignals::default();

    for line in lines {
        // ASCII lowering keeps byte offsets aligned with the original
        // line, so the table identifier can be sliced case-preserved.
        let lower = line.to_ascii_lowercase();

        if let Some(idx) = lower.find(SEQ_SCAN_MARKER) {
            let rest = &line[idx + SEQ_SCAN_MARKER.len()..];
            if let Some(table) = extract_table_name(rest)
                && !signals.seq_scan_tables.contains(&table)
            {
                signals.seq_scan_tables.push(table);
            }
        }

        if lower.contains("sort") {
            signals.has_sort = true;
        }
        if lower.contains("bitmap heap scan") {
            signals.has_bitmap = true;
        }
        if lower.contains("nested loop") {
            signals.has_nested_loop = true;
            signals.has_any_join = true;
        }
        if lower.contains("hash join") {
            signals.has_hash_join = true;
            signals.has_any_join = true;
        }
        if lower.contains("merge join") {
            signals.has_merge_join = true;
            signals.has_any_join = true;
        }
        if lower.contains(" join") {
            signals.has_any_join = true;
        }
        if lower.contains("parallel") {
            signals.has_parallel = true;
        }
        if lower.contains("cte") {
            signals.has_cte = true;
        }
    }

    signals
}

/// Isolates the bare table identifier from the text following
/// "Seq Scan on", trimming trailing plan decoration (cost annotations,
/// parentheses).
fn extract_table_name(rest: &str) -> Option<String> {
    let token = rest.split_whitespace().next()?;
    let name = token.split('(').next()?.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(input: &[&str]) -> Vec<String> {
        input.iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn seq_scan_table_extracted_with_cost_decoration() {
        let plan = lines(&["Seq Scan on orders  (cost=0.00..155.00 rows=10000 width=4)"]);
        let signals = extract_signals(&plan);
        assert_eq!(signals.seq_scan_tables, vec!["orders".to_string()]);
    }

    #[test]
    fn seq_scan_table_extracted_without_decoration() {
        let plan = lines(&["  ->  Seq Scan on accounts"]);
        let signals = extract_signals(&plan);
        assert_eq!(signals.seq_scan_tables, vec!["accounts".to_string()]);
    }

    #[test]
    fn seq_scan_tables_deduplicated_in_order() {
        let plan = lines(&[
            "  ->  Seq Scan on orders  (cost=0.00..1.00 rows=1 width=4)",
            "  ->  Seq Scan on users  (cost=0.00..1.00 rows=1 width=4)",
            "  ->  Seq Scan on orders  (cost=0.00..1.00 rows=1 width=4)",
        ]);
        let signals = extract_signals(&plan);
        assert_eq!(
            signals.seq_scan_tables,
            vec!["orders".to_string(), "users".to_string()]
        );
    }

    #[test]
    fn join_kinds_recognized() {
        let signals = extract_signals(&lines(&["Nested Loop  (cost=...)"]));
        assert!(signals.has_nested_loop && signals.has_any_join);

        let signals = extract_signals(&lines(&["Hash Join  (cost=...)"]));
        assert!(signals.has_hash_join && signals.has_any_join);

        let signals = extract_signals(&lines(&["Merge Join  (cost=...)"]));
        assert!(signals.has_merge_join && signals.has_any_join);
    }

    #[test]
    fn generic_join_fallback() {
        let signals = extract_signals(&lines(&["Foo Join  (cost=...)"]));
        assert!(signals.has_any_join);
        assert!(!signals.has_nested_loop && !signals.has_hash_join && !signals.has_merge_join);
    }

    #[test]
    fn sort_bitmap_parallel_cte_markers() {
        let plan = lines(&[
            "Sort  (cost=1.00..2.00 rows=10 width=4)",
            "  ->  Bitmap Heap Scan on t  (cost=...)",
            "Gather  (cost=...)",
            "  Workers Planned: 2",
            "  ->  Parallel Seq Scan on t  (cost=...)",
            "CTE Scan on recent  (cost=...)",
        ]);
        let signals = extract_signals(&plan);
        assert!(signals.has_sort);
        assert!(signals.has_bitmap);
        assert!(signals.has_parallel);
        assert!(signals.has_cte);
    }

    #[test]
    fn unmatched_lines_contribute_nothing() {
        let plan = lines(&[
            "Index Scan using idx_orders_id on orders  (cost=...)",
            "  Index Cond: (id = 5)",
        ]);
        let signals = extract_signals(&plan);
        assert_eq!(signals, PlanSignals::default());
    }

    #[test]
    fn extraction_is_idempotent() {
        let plan = lines(&[
            "Sort  (cost=...)",
            "  ->  Hash Join  (cost=...)",
            "        ->  Seq Scan on orders  (cost=...)",
            "        ->  Seq Scan on users  (cost=...)",
        ]);
        let first = extract_signals(&plan);
        let second = extract_signals(&plan);
        assert_eq!(first, second);
    }

    #[test]
    fn case_insensitive_matching() {
        let plan = lines(&["SEQ SCAN ON Orders  (COST=...)"]);
        let signals = extract_signals(&plan);
        assert_eq!(signals.seq_scan_tables, vec!["Orders".to_string()]);
    }
}
