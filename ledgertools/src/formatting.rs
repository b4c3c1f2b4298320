use std::fmt::Write;

use payment_ledger::{
    reconciliation_objects::{ReconcileSummary, RowOutcome, RowReport},
    DedupResult,
};
use prettytable::{
    format::{LinePosition, LineSeparator, TableFormat},
    row,
    Table,
};

const OUTCOME_LABELS: [&str; 8] =
    ["linked", "promoted", "merged", "heuristic_match", "heuristic_merged", "heuristic_no_match", "no_link", "error"];

fn markdown_format() -> TableFormat {
    prettytable::format::FormatBuilder::new()
        .column_separator('|')
        .borders('|')
        .separator(LinePosition::Title, LineSeparator::new('-', '|', '|', '|'))
        .padding(1, 1)
        .build()
}

fn markdown_style(table: &mut Table) {
    table.set_format(markdown_format());
}

pub fn format_row_reports(reports: &[RowReport]) -> String {
    let mut table = Table::new();
    markdown_style(&mut table);
    table.set_titles(row!["Payment", "Invoice", "Outcome", "Detail", "Request id"]);
    for report in reports {
        let request_id = match &report.outcome {
            RowOutcome::Error { request_id, .. } => request_id.clone().unwrap_or_default(),
            _ => String::default(),
        };
        table.add_row(row![
            report.row_id.to_string(),
            report.invoice_id.as_deref().unwrap_or("-"),
            report.outcome.label(),
            report.outcome.to_string(),
            request_id,
        ]);
    }
    table.to_string()
}

pub fn format_reconcile_summary(summary: &ReconcileSummary) -> String {
    let mut f = String::new();
    let mode = if summary.applied { "APPLY" } else { "DRY RUN" };
    let _ = writeln!(f, "Found {} invoice row(s) to inspect ({mode})", summary.reports.len());
    if !summary.reports.is_empty() {
        let _ = writeln!(f, "{}", format_row_reports(&summary.reports));
    }
    let mut totals = Table::new();
    markdown_style(&mut totals);
    totals.set_titles(row!["Outcome", "Count"]);
    let mut has_totals = false;
    for label in OUTCOME_LABELS {
        let count = summary.count(label);
        if count > 0 {
            totals.add_row(row![label, count.to_string()]);
            has_totals = true;
        }
    }
    if has_totals {
        let _ = writeln!(f, "{totals}");
    }
    if let Some(compaction) = &summary.compaction {
        let _ = writeln!(f, "{}", format_dedup_result(compaction));
    }
    let _ = write!(f, "{summary}");
    f
}

pub fn format_dedup_result(result: &DedupResult) -> String {
    if result.is_empty() {
        return "Compaction: no duplicate payments found".to_string();
    }
    let ids = result.deleted.iter().map(|id| format!("#{id}")).collect::<Vec<_>>().join(", ");
    format!("Compaction: {result}. Deleted {ids}")
}

#[cfg(test)]
mod test {
    use payment_ledger::traits::HeuristicMergeMode;

    use super::*;

    fn report(row_id: i64, outcome: RowOutcome) -> RowReport {
        RowReport { row_id, invoice_id: Some(format!("in_{row_id}")), outcome }
    }

    #[test]
    fn dry_run_summary() {
        let summary = ReconcileSummary {
            applied: false,
            reports: vec![
                report(1, RowOutcome::Linked { identity: "pi_1".into(), merge_target: Some(4) }),
                report(2, RowOutcome::NoLink),
                report(3, RowOutcome::Error { message: "No such invoice".into(), request_id: Some("req_9".into()) }),
            ],
            compaction: None,
        };
        let text = format_reconcile_summary(&summary);
        assert!(text.starts_with("Found 3 invoice row(s) to inspect (DRY RUN)"));
        assert!(text.contains("would merge into #4"));
        assert!(text.contains("req_9"));
        assert!(text.contains("no_link"));
        assert!(!text.contains("Compaction"));
        assert!(text.ends_with("3 invoice payment(s) inspected (dry run), 1 error(s)"));
    }

    #[test]
    fn applied_summary_includes_compaction() {
        let summary = ReconcileSummary {
            applied: true,
            reports: vec![report(5, RowOutcome::HeuristicMerged { candidate: 2, mode: HeuristicMergeMode::SoftMerge })],
            compaction: Some(DedupResult::new(vec![7, 8], 1)),
        };
        let text = format_reconcile_summary(&summary);
        assert!(text.contains("(APPLY)"));
        assert!(text.contains("heuristic_merged"));
        assert!(text.contains("Deleted #7, #8"));
    }

    #[test]
    fn empty_dedup() {
        assert_eq!(format_dedup_result(&DedupResult::default()), "Compaction: no duplicate payments found");
        let empty = ReconcileSummary::default();
        let text = format_reconcile_summary(&empty);
        assert!(text.starts_with("Found 0 invoice row(s)"));
    }
}
