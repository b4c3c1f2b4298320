use std::fmt::Display;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::PaymentRecord,
    ledger_api::errors::ReconcileError,
    traits::{DedupResult, HeuristicMergeMode, UnlinkedPaymentFilter},
};

//--------------------------------------  ReconcileOptions   ---------------------------------------------------------
/// Options for a single reconciliation run. The defaults describe a dry run over every unlinked invoice payment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Write the changes. Without this, the run only reports what it would do.
    pub apply: bool,
    /// Fall back to amount-based matching when the provider reports no link for an invoice.
    pub heuristic: bool,
    pub heuristic_merge: HeuristicMergeMode,
    /// Only reconcile the payment(s) with this invoice id.
    pub invoice_id: Option<String>,
    pub limit: Option<u32>,
    /// Only consider heuristic candidates updated within this window. `None` means no bound.
    pub lookback: Option<Duration>,
}

impl ReconcileOptions {
    pub fn dry_run() -> Self {
        Self::default()
    }

    pub fn apply() -> Self {
        Self { apply: true, ..Default::default() }
    }

    pub fn with_heuristic(mut self, mode: HeuristicMergeMode) -> Self {
        self.heuristic = true;
        self.heuristic_merge = mode;
        self
    }

    pub fn with_invoice_id<S: Into<String>>(mut self, invoice_id: S) -> Self {
        self.invoice_id = Some(invoice_id.into());
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_lookback(mut self, lookback: Duration) -> Self {
        self.lookback = Some(lookback);
        self
    }

    /// Checks the options before any row is touched. Apply mode needs the global switch (`apply_permitted`).
    pub fn validate(&self, apply_permitted: bool) -> Result<(), ReconcileError> {
        if self.apply && !apply_permitted {
            return Err(ReconcileError::ApplyNotEnabled);
        }
        if self.limit == Some(0) {
            return Err(ReconcileError::InvalidLimit("0".into()));
        }
        Ok(())
    }

    /// Parses a user-supplied row limit, which must be a positive integer.
    pub fn parse_limit(raw: &str) -> Result<u32, ReconcileError> {
        match raw.trim().parse::<u32>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(ReconcileError::InvalidLimit(raw.to_string())),
        }
    }

    pub fn filter(&self) -> UnlinkedPaymentFilter {
        UnlinkedPaymentFilter { invoice_id: self.invoice_id.clone(), limit: self.limit }
    }
}

//--------------------------------------     RowOutcome      ---------------------------------------------------------
/// What happened to one invoice payment during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RowOutcome {
    /// Dry run: the provider links the invoice to `identity`. `merge_target` is the row it would be merged into.
    Linked { identity: String, merge_target: Option<i64> },
    /// The row itself became the canonical row for `identity`.
    Promoted { identity: String },
    /// The row was soft-merged into the row that already represented `identity`.
    Merged { identity: String, merged_into: i64 },
    /// Dry run: the heuristic matcher paired the row with `candidate`.
    HeuristicMatch { candidate: i64, payment_intent_id: Option<String> },
    /// The row was absorbed by the heuristic candidate.
    HeuristicMerged { candidate: i64, mode: HeuristicMergeMode },
    HeuristicNoMatch,
    /// The provider reports no link and heuristic matching is disabled.
    NoLink,
    Error { message: String, request_id: Option<String> },
}

impl RowOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RowOutcome::Linked { .. } => "linked",
            RowOutcome::Promoted { .. } => "promoted",
            RowOutcome::Merged { .. } => "merged",
            RowOutcome::HeuristicMatch { .. } => "heuristic_match",
            RowOutcome::HeuristicMerged { .. } => "heuristic_merged",
            RowOutcome::HeuristicNoMatch => "heuristic_no_match",
            RowOutcome::NoLink => "no_link",
            RowOutcome::Error { .. } => "error",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RowOutcome::Error { .. })
    }
}

impl Display for RowOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowOutcome::Linked { identity, merge_target: Some(target) } => {
                write!(f, "linked to {identity}, would merge into #{target}")
            },
            RowOutcome::Linked { identity, merge_target: None } => write!(f, "linked to {identity}, would promote"),
            RowOutcome::Promoted { identity } => write!(f, "promoted to {identity}"),
            RowOutcome::Merged { identity, merged_into } => write!(f, "merged into #{merged_into} ({identity})"),
            RowOutcome::HeuristicMatch { candidate, .. } => write!(f, "heuristic match with #{candidate}"),
            RowOutcome::HeuristicMerged { candidate, mode } => write!(f, "absorbed by #{candidate} ({mode})"),
            RowOutcome::HeuristicNoMatch => write!(f, "no heuristic match"),
            RowOutcome::NoLink => write!(f, "no link, heuristic disabled"),
            RowOutcome::Error { message, .. } => write!(f, "error: {message}"),
        }
    }
}

//--------------------------------------      RowReport      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowReport {
    pub row_id: i64,
    pub invoice_id: Option<String>,
    #[serde(flatten)]
    pub outcome: RowOutcome,
}

impl RowReport {
    pub fn new(row: &PaymentRecord, outcome: RowOutcome) -> Self {
        Self { row_id: row.id, invoice_id: row.invoice_id.clone(), outcome }
    }
}

//--------------------------------------  ReconcileSummary   ---------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub applied: bool,
    pub reports: Vec<RowReport>,
    /// The result of the compaction pass that follows an applied run.
    pub compaction: Option<DedupResult>,
}

impl ReconcileSummary {
    pub fn count(&self, label: &str) -> usize {
        self.reports.iter().filter(|r| r.outcome.label() == label).count()
    }

    pub fn error_count(&self) -> usize {
        self.reports.iter().filter(|r| r.outcome.is_error()).count()
    }
}

impl Display for ReconcileSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = if self.applied { "applied" } else { "dry run" };
        write!(f, "{} invoice payment(s) inspected ({mode}), {} error(s)", self.reports.len(), self.error_count())?;
        if let Some(c) = &self.compaction {
            write!(f, ". {c}")?;
        }
        Ok(())
    }
}
