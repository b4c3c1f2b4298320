use std::fmt::Display;

use chrono::{DateTime, Utc};
use ledger_common::Cents;
use serde::{Deserialize, Serialize};

//--------------------------------------    UpsertResult     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertResult {
    /// The row that now represents the transaction.
    pub id: i64,
    /// True if a new row was created, false if an existing row was updated.
    pub inserted: bool,
}

impl UpsertResult {
    pub fn inserted(id: i64) -> Self {
        Self { id, inserted: true }
    }

    pub fn updated(id: i64) -> Self {
        Self { id, inserted: false }
    }
}

impl Display for UpsertResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let verb = if self.inserted { "inserted" } else { "updated" };
        write!(f, "payment #{} {verb}", self.id)
    }
}

//--------------------------------------     DedupResult     ---------------------------------------------------------
/// What a compaction pass removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupResult {
    /// The ids of the rows that were deleted.
    pub deleted: Vec<i64>,
    /// The number of inactive rows whose `merged_into_id` was moved from a deleted row to its survivor.
    pub repointed: u64,
}

impl DedupResult {
    pub fn new(deleted: Vec<i64>, repointed: u64) -> Self {
        Self { deleted, repointed }
    }

    pub fn deleted_count(&self) -> usize {
        self.deleted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty()
    }
}

impl Display for DedupResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} duplicate(s) removed, {} audit link(s) re-pointed", self.deleted_count(), self.repointed)
    }
}

//--------------------------------------     InvoiceLink     ---------------------------------------------------------
/// The transaction identifiers the provider reports for an invoice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLink {
    pub payment_intent_id: Option<String>,
    pub charge_id: Option<String>,
    /// The payment intent's status, when the provider reported it.
    pub status: Option<String>,
}

impl InvoiceLink {
    /// The identity the linked transaction is known by: the payment intent id, else the charge id.
    pub fn identity(&self) -> Option<&str> {
        self.payment_intent_id.as_deref().or(self.charge_id.as_deref())
    }
}

//--------------------------------------  UnlinkedPaymentFilter -------------------------------------------------------
/// Selects the active payments that carry an invoice id but are missing their payment intent or charge id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnlinkedPaymentFilter {
    pub invoice_id: Option<String>,
    pub limit: Option<u32>,
}

impl UnlinkedPaymentFilter {
    pub fn with_invoice_id<S: Into<String>>(mut self, invoice_id: S) -> Self {
        self.invoice_id = Some(invoice_id.into());
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

//--------------------------------------  HeuristicCandidate  ---------------------------------------------------------
/// Criteria for the amount-based fallback match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeuristicQuery {
    pub amount: Cents,
    pub exclude_id: i64,
    /// Only consider candidates updated at or after this time. `None` means no bound.
    pub since: Option<DateTime<Utc>>,
}

/// How a source row is disposed of once the heuristic matcher has paired it with a candidate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeuristicMergeMode {
    /// Mark the source as merged into the candidate, keeping it for audit.
    #[default]
    SoftMerge,
    /// Delete the source row outright.
    HardDelete,
}

impl Display for HeuristicMergeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeuristicMergeMode::SoftMerge => write!(f, "soft merge"),
            HeuristicMergeMode::HardDelete => write!(f, "hard delete"),
        }
    }
}
