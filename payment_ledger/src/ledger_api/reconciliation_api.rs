use std::{collections::HashSet, fmt::Debug};

use chrono::Utc;
use log::*;

use crate::{
    db_types::PaymentRecord,
    helpers::{charge_id_for_payment_intent, extract_payment_ids_or, json_str, ObjectKind},
    ledger_api::{
        compactor_api::CompactorApi,
        errors::{ReconcileError, RowError},
        reconciliation_objects::{ReconcileOptions, ReconcileSummary, RowOutcome, RowReport},
    },
    traits::{HeuristicQuery, InvoiceLink, PaymentLedgerDatabase, PaymentProvider, ReconciliationManagement},
};

const INVOICE_EXPANSIONS: [&str; 2] = ["payment_intent", "lines.data"];

/// `ReconciliationApi` repairs invoice payments that webhooks left without a payment intent or charge link.
///
/// Rows are processed one at a time. A failure on one row is recorded in its report and the run carries on.
pub struct ReconciliationApi<B, P> {
    db: B,
    provider: P,
}

impl<B, P> Debug for ReconciliationApi<B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconciliationApi")
    }
}

impl<B, P> ReconciliationApi<B, P> {
    pub fn new(db: B, provider: P) -> Self {
        Self { db, provider }
    }
}

impl<B, P> ReconciliationApi<B, P>
where
    B: ReconciliationManagement + PaymentLedgerDatabase,
    P: PaymentProvider,
{
    /// Runs one reconciliation pass. `apply_permitted` is the global switch that allows apply mode at all.
    ///
    /// After an applied pass, the duplicate compactor runs and its result is part of the summary.
    pub async fn reconcile(
        &self,
        options: &ReconcileOptions,
        apply_permitted: bool,
    ) -> Result<ReconcileSummary, ReconcileError> {
        options.validate(apply_permitted)?;
        let rows = self.db.fetch_unlinked_invoice_payments(options.filter()).await?;
        info!("🧾️ Found {} invoice payment(s) to inspect", rows.len());
        let mut seen = HashSet::with_capacity(rows.len());
        let mut reports = Vec::with_capacity(rows.len());
        for row in rows {
            if !seen.insert(row.id) {
                continue;
            }
            let outcome = match self.reconcile_row(&row, options).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(
                        "🧾️ Could not reconcile payment #{} ({}). {e}. Provider request id: {}",
                        row.id,
                        row.invoice_id.as_deref().unwrap_or("no invoice"),
                        e.request_id().unwrap_or("n/a")
                    );
                    RowOutcome::Error { message: e.to_string(), request_id: e.request_id().map(String::from) }
                },
            };
            info!("🧾️ Payment #{} ({}) -> {outcome}", row.id, row.invoice_id.as_deref().unwrap_or("-"));
            reports.push(RowReport::new(&row, outcome));
        }
        let compaction = if options.apply {
            let compactor = CompactorApi::new(self.db.clone());
            Some(compactor.compact().await?)
        } else {
            None
        };
        let summary = ReconcileSummary { applied: options.apply, reports, compaction };
        info!("🧾️ Reconciliation complete. {summary}");
        Ok(summary)
    }

    async fn reconcile_row(&self, row: &PaymentRecord, options: &ReconcileOptions) -> Result<RowOutcome, RowError> {
        let invoice_id = row.invoice_id.as_deref().ok_or(RowError::MissingInvoiceId(row.id))?;
        let link = self.resolve_invoice_link(invoice_id).await?;
        match link.identity().map(String::from) {
            Some(identity) => self.link_row(row, &link, identity, options.apply).await,
            None if options.heuristic => self.heuristic_match(row, options).await,
            None => Ok(RowOutcome::NoLink),
        }
    }

    /// Asks the provider which payment intent and charge an invoice belongs to.
    ///
    /// If the invoice names a payment intent but no charge, the charge is taken from the expanded payment intent, or
    /// failing that, from a direct lookup of the payment intent. Failure of that second lookup is not an error.
    pub async fn resolve_invoice_link(&self, invoice_id: &str) -> Result<InvoiceLink, RowError> {
        let invoice = self.provider.fetch_invoice(invoice_id, &INVOICE_EXPANSIONS).await?;
        let ids = extract_payment_ids_or(&invoice, ObjectKind::Invoice);
        let expanded_pi = invoice.get("payment_intent").filter(|v| v.is_object());
        let mut status = expanded_pi.and_then(|pi| json_str(pi, "status"));
        let mut charge_id = ids.charge_id.clone().or_else(|| expanded_pi.and_then(charge_id_for_payment_intent));
        match ids.payment_intent_id.as_deref() {
            Some(pi_id) if charge_id.is_none() => match self.provider.fetch_payment_intent(pi_id).await {
                Ok(pi) => {
                    charge_id = charge_id_for_payment_intent(&pi);
                    status = status.or_else(|| json_str(&pi, "status"));
                },
                Err(e) => warn!("🧾️ Could not fetch payment intent {pi_id} for invoice {invoice_id}. {e}"),
            },
            _ => {},
        }
        Ok(InvoiceLink { payment_intent_id: ids.payment_intent_id, charge_id, status })
    }

    async fn link_row(
        &self,
        row: &PaymentRecord,
        link: &InvoiceLink,
        identity: String,
        apply: bool,
    ) -> Result<RowOutcome, RowError> {
        let target = self.db.find_canonical_row(&identity, row.id).await?;
        if !apply {
            return Ok(RowOutcome::Linked { identity, merge_target: target.map(|t| t.id) });
        }
        match target {
            Some(target) => {
                let merged = self.db.merge_into_canonical(row.id, target.id, link).await?;
                debug!("🧾️ Payment #{} merged into {merged}", row.id);
                Ok(RowOutcome::Merged { identity, merged_into: merged.id })
            },
            None => {
                let promoted = self.db.promote_payment(row.id, link).await?;
                debug!("🧾️ Payment promoted: {promoted}");
                Ok(RowOutcome::Promoted { identity })
            },
        }
    }

    async fn heuristic_match(&self, row: &PaymentRecord, options: &ReconcileOptions) -> Result<RowOutcome, RowError> {
        let since = options.lookback.map(|window| Utc::now() - window);
        let query = HeuristicQuery { amount: row.amount, exclude_id: row.id, since };
        let candidate = match self.db.find_heuristic_candidate(query).await? {
            Some(c) => c,
            None => return Ok(RowOutcome::HeuristicNoMatch),
        };
        if !options.apply {
            return Ok(RowOutcome::HeuristicMatch {
                candidate: candidate.id,
                payment_intent_id: candidate.payment_intent_id,
            });
        }
        let mode = options.heuristic_merge;
        let absorbed = self.db.absorb_heuristic_match(row.id, candidate.id, mode).await?;
        warn!("🧾️ Payment #{} absorbed by {absorbed} on amount alone ({mode})", row.id);
        Ok(RowOutcome::HeuristicMerged { candidate: absorbed.id, mode })
    }
}
