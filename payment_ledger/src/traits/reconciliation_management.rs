use crate::{
    db_types::PaymentRecord,
    traits::{
        data_objects::{HeuristicMergeMode, HeuristicQuery, InvoiceLink, UnlinkedPaymentFilter},
        LedgerError,
    },
};

/// Storage behaviour needed by the invoice reconciliation batch job.
///
/// Every method that changes more than one row does so atomically. Methods that take a row id fail with
/// [`LedgerError::RowNotActive`] if the row has already been merged, so that a row can never be merged twice.
#[allow(async_fn_in_trait)]
pub trait ReconciliationManagement: Clone {
    /// Active payments that carry an invoice id but are missing a payment intent id or a charge id, oldest first.
    async fn fetch_unlinked_invoice_payments(
        &self,
        filter: UnlinkedPaymentFilter,
    ) -> Result<Vec<PaymentRecord>, LedgerError>;

    /// The active row, other than `exclude_id`, that already represents `identity` (matching either its payment
    /// intent id or its canonical id). The most recently updated row wins.
    async fn find_canonical_row(&self, identity: &str, exclude_id: i64) -> Result<Option<PaymentRecord>, LedgerError>;

    /// Folds the `source` row into the `target` row in one transaction:
    /// * the target's missing payment intent and charge ids are filled from `link`, and its status is updated if
    ///   `link` carries one.
    /// * the target's missing invoice id, user and descriptive fields are filled from the source.
    /// * the source is marked as merged into the target, with its canonical id set to the link identity.
    ///
    /// Returns the updated target.
    async fn merge_into_canonical(
        &self,
        source_id: i64,
        target_id: i64,
        link: &InvoiceLink,
    ) -> Result<PaymentRecord, LedgerError>;

    /// Fills the row's missing ids from `link` and makes the link identity its canonical id.
    async fn promote_payment(&self, id: i64, link: &InvoiceLink) -> Result<PaymentRecord, LedgerError>;

    /// The most recently updated active row with a payment intent id and the same amount as the query, excluding the
    /// query's own row.
    async fn find_heuristic_candidate(&self, query: HeuristicQuery) -> Result<Option<PaymentRecord>, LedgerError>;

    /// Marks the candidate as succeeded and disposes of the source row according to `mode`, in one transaction.
    async fn absorb_heuristic_match(
        &self,
        source_id: i64,
        candidate_id: i64,
        mode: HeuristicMergeMode,
    ) -> Result<PaymentRecord, LedgerError>;
}
