use thiserror::Error;

use crate::{
    db_types::{PaymentFields, PaymentIds, PaymentRecord},
    traits::data_objects::{DedupResult, UpsertResult},
};

/// This trait defines the highest level of behaviour for backends supporting the payment ledger.
///
/// This behaviour includes:
/// * Converging webhook events onto a single payment row per transaction (see [`Self::upsert_payment`]).
/// * Fetching payment rows.
/// * Compacting duplicate active rows.
#[allow(async_fn_in_trait)]
pub trait PaymentLedgerDatabase: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Finds the active payment matching any of the non-null identifiers in `ids` and updates it with `fields`, or
    /// inserts a new row if there is no match. The lookup and the write happen in a single transaction.
    ///
    /// On update:
    /// * identity fields (ids, `canonical_id`, `user_id`, `description`, `payment_method`, `receipt_email`) are only
    ///   filled in if they are currently null.
    /// * `amount` and `currency` are overwritten.
    /// * `status`, `metadata` and `raw_event` are overwritten, unless the new value is null.
    ///
    /// If more than one active row matches, the most recently updated one is used (lowest id on ties).
    async fn upsert_payment(&self, ids: &PaymentIds, fields: PaymentFields) -> Result<UpsertResult, LedgerError>;

    /// Fetches a payment row by its row id, whether active or not.
    async fn fetch_payment(&self, id: i64) -> Result<Option<PaymentRecord>, LedgerError>;

    /// Fetches the active payment rows carrying the given canonical id, most recently updated first.
    async fn fetch_active_payments_for_canonical_id(
        &self,
        canonical_id: &str,
    ) -> Result<Vec<PaymentRecord>, LedgerError>;

    /// Fetches every payment row (active or not) that references the given identifier in any id column.
    async fn fetch_payments_for_identifier(&self, identifier: &str) -> Result<Vec<PaymentRecord>, LedgerError>;

    /// Fetches the rows that were soft-merged into the given row.
    async fn fetch_merged_into(&self, id: i64) -> Result<Vec<PaymentRecord>, LedgerError>;

    /// For every canonical id shared by more than one active row, keeps the most recently updated row and deletes the
    /// rest. Audit links pointing at deleted rows are moved to the survivor. Runs in a single transaction.
    async fn compact_duplicates(&self) -> Result<DedupResult, LedgerError>;
}

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("The requested payment (internal id {0}) does not exist")]
    PaymentNotFound(i64),
    #[error("Payment #{0} has already been merged into another payment")]
    RowNotActive(i64),
    #[error("Payment #{0} cannot be merged into itself")]
    SelfMerge(i64),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::DatabaseError(e.to_string())
    }
}
