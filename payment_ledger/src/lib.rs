//! Payment Ledger
//!
//! The payment ledger converges asynchronous, possibly duplicated and out-of-order payment provider events into
//! exactly one canonical record per real-world transaction. It is the core of the Stripe webhook server and the
//! invoice reconciliation tooling.
//!
//! The library is divided into three main sections:
//! 1. Storage ([`mod@sqlite`] and the contracts in [`mod@traits`]). You should never need to access the database
//!    directly. Instead, use the public API provided by the ledger. The exception is the data types used in the
//!    database. These are defined in the `db_types` module and are public.
//! 2. Identifier extraction ([`mod@helpers`]). A provider object of any shape (payment intent, charge, invoice) is
//!    mapped onto the same set of identifiers, with the payment intent id as the preferred canonical id.
//! 3. The public API ([`mod@ledger_api`]): the upsert engine, the webhook dispatcher, the reconciliation batch job
//!    and the duplicate compactor.
pub mod db_types;
pub mod helpers;
mod ledger_api;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use ledger_api::{
    compactor_api::CompactorApi,
    errors::{ReconcileError, RowError, WebhookError},
    payment_ledger_api::PaymentLedgerApi,
    reconciliation_api::ReconciliationApi,
    reconciliation_objects,
    webhook_api::WebhookApi,
    webhook_objects,
};
pub use traits::{
    DedupResult,
    LedgerError,
    PaymentLedgerDatabase,
    PaymentProvider,
    ProviderError,
    ReconciliationManagement,
    SubscriptionManagement,
    UpsertResult,
};
