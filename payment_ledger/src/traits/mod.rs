//! # Storage and provider contracts
//!
//! This module defines the behaviour that backends need to expose in order to be used by the payment ledger APIs.
//!
//! * [`PaymentLedgerDatabase`] defines the highest level of behaviour: converging provider events onto one payment row
//!   per transaction, and compacting duplicates.
//! * [`ReconciliationManagement`] provides the merge and promotion steps used by the invoice reconciliation job.
//! * [`SubscriptionManagement`] drives subscription status transitions from provider events.
//! * [`PaymentProvider`] is the read-only view of the payment provider's API. It is implemented outside this crate.
mod data_objects;
mod payment_ledger_database;
mod payment_provider;
mod reconciliation_management;
mod subscription_management;

pub use data_objects::{
    DedupResult,
    HeuristicMergeMode,
    HeuristicQuery,
    InvoiceLink,
    UnlinkedPaymentFilter,
    UpsertResult,
};
pub use payment_ledger_database::{LedgerError, PaymentLedgerDatabase};
pub use payment_provider::{PaymentProvider, ProviderApiError, ProviderError};
pub use reconciliation_management::ReconciliationManagement;
pub use subscription_management::SubscriptionManagement;
