use thiserror::Error;

use crate::traits::{LedgerError, ProviderError};

#[derive(Debug, Clone, Error)]
pub enum WebhookError {
    #[error("Could not store the event. {0}")]
    Ledger(#[from] LedgerError),
    #[error("The event object is not usable. {0}")]
    MalformedObject(String),
}

/// Failures that stop a reconciliation run before or after the per-row work. Per-row failures never end up here;
/// they are recorded in the row report instead.
#[derive(Debug, Clone, Error)]
pub enum ReconcileError {
    #[error(
        "Apply mode is not enabled. Set LEDGER_RECONCILER_APPLY_ENABLED=true or pass --force to allow changes to the \
         ledger."
    )]
    ApplyNotEnabled,
    #[error("Invalid limit '{0}'. The limit must be a positive integer.")]
    InvalidLimit(String),
    #[error("Reconciliation failed. {0}")]
    Ledger(#[from] LedgerError),
}

impl ReconcileError {
    /// The process exit code a command line tool should report for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            ReconcileError::ApplyNotEnabled => 3,
            ReconcileError::InvalidLimit(_) => 4,
            ReconcileError::Ledger(_) => 2,
        }
    }
}

/// Why a single row could not be reconciled.
#[derive(Debug, Clone, Error)]
pub enum RowError {
    #[error("{0}")]
    Provider(#[from] ProviderError),
    #[error("{0}")]
    Ledger(#[from] LedgerError),
    #[error("Payment #{0} has no invoice id")]
    MissingInvoiceId(i64),
}

impl RowError {
    pub fn request_id(&self) -> Option<&str> {
        match self {
            RowError::Provider(e) => e.request_id(),
            _ => None,
        }
    }
}
