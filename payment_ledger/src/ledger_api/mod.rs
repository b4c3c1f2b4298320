//! # Payment ledger public API
//!
//! The `ledger_api` module exposes the programmatic API for the payment ledger.
//!
//! * [`payment_ledger_api`] is the single write path for payment rows. It serialises writers per canonical id.
//! * [`webhook_api`] dispatches authenticated provider events to the ledger and to subscription management.
//! * [`reconciliation_api`] is the batch job that repairs invoice payments with missing links.
//! * [`compactor_api`] removes duplicate active rows.
//!
//! # API usage
//!
//! An API instance is created by supplying a database backend that implements the backend traits the API needs, and
//! where relevant, a [`crate::traits::PaymentProvider`].
//!
//! ```rust,ignore
//! use payment_ledger::{PaymentLedgerApi, SqliteDatabase, WebhookApi};
//! let db = SqliteDatabase::new_with_url(...).await?;
//! let ledger = PaymentLedgerApi::new(db);
//! let api = WebhookApi::new(ledger, stripe_client);
//! let outcome = api.process_event(&event).await?;
//! ```
pub mod compactor_api;
pub mod errors;
pub mod payment_ledger_api;
pub mod reconciliation_api;
pub mod reconciliation_objects;
pub mod webhook_api;
pub mod webhook_objects;
