//! # Payment ledger server
//! This crate hosts the HTTP server for the payment ledger. It is responsible for:
//! Listening for incoming webhook requests from Stripe.
//! Verifying the `Stripe-Signature` header against the shared webhook secret.
//! Handing authenticated events to the webhook dispatcher, which converges them onto canonical payment rows.
//! Periodically compacting duplicate payment rows.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/stripe/webhook`: The webhook route for receiving events from Stripe.

pub mod cli;
pub mod config;
pub mod data_objects;
pub mod dedup_worker;
pub mod errors;

pub mod helpers;
pub mod middleware;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
