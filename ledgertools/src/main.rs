use clap::{Parser, Subcommand};
use dotenvy::dotenv;

mod formatting;
mod reconcile;

use crate::reconcile::{handle_dedup_command, handle_reconcile_command, ReconcileParams};

#[derive(Parser, Debug)]
#[command(version, about = "Operator tooling for the payment ledger")]
pub struct Arguments {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Link invoice payments that are missing their payment intent or charge, using Stripe as the source of truth.
    /// Nothing is written unless --apply is given.
    Reconcile(ReconcileParams),
    /// Delete duplicate active payment rows, keeping the most recently updated row for each transaction.
    Dedup,
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    let cli = Arguments::parse();
    let code = match cli.command {
        Command::Reconcile(params) => handle_reconcile_command(params).await,
        Command::Dedup => handle_dedup_command().await,
    };
    std::process::exit(code);
}
