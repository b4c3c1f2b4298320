use anyhow::{anyhow, Context, Result};
use log::*;
use payment_ledger::{
    reconciliation_objects::ReconcileSummary,
    CompactorApi,
    ReconcileError,
    ReconciliationApi,
    SqliteDatabase,
};
use stripe_tools::{StripeApi, StripeConfig};

use crate::{
    formatting::{format_dedup_result, format_reconcile_summary},
    reconcile::{ReconcileParams, ReconcilerConfig},
};

const MAX_CONNECTIONS: u32 = 2;

/// Runs the reconcile command and returns the process exit code.
pub async fn handle_reconcile_command(params: ReconcileParams) -> i32 {
    let config = ReconcilerConfig::from_env_or_default();
    match run_reconciliation(&params, &config).await {
        Ok(summary) => {
            if !params.json {
                println!("{}", format_reconcile_summary(&summary));
            }
            match serde_json::to_string_pretty(&summary) {
                Ok(json) => println!("{json}"),
                Err(e) => eprintln!("Could not represent the summary as JSON. {e}"),
            }
            0
        },
        Err(e) => {
            eprintln!("{e:#}");
            exit_code(&e)
        },
    }
}

/// Runs the dedup command and returns the process exit code.
pub async fn handle_dedup_command() -> i32 {
    let result = async {
        let db = connect_database().await?;
        let result = CompactorApi::new(db).compact().await?;
        Ok::<_, anyhow::Error>(result)
    }
    .await;
    match result {
        Ok(result) => {
            println!("{}", format_dedup_result(&result));
            0
        },
        Err(e) => {
            eprintln!("Compaction failed. {e:#}");
            2
        },
    }
}

async fn run_reconciliation(params: &ReconcileParams, config: &ReconcilerConfig) -> Result<ReconcileSummary> {
    let options = params.to_options(config)?;
    debug!("🧾️ Reconciling with {options:?}");
    let stripe = StripeApi::new(StripeConfig::new_from_env_or_default())?;
    if !stripe.is_configured() {
        return Err(anyhow!("LEDGER_STRIPE_SECRET_KEY is not set. Reconciliation needs read access to Stripe."));
    }
    let db = connect_database().await?;
    let api = ReconciliationApi::new(db, stripe);
    let summary = api.reconcile(&options, params.apply_permitted(config)).await?;
    Ok(summary)
}

async fn connect_database() -> Result<SqliteDatabase> {
    let db = SqliteDatabase::new(MAX_CONNECTIONS).await.context("Could not connect to the ledger database")?;
    db.run_migrations().await.context("Could not bring the ledger schema up to date")?;
    Ok(db)
}

/// Option errors carry their own exit code. Everything else is fatal.
fn exit_code(e: &anyhow::Error) -> i32 {
    e.downcast_ref::<ReconcileError>().map(ReconcileError::exit_code).unwrap_or(2)
}

#[cfg(test)]
mod test {
    use payment_ledger::LedgerError;

    use super::*;

    #[test]
    fn exit_codes() {
        assert_eq!(exit_code(&anyhow::Error::from(ReconcileError::ApplyNotEnabled)), 3);
        assert_eq!(exit_code(&anyhow::Error::from(ReconcileError::InvalidLimit("x".into()))), 4);
        let fatal = ReconcileError::Ledger(LedgerError::DatabaseError("disk I/O error".into()));
        assert_eq!(exit_code(&anyhow::Error::from(fatal)), 2);
        assert_eq!(exit_code(&anyhow!("LEDGER_STRIPE_SECRET_KEY is not set")), 2);
        let wrapped = anyhow::Error::from(ReconcileError::InvalidLimit("0".into())).context("while parsing options");
        assert_eq!(exit_code(&wrapped), 4);
    }
}
