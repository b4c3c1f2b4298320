use chrono::Duration;
use clap::Args;
use payment_ledger::{reconciliation_objects::ReconcileOptions, traits::HeuristicMergeMode, ReconcileError};

use crate::reconcile::config::{parse_lookback_hours, ReconcilerConfig};

#[derive(Debug, Args)]
pub struct ReconcileParams {
    /// Write the changes to the ledger. Requires LEDGER_RECONCILER_APPLY_ENABLED=true, or --force.
    #[arg(short, long)]
    pub apply: bool,
    /// When Stripe reports no payment for an invoice, pair it with the most recently updated payment of the same
    /// amount. Matches are only reported unless --apply is also given.
    #[arg(long)]
    pub apply_heuristic: bool,
    /// Delete payments absorbed by a heuristic match instead of keeping them as merged audit rows.
    #[arg(long, requires = "apply_heuristic")]
    pub heuristic_hard_delete: bool,
    /// Only reconcile the payment for this Stripe invoice id.
    #[arg(short, long)]
    pub invoice: Option<String>,
    /// Inspect at most this many payments. Must be a positive integer.
    #[arg(short, long)]
    pub limit: Option<String>,
    /// Allow --apply even when LEDGER_RECONCILER_APPLY_ENABLED is not set.
    #[arg(short, long)]
    pub force: bool,
    /// Only consider heuristic candidates updated in the last N hours. Overrides LEDGER_HEURISTIC_LOOKBACK_HOURS.
    #[arg(long, value_parser = parse_lookback_hours)]
    pub lookback_hours: Option<Duration>,
    /// Print only the JSON summary.
    #[arg(long)]
    pub json: bool,
}

impl ReconcileParams {
    pub fn apply_permitted(&self, config: &ReconcilerConfig) -> bool {
        config.apply_enabled || self.force
    }

    /// Builds the run options. Apply permission is checked first, so that a refused run never looks at anything else.
    pub fn to_options(&self, config: &ReconcilerConfig) -> Result<ReconcileOptions, ReconcileError> {
        let mut options = if self.apply { ReconcileOptions::apply() } else { ReconcileOptions::dry_run() };
        options.validate(self.apply_permitted(config))?;
        if let Some(raw) = &self.limit {
            options = options.with_limit(ReconcileOptions::parse_limit(raw)?);
        }
        if let Some(invoice_id) = &self.invoice {
            options = options.with_invoice_id(invoice_id.as_str());
        }
        if self.apply_heuristic {
            let mode =
                if self.heuristic_hard_delete { HeuristicMergeMode::HardDelete } else { HeuristicMergeMode::SoftMerge };
            options = options.with_heuristic(mode);
        }
        if let Some(lookback) = self.lookback_hours.or(config.heuristic_lookback) {
            options = options.with_lookback(lookback);
        }
        Ok(options)
    }
}

#[cfg(test)]
mod test {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        params: ReconcileParams,
    }

    fn params(args: &[&str]) -> ReconcileParams {
        let args = std::iter::once("reconcile").chain(args.iter().copied());
        Cli::try_parse_from(args).unwrap().params
    }

    #[test]
    fn dry_run_by_default() {
        let options = params(&[]).to_options(&ReconcilerConfig::default()).unwrap();
        assert_eq!(options, ReconcileOptions::dry_run());
    }

    #[test]
    fn apply_needs_the_switch_or_force() {
        let config = ReconcilerConfig::default();
        let err = params(&["--apply"]).to_options(&config).unwrap_err();
        assert_eq!(err.exit_code(), 3);
        let options = params(&["-a", "-f"]).to_options(&config).unwrap();
        assert!(options.apply);
        let enabled = ReconcilerConfig { apply_enabled: true, ..Default::default() };
        assert!(params(&["--apply"]).to_options(&enabled).unwrap().apply);
    }

    #[test]
    fn refused_apply_wins_over_a_bad_limit() {
        let err = params(&["--apply", "--limit", "abc"]).to_options(&ReconcilerConfig::default()).unwrap_err();
        assert_eq!(err.exit_code(), 3);
        let err = params(&["--limit", "abc"]).to_options(&ReconcilerConfig::default()).unwrap_err();
        assert_eq!(err.exit_code(), 4);
        let err = params(&["-l", "0"]).to_options(&ReconcilerConfig::default()).unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn heuristic_options() {
        let config = ReconcilerConfig { apply_enabled: false, heuristic_lookback: Some(Duration::hours(72)) };
        let options = params(&["--apply-heuristic", "-i", "in_9", "-l", "5"]).to_options(&config).unwrap();
        assert!(options.heuristic);
        assert!(!options.apply);
        assert_eq!(options.heuristic_merge, HeuristicMergeMode::SoftMerge);
        assert_eq!(options.invoice_id.as_deref(), Some("in_9"));
        assert_eq!(options.limit, Some(5));
        assert_eq!(options.lookback, Some(Duration::hours(72)));

        let options =
            params(&["--apply-heuristic", "--heuristic-hard-delete", "--lookback-hours", "6"]).to_options(&config).unwrap();
        assert_eq!(options.heuristic_merge, HeuristicMergeMode::HardDelete);
        assert_eq!(options.lookback, Some(Duration::hours(6)));
    }

    #[test]
    fn hard_delete_requires_the_heuristic() {
        assert!(Cli::try_parse_from(["reconcile", "--heuristic-hard-delete"]).is_err());
        assert!(Cli::try_parse_from(["reconcile", "--lookback-hours", "0"]).is_err());
    }
}
