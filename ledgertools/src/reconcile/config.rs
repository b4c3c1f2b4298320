use std::env;

use chrono::Duration;
use ledger_common::parse_boolean_flag;
use log::*;

#[derive(Debug, Clone, Default)]
pub struct ReconcilerConfig {
    /// The global switch for apply mode. Without it, `reconcile --apply` is refused unless `--force` is given.
    pub apply_enabled: bool,
    /// How far back heuristic matching may look for a candidate payment. `None` means no bound.
    pub heuristic_lookback: Option<Duration>,
}

impl ReconcilerConfig {
    pub fn from_env_or_default() -> Self {
        let apply_enabled = parse_boolean_flag(env::var("LEDGER_RECONCILER_APPLY_ENABLED").ok(), false);
        let heuristic_lookback = env::var("LEDGER_HEURISTIC_LOOKBACK_HOURS").ok().and_then(|s| {
            parse_lookback_hours(&s)
                .map_err(|e| warn!("🪛️ Ignoring LEDGER_HEURISTIC_LOOKBACK_HOURS. {e}"))
                .ok()
        });
        Self { apply_enabled, heuristic_lookback }
    }
}

pub fn parse_lookback_hours(s: &str) -> Result<Duration, String> {
    match s.trim().parse::<u32>() {
        Ok(hours) if hours > 0 => Ok(Duration::hours(i64::from(hours))),
        _ => Err(format!("'{s}' is not a positive number of hours")),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lookback_hours() {
        assert_eq!(parse_lookback_hours("48"), Ok(Duration::hours(48)));
        assert_eq!(parse_lookback_hours(" 1 "), Ok(Duration::hours(1)));
        assert!(parse_lookback_hours("0").is_err());
        assert!(parse_lookback_hours("-5").is_err());
        assert!(parse_lookback_hours("two days").is_err());
    }

    #[test]
    fn apply_is_off_by_default() {
        let config = ReconcilerConfig::default();
        assert!(!config.apply_enabled);
        assert!(config.heuristic_lookback.is_none());
    }
}
