use std::{env, time::Duration as StdDuration};

use chrono::Duration;
use ledger_common::Secret;
use log::*;
use stripe_tools::StripeConfig;

const DEFAULT_LEDGER_HOST: &str = "127.0.0.1";
const DEFAULT_LEDGER_PORT: u16 = 8360;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/payment_ledger.db";
const DEFAULT_SIGNATURE_TOLERANCE: Duration = Duration::seconds(300);
const DEFAULT_DEDUP_INTERVAL: StdDuration = StdDuration::from_secs(3600);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// The Stripe webhook signing secret. When it is not set, every webhook is rejected.
    pub webhook_secret: Secret<String>,
    /// The maximum age of the timestamp in a `Stripe-Signature` header.
    pub signature_tolerance: Duration,
    /// How often the duplicate compactor runs. `None` disables the worker.
    pub dedup_interval: Option<StdDuration>,
    pub stripe: StripeConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_LEDGER_HOST.to_string(),
            port: DEFAULT_LEDGER_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            webhook_secret: Secret::default(),
            signature_tolerance: DEFAULT_SIGNATURE_TOLERANCE,
            dedup_interval: Some(DEFAULT_DEDUP_INTERVAL),
            stripe: StripeConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("LEDGER_HOST").ok().unwrap_or_else(|| DEFAULT_LEDGER_HOST.into());
        let port = env::var("LEDGER_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for LEDGER_PORT. {e} Using the default, {DEFAULT_LEDGER_PORT}, \
                         instead."
                    );
                    DEFAULT_LEDGER_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_LEDGER_PORT);
        let database_url = env::var("LEDGER_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ LEDGER_DATABASE_URL is not set. Using {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let webhook_secret = Secret::new(env::var("LEDGER_WEBHOOK_SECRET").ok().unwrap_or_else(|| {
            error!("🪛️ LEDGER_WEBHOOK_SECRET is not set. All incoming webhooks will be rejected.");
            String::default()
        }));
        let signature_tolerance = parse_seconds("LEDGER_SIGNATURE_TOLERANCE_SECS")
            .map(|secs| Duration::seconds(secs as i64))
            .unwrap_or(DEFAULT_SIGNATURE_TOLERANCE);
        let dedup_interval = configure_dedup_interval();
        let stripe = StripeConfig::new_from_env_or_default();
        Self { host, port, database_url, webhook_secret, signature_tolerance, dedup_interval, stripe }
    }
}

fn configure_dedup_interval() -> Option<StdDuration> {
    match parse_seconds("LEDGER_DEDUP_INTERVAL_SECS") {
        Some(0) => {
            info!("🪛️ LEDGER_DEDUP_INTERVAL_SECS is 0. The dedup worker is disabled.");
            None
        },
        Some(secs) => Some(StdDuration::from_secs(secs)),
        None => Some(DEFAULT_DEDUP_INTERVAL),
    }
}

/// Reads a whole number of seconds from the environment. Invalid values are logged and ignored.
fn parse_seconds(name: &str) -> Option<u64> {
    let value = env::var(name).ok()?;
    value
        .trim()
        .parse::<u64>()
        .map_err(|e| warn!("🪛️ {value} is not a valid value for {name}. {e} Using the default instead."))
        .ok()
}
