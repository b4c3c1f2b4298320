use std::time::Duration;

use ledger_common::Secret;
use log::*;

pub const DEFAULT_STRIPE_API_URL: &str = "https://api.stripe.com";
pub const DEFAULT_STRIPE_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: Secret<String>,
    /// Scheme and host of the Stripe API, without the `/v1` prefix.
    pub api_url: String,
    pub timeout: Duration,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            secret_key: Secret::default(),
            api_url: DEFAULT_STRIPE_API_URL.to_string(),
            timeout: DEFAULT_STRIPE_TIMEOUT,
        }
    }
}

impl StripeConfig {
    pub fn new_from_env_or_default() -> Self {
        let secret_key = Secret::new(std::env::var("LEDGER_STRIPE_SECRET_KEY").unwrap_or_else(|_| {
            warn!("🪛️ LEDGER_STRIPE_SECRET_KEY not set. Calls to the Stripe API will fail.");
            String::default()
        }));
        let api_url = std::env::var("LEDGER_STRIPE_API_URL").unwrap_or_else(|_| {
            debug!("🪛️ LEDGER_STRIPE_API_URL not set, using {DEFAULT_STRIPE_API_URL}");
            DEFAULT_STRIPE_API_URL.to_string()
        });
        let timeout = std::env::var("LEDGER_STRIPE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| {
                s.parse::<u64>()
                    .map_err(|e| warn!("🪛️ Invalid LEDGER_STRIPE_TIMEOUT_SECS value '{s}'. {e}"))
                    .ok()
            })
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_STRIPE_TIMEOUT);
        Self { secret_key, api_url: api_url.trim_end_matches('/').to_string(), timeout }
    }
}
