use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::*;
use payment_ledger::{PaymentLedgerApi, SqliteDatabase, WebhookApi};
use stripe_tools::StripeApi;

use crate::{
    config::ServerConfig,
    dedup_worker::start_dedup_worker,
    errors::ServerError,
    middleware::StripeSignatureMiddlewareFactory,
    routes::{health, StripeWebhookRoute},
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.run_migrations().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let provider = StripeApi::new(config.stripe.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    if !provider.is_configured() {
        warn!("🪛️ The Stripe API client is not configured. Users cannot be backfilled on charges.");
    }
    match config.dedup_interval {
        Some(interval) => {
            let _handle = start_dedup_worker(db.clone(), interval);
        },
        None => info!("🧹️ The dedup worker is disabled"),
    }
    let srv = create_server_instance(config, db, provider)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    provider: StripeApi,
) -> Result<Server, ServerError> {
    // Created once, so that every worker shares the same write locks
    let ledger = PaymentLedgerApi::new(db);
    let srv = HttpServer::new(move || {
        let webhook_api = WebhookApi::new(ledger.clone(), provider.clone());
        let stripe_scope = web::scope("/stripe")
            .wrap(StripeSignatureMiddlewareFactory::new(config.webhook_secret.clone(), config.signature_tolerance))
            .service(StripeWebhookRoute::<SqliteDatabase, StripeApi>::new());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("ledger::access_log"))
            .app_data(web::Data::new(webhook_api))
            .service(health)
            .service(stripe_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}
