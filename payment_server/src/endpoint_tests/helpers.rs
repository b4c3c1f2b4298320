use actix_web::{body::MessageBody, http::StatusCode, test, test::TestRequest, web, App};
use chrono::{Duration, Utc};
use ledger_common::Secret;
use log::debug;
use payment_ledger::{PaymentProvider, WebhookApi};

use crate::{
    helpers::{signature_header, STRIPE_SIGNATURE_HEADER},
    middleware::StripeSignatureMiddlewareFactory,
    routes::{health, StripeWebhookRoute, WebhookBackend},
};

// Test signing secret. DO NOT re-use it anywhere.
pub const TEST_SECRET: &str = "whsec_endpoint_tests_only";

/// A valid `Stripe-Signature` header for `body`, signed with [`TEST_SECRET`] just now.
pub fn sign(body: &str) -> String {
    signature_header(TEST_SECRET, Utc::now().timestamp(), body.as_bytes()).expect("Failed to sign body")
}

/// Posts `body` to the webhook endpoint of an app whose webhook secret is `secret`.
///
/// Errors raised by the middleware or handler are rendered the way actix would render them to the client.
pub async fn post_webhook<B, P>(
    api: WebhookApi<B, P>,
    secret: &str,
    body: &str,
    signature: Option<String>,
) -> (StatusCode, String)
where
    B: WebhookBackend + 'static,
    P: PaymentProvider + 'static,
{
    let mut req = TestRequest::post().uri("/stripe/webhook").set_payload(body.to_string());
    if let Some(sig) = signature {
        req = req.insert_header((STRIPE_SIGNATURE_HEADER, sig));
    }
    let stripe_scope = web::scope("/stripe")
        .wrap(StripeSignatureMiddlewareFactory::new(Secret::new(secret.to_string()), Duration::seconds(300)))
        .service(StripeWebhookRoute::<B, P>::new());
    let app = App::new().app_data(web::Data::new(api)).service(health).service(stripe_scope);
    let service = test::init_service(app).await;
    debug!("Making request");
    match test::try_call_service(&service, req.to_request()).await {
        Ok(res) => {
            let status = res.status();
            let body = test::read_body(res).await;
            (status, String::from_utf8_lossy(&body).into_owned())
        },
        Err(e) => {
            let res = e.error_response();
            let status = res.status();
            let body = res.into_body().try_into_bytes().unwrap_or_default();
            (status, String::from_utf8_lossy(&body).into_owned())
        },
    }
}
