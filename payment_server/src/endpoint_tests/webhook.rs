use actix_web::{http::StatusCode, test, App};
use chrono::{Duration, Utc};
use payment_ledger::{
    test_utils::{
        mock_provider::MockProvider,
        prepare_env::{create_database, new_test_database, random_db_path, tear_down},
        seed::count_payments,
    },
    PaymentLedgerApi,
    PaymentLedgerDatabase,
    SqliteDatabase,
    WebhookApi,
};
use serde_json::Value;

use super::helpers::{post_webhook, sign, TEST_SECRET};
use crate::{helpers::signature_header, routes::health};

const PI_SUCCEEDED: &str = r#"{
  "id": "evt_1",
  "type": "payment_intent.succeeded",
  "data": {
    "object": {
      "id": "pi_T1",
      "object": "payment_intent",
      "amount": 500,
      "currency": "usd",
      "status": "succeeded",
      "metadata": { "userId": "user_1" }
    }
  }
}"#;

const INVOICE_PAID: &str = r#"{
  "id": "evt_2",
  "type": "invoice.paid",
  "data": {
    "object": {
      "id": "in_I1",
      "object": "invoice",
      "payment_intent": "pi_T1",
      "amount_paid": 500,
      "paid": true
    }
  }
}"#;

fn webhook_api(db: &SqliteDatabase) -> WebhookApi<SqliteDatabase, MockProvider> {
    WebhookApi::new(PaymentLedgerApi::new(db.clone()), MockProvider::new())
}

fn assert_received(status: StatusCode, body: &str) {
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(body).expect("Body is not JSON");
    assert_eq!(body["received"], Value::Bool(true));
}

fn assert_rejected(status: StatusCode, body: &str) {
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_str(body).expect("Body is not JSON");
    assert!(body["error"].is_string());
}

#[actix_web::test]
async fn health_check() {
    let _ = env_logger::try_init().ok();
    let service = test::init_service(App::new().service(health)).await;
    let req = test::TestRequest::get().uri("/health").to_request();
    let res = test::call_service(&service, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(test::read_body(res).await, "👍️\n");
}

#[actix_web::test]
async fn signed_events_converge() {
    let _ = env_logger::try_init().ok();
    let db = new_test_database().await;
    let (status, body) = post_webhook(webhook_api(&db), TEST_SECRET, PI_SUCCEEDED, Some(sign(PI_SUCCEEDED))).await;
    assert_received(status, &body);
    let (status, body) = post_webhook(webhook_api(&db), TEST_SECRET, INVOICE_PAID, Some(sign(INVOICE_PAID))).await;
    assert_received(status, &body);

    let rows = db.fetch_active_payments_for_canonical_id("pi_T1").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].invoice_id.as_deref(), Some("in_I1"));
    assert_eq!(rows[0].amount.value(), 500);
    assert_eq!(rows[0].user_id.as_deref(), Some("user_1"));
    tear_down(db).await;
}

#[actix_web::test]
async fn tampered_body_is_rejected() {
    let _ = env_logger::try_init().ok();
    let db = new_test_database().await;
    let signature = sign(PI_SUCCEEDED);
    let tampered = PI_SUCCEEDED.replace("500", "5");
    let (status, body) = post_webhook(webhook_api(&db), TEST_SECRET, &tampered, Some(signature)).await;
    assert_rejected(status, &body);
    assert_eq!(count_payments(&db).await, 0);
    tear_down(db).await;
}

#[actix_web::test]
async fn stale_signature_is_rejected() {
    let _ = env_logger::try_init().ok();
    let db = new_test_database().await;
    let an_hour_ago = (Utc::now() - Duration::hours(1)).timestamp();
    let signature = signature_header(TEST_SECRET, an_hour_ago, PI_SUCCEEDED.as_bytes()).unwrap();
    let (status, body) = post_webhook(webhook_api(&db), TEST_SECRET, PI_SUCCEEDED, Some(signature)).await;
    assert_rejected(status, &body);
    assert!(body.contains("tolerance"));
    assert_eq!(count_payments(&db).await, 0);
    tear_down(db).await;
}

#[actix_web::test]
async fn missing_signature_is_rejected() {
    let _ = env_logger::try_init().ok();
    let db = new_test_database().await;
    let (status, body) = post_webhook(webhook_api(&db), TEST_SECRET, PI_SUCCEEDED, None).await;
    assert_rejected(status, &body);
    assert!(body.contains("No Stripe-Signature header"));
    let (status, body) =
        post_webhook(webhook_api(&db), TEST_SECRET, PI_SUCCEEDED, Some("not a signature".into())).await;
    assert_rejected(status, &body);
    assert_eq!(count_payments(&db).await, 0);
    tear_down(db).await;
}

#[actix_web::test]
async fn unconfigured_secret_rejects_everything() {
    let _ = env_logger::try_init().ok();
    let db = new_test_database().await;
    let signature = signature_header("", Utc::now().timestamp(), PI_SUCCEEDED.as_bytes()).unwrap();
    let (status, body) = post_webhook(webhook_api(&db), "", PI_SUCCEEDED, Some(signature)).await;
    assert_rejected(status, &body);
    assert_eq!(count_payments(&db).await, 0);
    tear_down(db).await;
}

#[actix_web::test]
async fn unparseable_body_is_rejected() {
    let _ = env_logger::try_init().ok();
    let db = new_test_database().await;
    let body = "this is not json";
    let (status, response) = post_webhook(webhook_api(&db), TEST_SECRET, body, Some(sign(body))).await;
    assert_rejected(status, &response);
    tear_down(db).await;
}

#[actix_web::test]
async fn unhandled_events_are_acknowledged() {
    let _ = env_logger::try_init().ok();
    let db = new_test_database().await;
    let body = r#"{"id": "evt_9", "type": "customer.updated", "data": {"object": {"id": "cus_1"}}}"#;
    let (status, response) = post_webhook(webhook_api(&db), TEST_SECRET, body, Some(sign(body))).await;
    assert_received(status, &response);
    assert_eq!(count_payments(&db).await, 0);
    tear_down(db).await;
}

#[actix_web::test]
async fn dispatch_failures_are_still_acknowledged() {
    let _ = env_logger::try_init().ok();
    // A database without the ledger schema makes every write fail
    let url = random_db_path();
    create_database(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 1).await.expect("Error creating database");
    let (status, body) = post_webhook(webhook_api(&db), TEST_SECRET, PI_SUCCEEDED, Some(sign(PI_SUCCEEDED))).await;
    assert_received(status, &body);
    tear_down(db).await;
}
