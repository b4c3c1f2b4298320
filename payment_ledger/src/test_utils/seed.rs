//! Direct table writes for setting up test scenarios that the public API deliberately cannot produce.
use chrono::{DateTime, Utc};

use crate::{
    db_types::{PaymentIds, SubscriptionStatus},
    SqliteDatabase,
};

/// Inserts a payment row without going through the upsert lookup, so duplicates can be created on purpose.
pub async fn insert_payment_row(db: &SqliteDatabase, ids: &PaymentIds, amount: i64, updated_at: DateTime<Utc>) -> i64 {
    sqlx::query_scalar(
        r#"
        INSERT INTO payments (canonical_id, payment_intent_id, charge_id, invoice_id, amount, currency, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, 'usd', $6, $6)
        RETURNING id
        "#,
    )
    .bind(ids.canonical_id.as_deref())
    .bind(ids.payment_intent_id.as_deref())
    .bind(ids.charge_id.as_deref())
    .bind(ids.invoice_id.as_deref())
    .bind(amount)
    .bind(updated_at)
    .fetch_one(db.pool())
    .await
    .expect("Error seeding payment")
}

pub async fn set_updated_at(db: &SqliteDatabase, id: i64, updated_at: DateTime<Utc>) {
    sqlx::query("UPDATE payments SET updated_at = $1 WHERE id = $2")
        .bind(updated_at)
        .bind(id)
        .execute(db.pool())
        .await
        .expect("Error updating payment timestamp");
}

pub async fn insert_subscription(
    db: &SqliteDatabase,
    user_id: &str,
    plan_key: &str,
    stripe_subscription_id: Option<&str>,
) -> i64 {
    sqlx::query_scalar(
        r#"
        INSERT INTO subscriptions (user_id, plan_key, stripe_subscription_id, status, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $5)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(plan_key)
    .bind(stripe_subscription_id)
    .bind(SubscriptionStatus::Pending)
    .bind(Utc::now())
    .fetch_one(db.pool())
    .await
    .expect("Error seeding subscription")
}

pub async fn count_payments(db: &SqliteDatabase) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM payments").fetch_one(db.pool()).await.expect("Error counting payments")
}

/// Marks `source_id` as merged into `target_id`, bypassing every check.
pub async fn mark_merged(db: &SqliteDatabase, source_id: i64, target_id: i64) {
    sqlx::query("UPDATE payments SET merged_into_id = $1, merged_at = $2 WHERE id = $3")
        .bind(target_id)
        .bind(Utc::now())
        .bind(source_id)
        .execute(db.pool())
        .await
        .expect("Error marking payment as merged");
}
