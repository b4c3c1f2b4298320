use chrono::Utc;
use log::debug;
use sqlx::SqliteConnection;

use crate::db_types::{SubscriptionLink, SubscriptionRecord, SubscriptionStatus};

/// Marks the user's subscriptions to `plan_key` as active. With [`SubscriptionLink::FillMissing`], the provider
/// subscription id is only written if the row does not have one yet.
pub async fn activate_for_plan(
    user_id: &str,
    plan_key: &str,
    stripe_subscription_id: Option<&str>,
    link: SubscriptionLink,
    conn: &mut SqliteConnection,
) -> Result<u64, sqlx::Error> {
    let sql = match link {
        SubscriptionLink::FillMissing => {
            r#"
            UPDATE subscriptions SET
                status = $1,
                updated_at = $2,
                stripe_subscription_id = COALESCE(stripe_subscription_id, $3)
            WHERE user_id = $4 AND plan_key = $5
            "#
        },
        SubscriptionLink::Replace => {
            r#"
            UPDATE subscriptions SET
                status = $1,
                updated_at = $2,
                stripe_subscription_id = $3
            WHERE user_id = $4 AND plan_key = $5
            "#
        },
    };
    let result = sqlx::query(sql)
        .bind(SubscriptionStatus::Active)
        .bind(Utc::now())
        .bind(stripe_subscription_id)
        .bind(user_id)
        .bind(plan_key)
        .execute(conn)
        .await?;
    debug!("🗃️ {} subscription(s) to {plan_key} activated for user {user_id}", result.rows_affected());
    Ok(result.rows_affected())
}

pub async fn activate_by_stripe_id(stripe_subscription_id: &str, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE subscriptions SET status = $1, updated_at = $2 WHERE stripe_subscription_id = $3")
        .bind(SubscriptionStatus::Active)
        .bind(Utc::now())
        .bind(stripe_subscription_id)
        .execute(conn)
        .await?;
    debug!("🗃️ {} subscription(s) activated for {stripe_subscription_id}", result.rows_affected());
    Ok(result.rows_affected())
}

pub async fn fetch_for_user(user_id: &str, conn: &mut SqliteConnection) -> Result<Vec<SubscriptionRecord>, sqlx::Error> {
    let subscriptions = sqlx::query_as("SELECT * FROM subscriptions WHERE user_id = $1 ORDER BY id ASC")
        .bind(user_id)
        .fetch_all(conn)
        .await?;
    Ok(subscriptions)
}
