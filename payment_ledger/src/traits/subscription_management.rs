use crate::{
    db_types::{SubscriptionLink, SubscriptionRecord},
    traits::LedgerError,
};

/// Subscription status transitions driven by provider events.
///
/// Subscription rows are created elsewhere (when a user starts a checkout). This trait only moves them to `active`
/// and records the provider subscription id.
#[allow(async_fn_in_trait)]
pub trait SubscriptionManagement: Clone {
    /// Activates the subscriptions for the given user and plan. `link` decides what happens to an existing provider
    /// subscription id. Returns the number of rows changed.
    async fn activate_subscription_for_plan(
        &self,
        user_id: &str,
        plan_key: &str,
        stripe_subscription_id: Option<&str>,
        link: SubscriptionLink,
    ) -> Result<u64, LedgerError>;

    /// Activates the subscriptions carrying the given provider subscription id. Returns the number of rows changed.
    async fn activate_subscription_by_stripe_id(&self, stripe_subscription_id: &str) -> Result<u64, LedgerError>;

    async fn fetch_subscriptions_for_user(&self, user_id: &str) -> Result<Vec<SubscriptionRecord>, LedgerError>;
}
