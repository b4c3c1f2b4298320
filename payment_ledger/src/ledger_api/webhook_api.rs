use std::fmt::Debug;

use ledger_common::{Cents, DEFAULT_CURRENCY};
use log::*;
use serde_json::Value;

use crate::{
    db_types::{PaymentFields, SubscriptionLink},
    helpers::{extract_payment_ids_or, first_charge, id_of, json_i64, json_str, metadata_str, ObjectKind},
    ledger_api::{
        errors::WebhookError,
        payment_ledger_api::PaymentLedgerApi,
        webhook_objects::{DispatchOutcome, EventKind, ProviderEvent},
    },
    traits::{PaymentLedgerDatabase, PaymentProvider, SubscriptionManagement, UpsertResult},
};

const STATUS_SUCCEEDED: &str = "succeeded";
const STATUS_PENDING: &str = "pending";
const STATUS_REFUNDED: &str = "refunded";
const USER_ID_KEY: &str = "userId";
const PLAN_KEY: &str = "plan";

/// `WebhookApi` turns authenticated provider events into ledger writes and subscription transitions.
///
/// It holds no per-event state. Every event is handled on its own, and redelivered events converge on the same rows.
pub struct WebhookApi<B, P> {
    ledger: PaymentLedgerApi<B>,
    provider: P,
}

impl<B, P> Debug for WebhookApi<B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WebhookApi")
    }
}

impl<B, P> WebhookApi<B, P> {
    pub fn new(ledger: PaymentLedgerApi<B>, provider: P) -> Self {
        Self { ledger, provider }
    }

    pub fn ledger(&self) -> &PaymentLedgerApi<B> {
        &self.ledger
    }
}

impl<B, P> WebhookApi<B, P>
where
    B: PaymentLedgerDatabase + SubscriptionManagement,
    P: PaymentProvider,
{
    /// Dispatches the event by type. Unrecognised types are a no-op.
    pub async fn process_event(&self, event: &ProviderEvent) -> Result<DispatchOutcome, WebhookError> {
        let obj = event.object();
        match event.kind() {
            EventKind::PaymentIntentSucceeded => self.payment_intent_succeeded(obj).await.map(DispatchOutcome::Payment),
            EventKind::InvoicePaid => self.invoice_paid(obj).await,
            EventKind::ChargeSucceeded => self.charge_succeeded(obj).await.map(DispatchOutcome::Payment),
            EventKind::ChargeRefunded => self.charge_refunded(obj).await.map(DispatchOutcome::Payment),
            EventKind::SubscriptionCreated => self.subscription_created(obj).await,
            EventKind::Other => {
                debug!("🪝️ Unhandled event type: {}", event.event_type);
                Ok(DispatchOutcome::Ignored(event.event_type.clone()))
            },
        }
    }

    async fn payment_intent_succeeded(&self, pi: &Value) -> Result<UpsertResult, WebhookError> {
        let ids = extract_payment_ids_or(pi, ObjectKind::PaymentIntent);
        if ids.payment_intent_id.is_none() {
            return Err(WebhookError::MalformedObject("The payment intent has no id".into()));
        }
        let charge = first_charge(pi);
        let amount = json_i64(pi, "amount")
            .filter(|a| *a != 0)
            .or_else(|| charge.and_then(|c| json_i64(c, "amount")))
            .unwrap_or_default();
        let fields = PaymentFields::new(Cents::from(amount), currency_of(pi))
            .with_status(json_str(pi, "status").unwrap_or_else(|| STATUS_SUCCEEDED.into()))
            .with_user_id(metadata_str(pi, USER_ID_KEY))
            .with_payment_method(id_of(pi.get("payment_method")))
            .with_receipt_email(json_str(pi, "receipt_email"))
            .with_description(json_str(pi, "description"))
            .with_metadata(metadata_of(pi))
            .with_raw_event(pi.clone());
        info!("🪝️ Payment intent succeeded: {ids}, amount {amount}");
        Ok(self.ledger.upsert(&ids, fields).await?)
    }

    async fn invoice_paid(&self, invoice: &Value) -> Result<DispatchOutcome, WebhookError> {
        let ids = extract_payment_ids_or(invoice, ObjectKind::Invoice);
        if ids.invoice_id.is_none() {
            return Err(WebhookError::MalformedObject("The invoice has no id".into()));
        }
        let amount = json_i64(invoice, "amount_paid")
            .filter(|a| *a != 0)
            .or_else(|| json_i64(invoice, "total"))
            .unwrap_or_default();
        let paid = invoice.get("paid").and_then(Value::as_bool).unwrap_or(false);
        let status = if paid { STATUS_SUCCEEDED } else { STATUS_PENDING };
        let user_id = metadata_str(invoice, USER_ID_KEY);
        let fields = PaymentFields::new(Cents::from(amount), currency_of(invoice))
            .with_status(status)
            .with_user_id(user_id.clone())
            .with_description(json_str(invoice, "description"))
            .with_metadata(metadata_of(invoice))
            .with_raw_event(invoice.clone());
        info!("🪝️ Invoice paid: {ids}, amount {amount}, status {status}");
        let payment = self.ledger.upsert(&ids, fields).await?;

        let plan_key = metadata_str(invoice, PLAN_KEY);
        let subscription_id = id_of(invoice.get("subscription"));
        let db = self.ledger.db();
        let subscriptions_activated = match (user_id, plan_key, subscription_id) {
            (Some(user_id), Some(plan_key), sub_id) => {
                db.activate_subscription_for_plan(&user_id, &plan_key, sub_id.as_deref(), SubscriptionLink::FillMissing)
                    .await?
            },
            (_, _, Some(sub_id)) => db.activate_subscription_by_stripe_id(&sub_id).await?,
            _ => 0,
        };
        Ok(DispatchOutcome::Invoice { payment, subscriptions_activated })
    }

    async fn charge_succeeded(&self, charge: &Value) -> Result<UpsertResult, WebhookError> {
        let ids = extract_payment_ids_or(charge, ObjectKind::Charge);
        if ids.charge_id.is_none() {
            return Err(WebhookError::MalformedObject("The charge has no id".into()));
        }
        let payment_method = id_of(charge.get("payment_method")).or_else(|| {
            charge.get("payment_method_details").and_then(|d| json_str(d, "type"))
        });
        let user_id = match metadata_str(charge, USER_ID_KEY) {
            Some(user_id) => Some(user_id),
            None => self.backfill_charge_user(charge, ids.payment_intent_id.as_deref()).await,
        };
        let amount = json_i64(charge, "amount").unwrap_or_default();
        let fields = PaymentFields::new(Cents::from(amount), currency_of(charge))
            .with_status(json_str(charge, "status").unwrap_or_else(|| STATUS_SUCCEEDED.into()))
            .with_user_id(user_id)
            .with_payment_method(payment_method)
            .with_receipt_email(json_str(charge, "receipt_email"))
            .with_description(json_str(charge, "description"))
            .with_metadata(metadata_of(charge))
            .with_raw_event(charge.clone());
        info!("🪝️ Charge succeeded: {ids}, amount {amount}");
        Ok(self.ledger.upsert(&ids, fields).await?)
    }

    async fn charge_refunded(&self, charge: &Value) -> Result<UpsertResult, WebhookError> {
        let ids = extract_payment_ids_or(charge, ObjectKind::Charge);
        if ids.charge_id.is_none() {
            return Err(WebhookError::MalformedObject("The charge has no id".into()));
        }
        let amount = json_i64(charge, "amount").unwrap_or_default();
        let fields = PaymentFields::new(Cents::from(amount), currency_of(charge))
            .with_status(STATUS_REFUNDED)
            .with_user_id(metadata_str(charge, USER_ID_KEY))
            .with_description(json_str(charge, "description"))
            .with_metadata(metadata_of(charge))
            .with_raw_event(charge.clone());
        info!("🪝️ Charge refunded: {ids}");
        Ok(self.ledger.upsert(&ids, fields).await?)
    }

    async fn subscription_created(&self, subscription: &Value) -> Result<DispatchOutcome, WebhookError> {
        let sub_id = json_str(subscription, "id")
            .ok_or_else(|| WebhookError::MalformedObject("The subscription has no id".into()))?;
        let user_id = metadata_str(subscription, USER_ID_KEY);
        let plan_key = metadata_str(subscription, PLAN_KEY);
        let db = self.ledger.db();
        let activated = match (user_id, plan_key) {
            (Some(user_id), Some(plan_key)) => {
                db.activate_subscription_for_plan(&user_id, &plan_key, Some(&sub_id), SubscriptionLink::Replace).await?
            },
            _ => db.activate_subscription_by_stripe_id(&sub_id).await?,
        };
        info!("🪝️ Subscription {sub_id} created. {activated} subscription(s) activated");
        Ok(DispatchOutcome::Subscription { activated })
    }

    /// Best-effort lookup of the user behind a charge that carries no user metadata: first the payment intent's
    /// metadata, then the metadata of the payment intent's customer. A charge without a payment intent falls back to
    /// its own customer. Provider errors are logged and give `None`.
    async fn backfill_charge_user(&self, charge: &Value, payment_intent_id: Option<&str>) -> Option<String> {
        let customer_id = match payment_intent_id {
            Some(pi_id) => {
                let pi = self
                    .provider
                    .fetch_payment_intent(pi_id)
                    .await
                    .map_err(|e| debug!("🪝️ Could not fetch payment intent {pi_id} for user lookup. {e}"))
                    .ok()?;
                if let Some(user_id) = metadata_str(&pi, USER_ID_KEY) {
                    return Some(user_id);
                }
                id_of(pi.get("customer"))
            },
            None => id_of(charge.get("customer")),
        }?;
        let customer = self
            .provider
            .fetch_customer(&customer_id)
            .await
            .map_err(|e| debug!("🪝️ Could not fetch customer {customer_id} for user lookup. {e}"))
            .ok()?;
        let user_id = metadata_str(&customer, USER_ID_KEY);
        trace!("🪝️ User for customer {customer_id}: {user_id:?}");
        user_id
    }
}

fn currency_of(obj: &Value) -> String {
    json_str(obj, "currency").unwrap_or_else(|| DEFAULT_CURRENCY.to_string())
}

fn metadata_of(obj: &Value) -> Option<Value> {
    obj.get("metadata").filter(|m| !m.is_null()).cloned()
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;
    use crate::{
        db_types::SubscriptionStatus,
        test_utils::{
            mock_provider::MockProvider,
            prepare_env::{new_test_database, tear_down},
            seed::insert_subscription,
        },
        SqliteDatabase,
    };

    async fn api_with(provider: MockProvider) -> WebhookApi<SqliteDatabase, MockProvider> {
        WebhookApi::new(PaymentLedgerApi::new(new_test_database().await), provider)
    }

    fn pi_succeeded() -> ProviderEvent {
        ProviderEvent::new(
            "payment_intent.succeeded",
            json!({
                "id": "pi_T1", "object": "payment_intent", "amount": 500, "currency": "usd", "status": "succeeded",
                "metadata": { "userId": "user_1" }, "payment_method": "pm_1", "receipt_email": "a@example.com"
            }),
        )
        .with_id("evt_1")
    }

    fn invoice_paid() -> ProviderEvent {
        ProviderEvent::new(
            "invoice.paid",
            json!({
                "id": "in_I1", "object": "invoice", "payment_intent": "pi_T1", "amount_paid": 500, "paid": true,
                "currency": "usd", "subscription": "sub_1", "metadata": { "userId": "user_1", "plan": "pro" }
            }),
        )
        .with_id("evt_2")
    }

    async fn assert_converged(api: &WebhookApi<SqliteDatabase, MockProvider>) {
        let rows = api.ledger().active_payments("pi_T1").await.unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.invoice_id.as_deref(), Some("in_I1"));
        assert_eq!(row.amount, Cents::from(500));
        assert_eq!(row.status.as_deref(), Some("succeeded"));
        assert_eq!(row.user_id.as_deref(), Some("user_1"));
        assert_eq!(api.ledger().payments_for_identifier("in_I1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn payment_then_invoice_converge() {
        let api = api_with(MockProvider::new()).await;
        api.process_event(&pi_succeeded()).await.unwrap();
        api.process_event(&invoice_paid()).await.unwrap();
        assert_converged(&api).await;
        tear_down(api.ledger().db().clone()).await;
    }

    #[tokio::test]
    async fn invoice_then_payment_converge() {
        let api = api_with(MockProvider::new()).await;
        api.process_event(&invoice_paid()).await.unwrap();
        api.process_event(&pi_succeeded()).await.unwrap();
        assert_converged(&api).await;
        tear_down(api.ledger().db().clone()).await;
    }

    #[tokio::test]
    async fn redelivered_event_is_idempotent() {
        let api = api_with(MockProvider::new()).await;
        let first = api.process_event(&pi_succeeded()).await.unwrap();
        let second = api.process_event(&pi_succeeded()).await.unwrap();
        match (first, second) {
            (DispatchOutcome::Payment(a), DispatchOutcome::Payment(b)) => {
                assert!(a.inserted);
                assert_eq!(b, UpsertResult::updated(a.id));
            },
            other => panic!("Unexpected outcomes {other:?}"),
        }
        assert_eq!(api.ledger().payments_for_identifier("pi_T1").await.unwrap().len(), 1);
        tear_down(api.ledger().db().clone()).await;
    }

    #[tokio::test]
    async fn invoice_activates_plan_subscription() {
        let api = api_with(MockProvider::new()).await;
        let db = api.ledger().db().clone();
        insert_subscription(&db, "user_1", "pro", None).await;
        insert_subscription(&db, "user_1", "basic", None).await;
        let outcome = api.process_event(&invoice_paid()).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::Invoice { subscriptions_activated: 1, .. }));
        let subs = db.fetch_subscriptions_for_user("user_1").await.unwrap();
        assert_eq!(subs[0].status, SubscriptionStatus::Active);
        assert_eq!(subs[0].stripe_subscription_id.as_deref(), Some("sub_1"));
        assert_eq!(subs[1].status, SubscriptionStatus::Pending);
        tear_down(db).await;
    }

    #[tokio::test]
    async fn invoice_keeps_existing_subscription_id() {
        let api = api_with(MockProvider::new()).await;
        let db = api.ledger().db().clone();
        insert_subscription(&db, "user_1", "pro", Some("sub_original")).await;
        api.process_event(&invoice_paid()).await.unwrap();
        let subs = db.fetch_subscriptions_for_user("user_1").await.unwrap();
        assert_eq!(subs[0].stripe_subscription_id.as_deref(), Some("sub_original"));
        assert_eq!(subs[0].status, SubscriptionStatus::Active);
        tear_down(db).await;
    }

    #[tokio::test]
    async fn unpaid_invoice_without_plan_uses_subscription_id() {
        let api = api_with(MockProvider::new()).await;
        let db = api.ledger().db().clone();
        insert_subscription(&db, "user_2", "pro", Some("sub_2")).await;
        let event = ProviderEvent::new(
            "invoice.payment_succeeded",
            json!({ "id": "in_2", "object": "invoice", "total": 900, "paid": false, "subscription": "sub_2" }),
        );
        let outcome = api.process_event(&event).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::Invoice { subscriptions_activated: 1, .. }));
        let row = &api.ledger().active_payments("in_2").await.unwrap()[0];
        assert_eq!(row.amount, Cents::from(900));
        assert_eq!(row.status.as_deref(), Some("pending"));
        assert_eq!(row.currency, "usd");
        tear_down(db).await;
    }

    #[tokio::test]
    async fn subscription_created_replaces_provider_id() {
        let api = api_with(MockProvider::new()).await;
        let db = api.ledger().db().clone();
        insert_subscription(&db, "user_1", "pro", Some("sub_old")).await;
        let event = ProviderEvent::new(
            "customer.subscription.created",
            json!({ "id": "sub_new", "object": "subscription", "metadata": { "userId": "user_1", "plan": "pro" } }),
        );
        let outcome = api.process_event(&event).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Subscription { activated: 1 });
        let subs = db.fetch_subscriptions_for_user("user_1").await.unwrap();
        assert_eq!(subs[0].stripe_subscription_id.as_deref(), Some("sub_new"));
        assert_eq!(subs[0].status, SubscriptionStatus::Active);
        tear_down(db).await;
    }

    #[tokio::test]
    async fn charge_user_is_backfilled_from_customer() {
        let provider = MockProvider::new()
            .with_object(json!({ "id": "pi_9", "object": "payment_intent", "customer": "cus_9", "metadata": {} }))
            .with_object(json!({ "id": "cus_9", "object": "customer", "metadata": { "userId": "user_9" } }));
        let api = api_with(provider.clone()).await;
        let event = ProviderEvent::new(
            "charge.succeeded",
            json!({
                "id": "ch_9", "object": "charge", "payment_intent": "pi_9", "amount": 1200, "currency": "gbp",
                "payment_method_details": { "type": "card" }
            }),
        );
        api.process_event(&event).await.unwrap();
        let row = &api.ledger().active_payments("pi_9").await.unwrap()[0];
        assert_eq!(row.user_id.as_deref(), Some("user_9"));
        assert_eq!(row.charge_id.as_deref(), Some("ch_9"));
        assert_eq!(row.payment_method.as_deref(), Some("card"));
        assert_eq!(row.status.as_deref(), Some("succeeded"));
        assert_eq!(provider.call_count(), 2);
        tear_down(api.ledger().db().clone()).await;
    }

    #[tokio::test]
    async fn charge_user_lookup_failure_is_ignored() {
        let provider = MockProvider::new().fail_on("pi_9", 500, "req_123");
        let api = api_with(provider).await;
        let event = ProviderEvent::new(
            "charge.succeeded",
            json!({ "id": "ch_9", "object": "charge", "payment_intent": "pi_9", "amount": 1200 }),
        );
        let outcome = api.process_event(&event).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::Payment(UpsertResult { inserted: true, .. })));
        let row = &api.ledger().active_payments("pi_9").await.unwrap()[0];
        assert_eq!(row.user_id, None);
        tear_down(api.ledger().db().clone()).await;
    }

    #[tokio::test]
    async fn refund_forces_status() {
        let api = api_with(MockProvider::new()).await;
        api.process_event(&pi_succeeded()).await.unwrap();
        let event = ProviderEvent::new(
            "charge.refunded",
            json!({ "id": "ch_1", "object": "charge", "payment_intent": "pi_T1", "amount": 500, "status": "succeeded" }),
        );
        api.process_event(&event).await.unwrap();
        let rows = api.ledger().active_payments("pi_T1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status.as_deref(), Some("refunded"));
        assert_eq!(rows[0].charge_id.as_deref(), Some("ch_1"));
        tear_down(api.ledger().db().clone()).await;
    }

    #[tokio::test]
    async fn unknown_and_malformed_events() {
        let api = api_with(MockProvider::new()).await;
        let ignored = api.process_event(&ProviderEvent::new("customer.updated", json!({ "id": "cus_1" }))).await;
        assert_eq!(ignored.unwrap(), DispatchOutcome::Ignored("customer.updated".into()));
        let malformed = api.process_event(&ProviderEvent::new("charge.refunded", json!({ "amount": 5 }))).await;
        assert!(matches!(malformed, Err(WebhookError::MalformedObject(_))));
        tear_down(api.ledger().db().clone()).await;
    }
}
