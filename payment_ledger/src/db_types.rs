use std::fmt::Display;

use chrono::{DateTime, Utc};
use ledger_common::{Cents, DEFAULT_CURRENCY};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{types::Json, FromRow, Type};

//--------------------------------------     PaymentIds      ---------------------------------------------------------
/// The provider identifiers that can refer to a single real-world transaction.
///
/// `canonical_id` is always derived from the other three, in priority order: payment intent, charge, invoice. The
/// payment intent is the most stable identity across the invoice, charge and subscription lifecycle, which is why it
/// wins when present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIds {
    pub payment_intent_id: Option<String>,
    pub charge_id: Option<String>,
    pub invoice_id: Option<String>,
    pub canonical_id: Option<String>,
}

impl PaymentIds {
    pub fn new(payment_intent_id: Option<String>, charge_id: Option<String>, invoice_id: Option<String>) -> Self {
        let canonical_id = payment_intent_id.clone().or_else(|| charge_id.clone()).or_else(|| invoice_id.clone());
        Self { payment_intent_id, charge_id, invoice_id, canonical_id }
    }

    /// True if there is nothing to identify a transaction with.
    pub fn is_empty(&self) -> bool {
        self.payment_intent_id.is_none() && self.charge_id.is_none() && self.invoice_id.is_none()
    }

    /// Fills in the charge id if it is missing, recalculating the canonical id.
    pub fn or_charge_id(self, charge_id: Option<String>) -> Self {
        let Self { payment_intent_id, charge_id: existing, invoice_id, .. } = self;
        Self::new(payment_intent_id, existing.or(charge_id), invoice_id)
    }
}

impl Display for PaymentIds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let show = |v: &Option<String>| v.as_deref().unwrap_or("-").to_string();
        write!(
            f,
            "canonical: {}, payment_intent: {}, charge: {}, invoice: {}",
            show(&self.canonical_id),
            show(&self.payment_intent_id),
            show(&self.charge_id),
            show(&self.invoice_id)
        )
    }
}

//--------------------------------------   PaymentFields     ---------------------------------------------------------
/// The transaction fields carried by a webhook event or reconciliation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentFields {
    pub user_id: Option<String>,
    pub amount: Cents,
    pub currency: String,
    pub status: Option<String>,
    pub payment_method: Option<String>,
    pub receipt_email: Option<String>,
    pub description: Option<String>,
    pub metadata: Option<Value>,
    pub raw_event: Option<Value>,
}

impl Default for PaymentFields {
    fn default() -> Self {
        Self {
            user_id: None,
            amount: Cents::default(),
            currency: DEFAULT_CURRENCY.to_string(),
            status: None,
            payment_method: None,
            receipt_email: None,
            description: None,
            metadata: None,
            raw_event: None,
        }
    }
}

impl PaymentFields {
    pub fn new<S: Into<String>>(amount: Cents, currency: S) -> Self {
        Self { amount, currency: currency.into(), ..Default::default() }
    }

    pub fn with_user_id<S: Into<String>>(mut self, user_id: Option<S>) -> Self {
        self.user_id = user_id.map(Into::into);
        self
    }

    pub fn with_status<S: Into<String>>(mut self, status: S) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_payment_method(mut self, payment_method: Option<String>) -> Self {
        self.payment_method = payment_method;
        self
    }

    pub fn with_receipt_email(mut self, receipt_email: Option<String>) -> Self {
        self.receipt_email = receipt_email;
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn with_metadata(mut self, metadata: Option<Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_raw_event(mut self, raw_event: Value) -> Self {
        self.raw_event = Some(raw_event);
        self
    }
}

//--------------------------------------   PaymentRecord     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct PaymentRecord {
    pub id: i64,
    pub canonical_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub charge_id: Option<String>,
    pub invoice_id: Option<String>,
    pub user_id: Option<String>,
    pub amount: Cents,
    pub currency: String,
    pub status: Option<String>,
    pub payment_method: Option<String>,
    pub receipt_email: Option<String>,
    pub description: Option<String>,
    pub metadata: Option<Json<Value>>,
    pub raw_event: Option<Json<Value>>,
    pub merged_into_id: Option<i64>,
    pub merged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentRecord {
    /// A record that has been absorbed into another one is inactive. It is kept for audit purposes only.
    pub fn is_active(&self) -> bool {
        self.merged_into_id.is_none()
    }

    pub fn ids(&self) -> PaymentIds {
        PaymentIds {
            payment_intent_id: self.payment_intent_id.clone(),
            charge_id: self.charge_id.clone(),
            invoice_id: self.invoice_id.clone(),
            canonical_id: self.canonical_id.clone(),
        }
    }
}

impl Display for PaymentRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Payment #{} [{}] {} {} ({})",
            self.id,
            self.canonical_id.as_deref().unwrap_or("unresolved"),
            self.amount,
            self.currency,
            self.status.as_deref().unwrap_or("no status")
        )
    }
}

//-------------------------------------- SubscriptionStatus  ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    /// The user has started checkout for a plan, but the provider has not confirmed it yet.
    Pending,
    /// The provider has confirmed the subscription.
    Active,
    /// Managed by the rest of the application. Never set here.
    Canceled,
}

impl Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscriptionStatus::Pending => write!(f, "pending"),
            SubscriptionStatus::Active => write!(f, "active"),
            SubscriptionStatus::Canceled => write!(f, "canceled"),
        }
    }
}

//-------------------------------------- SubscriptionRecord  ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct SubscriptionRecord {
    pub id: i64,
    pub user_id: String,
    pub plan_key: String,
    pub stripe_subscription_id: Option<String>,
    pub status: SubscriptionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// How a subscription activation treats the provider subscription id already stored on the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionLink {
    /// Only write the provider subscription id if the row does not have one yet.
    FillMissing,
    /// Always write the provider subscription id.
    Replace,
}
