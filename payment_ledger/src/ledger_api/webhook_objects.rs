use std::fmt::Display;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::traits::UpsertResult;

/// The envelope of a provider webhook event. Only the parts the ledger uses are modelled; the object itself stays raw.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventData {
    pub object: Value,
}

impl ProviderEvent {
    pub fn new<S: Into<String>>(event_type: S, object: Value) -> Self {
        Self { id: None, event_type: event_type.into(), data: EventData { object } }
    }

    pub fn with_id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn kind(&self) -> EventKind {
        EventKind::from(self.event_type.as_str())
    }

    pub fn object(&self) -> &Value {
        &self.data.object
    }
}

impl Display for ProviderEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.event_type, self.id.as_deref().unwrap_or("no id"))
    }
}

/// The event types the ledger acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    PaymentIntentSucceeded,
    /// Both `invoice.paid` and `invoice.payment_succeeded`.
    InvoicePaid,
    ChargeSucceeded,
    ChargeRefunded,
    SubscriptionCreated,
    Other,
}

impl From<&str> for EventKind {
    fn from(event_type: &str) -> Self {
        match event_type {
            "payment_intent.succeeded" => EventKind::PaymentIntentSucceeded,
            "invoice.paid" | "invoice.payment_succeeded" => EventKind::InvoicePaid,
            "charge.succeeded" => EventKind::ChargeSucceeded,
            "charge.refunded" => EventKind::ChargeRefunded,
            "customer.subscription.created" => EventKind::SubscriptionCreated,
            _ => EventKind::Other,
        }
    }
}

/// What the dispatcher did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Payment(UpsertResult),
    Invoice { payment: UpsertResult, subscriptions_activated: u64 },
    Subscription { activated: u64 },
    /// The event type is not one the ledger acts on.
    Ignored(String),
}

impl Display for DispatchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchOutcome::Payment(r) => write!(f, "{r}"),
            DispatchOutcome::Invoice { payment, subscriptions_activated } => {
                write!(f, "{payment}, {subscriptions_activated} subscription(s) activated")
            },
            DispatchOutcome::Subscription { activated } => write!(f, "{activated} subscription(s) activated"),
            DispatchOutcome::Ignored(t) => write!(f, "{t} ignored"),
        }
    }
}
