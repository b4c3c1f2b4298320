//! Identifier extraction from raw Stripe objects.
//!
//! Stripe reports the same transaction through several object shapes (payment intents, charges, invoices), each of
//! which references the others in slightly different ways. The functions here map any of those shapes onto a single
//! [`PaymentIds`] tuple. They never fail: anything unrecognised simply yields empty identifiers.
use serde_json::Value;

use crate::db_types::PaymentIds;

/// The object shapes the extractor knows about. Stripe names the shape in the `object` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    PaymentIntent,
    Charge,
    Invoice,
}

impl ObjectKind {
    pub fn of(obj: &Value) -> Option<Self> {
        match obj.get("object").and_then(Value::as_str) {
            Some("payment_intent") => Some(Self::PaymentIntent),
            Some("charge") => Some(Self::Charge),
            Some("invoice") => Some(Self::Invoice),
            _ => None,
        }
    }
}

/// Strips the `{ "data": { "object": ... } }` event wrapper, if present.
pub fn unwrap_event_object(raw: &Value) -> &Value {
    match raw.get("data").and_then(|d| d.get("object")) {
        Some(inner) if !inner.is_null() => inner,
        _ => raw,
    }
}

/// Extract the payment identifiers from a raw provider object, using its `object` discriminant to decide the shape.
pub fn extract_payment_ids(raw: &Value) -> PaymentIds {
    let obj = unwrap_event_object(raw);
    match ObjectKind::of(obj) {
        Some(kind) => extract_as(obj, kind),
        None if obj.get("payment_intent").map(|v| !v.is_null()).unwrap_or(false) => PaymentIds::new(
            id_of(obj.get("payment_intent")),
            id_of(obj.get("charge")),
            id_of(obj.get("invoice")),
        ),
        None => PaymentIds::default(),
    }
}

/// Like [`extract_payment_ids`], but if the object carries no recognised discriminant, it is treated as `fallback`.
///
/// Webhook handlers know which shape an event type delivers, so they use this to cope with payloads that omit the
/// `object` field.
pub fn extract_payment_ids_or(raw: &Value, fallback: ObjectKind) -> PaymentIds {
    let obj = unwrap_event_object(raw);
    let kind = ObjectKind::of(obj).unwrap_or(fallback);
    extract_as(obj, kind)
}

fn extract_as(obj: &Value, kind: ObjectKind) -> PaymentIds {
    match kind {
        ObjectKind::PaymentIntent => {
            PaymentIds::new(json_str(obj, "id"), first_charge_id(obj), id_of(obj.get("invoice")))
        },
        ObjectKind::Charge => {
            PaymentIds::new(id_of(obj.get("payment_intent")), json_str(obj, "id"), id_of(obj.get("invoice")))
        },
        ObjectKind::Invoice => {
            PaymentIds::new(id_of(obj.get("payment_intent")), id_of(obj.get("charge")), json_str(obj, "id"))
        },
    }
}

/// Stripe references other objects either by bare id, or (when expanded) by embedding the object itself.
/// Returns the id in both cases.
pub fn id_of(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) => map.get("id").and_then(Value::as_str).filter(|s| !s.is_empty()).map(String::from),
        _ => None,
    }
}

/// The id of the first charge embedded in a payment intent's `charges` list.
pub fn first_charge_id(payment_intent: &Value) -> Option<String> {
    first_charge(payment_intent).and_then(|c| json_str(c, "id"))
}

/// The first embedded charge, falling back to the `latest_charge` reference.
pub fn charge_id_for_payment_intent(payment_intent: &Value) -> Option<String> {
    first_charge_id(payment_intent).or_else(|| id_of(payment_intent.get("latest_charge")))
}

pub fn first_charge(payment_intent: &Value) -> Option<&Value> {
    payment_intent.get("charges").and_then(|c| c.get("data")).and_then(Value::as_array).and_then(|a| a.first())
}

/// A non-empty string field of a JSON object.
pub fn json_str(obj: &Value, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).filter(|s| !s.is_empty()).map(String::from)
}

pub fn json_i64(obj: &Value, key: &str) -> Option<i64> {
    obj.get(key).and_then(Value::as_i64)
}

/// A string entry in the object's `metadata` map.
pub fn metadata_str(obj: &Value, key: &str) -> Option<String> {
    obj.get("metadata").and_then(|m| json_str(m, key))
}
