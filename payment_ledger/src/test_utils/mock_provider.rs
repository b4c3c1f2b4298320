use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
        Mutex,
    },
};

use serde_json::Value;

use crate::traits::{PaymentProvider, ProviderApiError, ProviderError};

/// An in-memory payment provider. Objects are served by id; ids registered with [`MockProvider::fail_on`] produce an
/// API error instead.
#[derive(Clone, Default)]
pub struct MockProvider {
    objects: Arc<Mutex<HashMap<String, Value>>>,
    failures: Arc<Mutex<HashMap<String, ProviderApiError>>>,
    calls: Arc<AtomicUsize>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an object under its `id` field.
    pub fn with_object(self, obj: Value) -> Self {
        let id = obj["id"].as_str().expect("Mock objects need an id").to_string();
        self.objects.lock().unwrap().insert(id, obj);
        self
    }

    pub fn fail_on<S: Into<String>>(self, id: S, status: u16, request_id: &str) -> Self {
        let error = ProviderApiError {
            status,
            error_type: Some("api_error".into()),
            code: None,
            request_id: Some(request_id.into()),
            message: "Simulated provider failure".into(),
        };
        self.failures.lock().unwrap().insert(id.into(), error);
        self
    }

    /// The number of provider calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn get(&self, id: &str) -> Result<Value, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.failures.lock().unwrap().get(id) {
            return Err(ProviderError::ApiError(e.clone()));
        }
        self.objects.lock().unwrap().get(id).cloned().ok_or_else(|| ProviderError::NotFound(id.to_string()))
    }
}

impl PaymentProvider for MockProvider {
    /// Expansions are honoured for `payment_intent` only: a registered payment intent replaces the bare id.
    async fn fetch_invoice(&self, invoice_id: &str, expand: &[&str]) -> Result<Value, ProviderError> {
        let mut invoice = self.get(invoice_id)?;
        if expand.contains(&"payment_intent") {
            let pi_id = invoice.get("payment_intent").and_then(Value::as_str).map(String::from);
            if let Some(pi) = pi_id.and_then(|id| self.objects.lock().unwrap().get(&id).cloned()) {
                invoice["payment_intent"] = pi;
            }
        }
        Ok(invoice)
    }

    async fn fetch_payment_intent(&self, payment_intent_id: &str) -> Result<Value, ProviderError> {
        self.get(payment_intent_id)
    }

    async fn fetch_customer(&self, customer_id: &str) -> Result<Value, ProviderError> {
        self.get(customer_id)
    }
}
