use std::fmt::Display;

use serde_json::Value;
use thiserror::Error;

/// Read-only access to the payment provider's API.
///
/// The ledger only ever reads from the provider, to fill in links that webhook payloads left out. Objects are returned
/// as raw JSON so that the identifier extractor can treat them exactly like webhook payloads.
#[allow(async_fn_in_trait)]
pub trait PaymentProvider {
    /// Retrieves an invoice. `expand` lists the provider's expansion paths, e.g. `payment_intent` or `lines.data`.
    async fn fetch_invoice(&self, invoice_id: &str, expand: &[&str]) -> Result<Value, ProviderError>;

    async fn fetch_payment_intent(&self, payment_intent_id: &str) -> Result<Value, ProviderError>;

    async fn fetch_customer(&self, customer_id: &str) -> Result<Value, ProviderError>;
}

/// Details the provider attaches to a failed API call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderApiError {
    pub status: u16,
    pub error_type: Option<String>,
    pub code: Option<String>,
    pub request_id: Option<String>,
    pub message: String,
}

impl Display for ProviderApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HTTP {}", self.status)?;
        if let Some(t) = &self.error_type {
            write!(f, " {t}")?;
        }
        if let Some(c) = &self.code {
            write!(f, " ({c})")?;
        }
        write!(f, ": {}", self.message)?;
        if let Some(r) = &self.request_id {
            write!(f, " [request {r}]")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("The payment provider client is not configured. {0}")]
    NotConfigured(String),
    #[error("Could not reach the payment provider. {0}")]
    RequestFailed(String),
    #[error("The payment provider rejected the request. {0}")]
    ApiError(ProviderApiError),
    #[error("The payment provider returned an unexpected response. {0}")]
    InvalidResponse(String),
    #[error("The payment provider has no object with id {0}")]
    NotFound(String),
}

impl ProviderError {
    /// The provider's request id, if the provider produced one. Operators need this to look a failure up on the
    /// provider's dashboard.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            ProviderError::ApiError(e) => e.request_id.as_deref(),
            _ => None,
        }
    }
}
