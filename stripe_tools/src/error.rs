use payment_ledger::{traits::ProviderApiError, ProviderError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StripeApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("No Stripe secret key has been configured")]
    NotConfigured,
    #[error("Invalid REST request: {0}")]
    RestRequestError(String),
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Query failed. {0}")]
    QueryError(ProviderApiError),
}

impl From<StripeApiError> for ProviderError {
    fn from(e: StripeApiError) -> Self {
        match e {
            StripeApiError::Initialization(s) => ProviderError::NotConfigured(s),
            StripeApiError::NotConfigured => ProviderError::NotConfigured("No Stripe secret key".into()),
            StripeApiError::RestRequestError(s) => ProviderError::RequestFailed(s),
            StripeApiError::JsonError(s) => ProviderError::InvalidResponse(s),
            StripeApiError::QueryError(e) => ProviderError::ApiError(e),
        }
    }
}
