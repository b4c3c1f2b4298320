use serde::{Deserialize, Serialize};

/// The envelope Stripe wraps around every error response.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StripeErrorBody {
    pub error: StripeErrorDetail,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StripeErrorDetail {
    #[serde(rename = "type")]
    pub error_type: Option<String>,
    pub code: Option<String>,
    pub message: Option<String>,
    pub param: Option<String>,
}
