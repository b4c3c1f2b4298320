use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("Payload deserialization error. {0}")]
    CouldNotDeserializePayload(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Webhook signature verification failed. {0}")]
    InvalidSignature(#[from] SignatureError),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::CouldNotDeserializePayload(_) => StatusCode::BAD_REQUEST,
            Self::InvalidSignature(_) => StatusCode::BAD_REQUEST,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

/// Reasons a `Stripe-Signature` header fails verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("No webhook secret has been configured")]
    NotConfigured,
    #[error("The webhook secret cannot be used as an HMAC key. {0}")]
    InvalidSecret(String),
    #[error("No Stripe-Signature header was provided")]
    MissingHeader,
    #[error("The Stripe-Signature header is malformed. {0}")]
    MalformedHeader(String),
    #[error("The signature timestamp is {age}s old, which is outside the tolerance")]
    StaleTimestamp { age: i64 },
    #[error("No signature in the header matches the payload")]
    NoMatchingSignature,
}
