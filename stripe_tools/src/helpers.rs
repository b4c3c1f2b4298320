use payment_ledger::traits::ProviderApiError;

use crate::StripeErrorBody;

/// Stripe expects one `expand[]` query parameter per expansion path.
pub fn expand_params<'a>(expand: &[&'a str]) -> Vec<(&'static str, &'a str)> {
    expand.iter().map(|path| ("expand[]", *path)).collect()
}

/// Builds the error for a failed call from the response status, the `Request-Id` header and the response body.
///
/// Bodies that are not Stripe error envelopes are kept verbatim as the message.
pub fn api_error_from_response(status: u16, request_id: Option<String>, body: &str) -> ProviderApiError {
    match serde_json::from_str::<StripeErrorBody>(body) {
        Ok(StripeErrorBody { error }) => ProviderApiError {
            status,
            error_type: error.error_type,
            code: error.code,
            request_id,
            message: error.message.unwrap_or_else(|| "No error message".to_string()),
        },
        Err(_) => ProviderApiError { status, error_type: None, code: None, request_id, message: body.to_string() },
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn expansions() {
        let params = expand_params(&["payment_intent", "lines.data"]);
        assert_eq!(params, vec![("expand[]", "payment_intent"), ("expand[]", "lines.data")]);
        assert!(expand_params(&[]).is_empty());
    }

    #[test]
    fn stripe_error_body() {
        let body = r#"{
          "error": {
            "code": "resource_missing",
            "doc_url": "https://stripe.com/docs/error-codes/resource-missing",
            "message": "No such invoice: 'in_123'",
            "param": "id",
            "type": "invalid_request_error"
          }
        }"#;
        let err = api_error_from_response(404, Some("req_abc".into()), body);
        assert_eq!(err.status, 404);
        assert_eq!(err.error_type.as_deref(), Some("invalid_request_error"));
        assert_eq!(err.code.as_deref(), Some("resource_missing"));
        assert_eq!(err.request_id.as_deref(), Some("req_abc"));
        assert_eq!(err.message, "No such invoice: 'in_123'");
        assert_eq!(
            err.to_string(),
            "HTTP 404 invalid_request_error (resource_missing): No such invoice: 'in_123' [request req_abc]"
        );
    }

    #[test]
    fn non_stripe_error_body() {
        let err = api_error_from_response(502, None, "Bad Gateway");
        assert_eq!(err.message, "Bad Gateway");
        assert_eq!(err.error_type, None);
        assert_eq!(err.request_id, None);
    }
}
