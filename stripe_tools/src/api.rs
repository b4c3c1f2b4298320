use std::sync::Arc;

use log::*;
use payment_ledger::{PaymentProvider, ProviderError};
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    Client,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    config::StripeConfig,
    helpers::{api_error_from_response, expand_params},
    StripeApiError,
};

const REQUEST_ID_HEADER: &str = "request-id";

/// A thin, read-only client for the Stripe REST API.
///
/// A client built without a secret key is still usable: every call fails with [`StripeApiError::NotConfigured`]
/// instead of going out on the wire.
#[derive(Clone)]
pub struct StripeApi {
    config: StripeConfig,
    client: Arc<Client>,
}

impl StripeApi {
    pub fn new(config: StripeConfig) -> Result<Self, StripeApiError> {
        let mut headers = HeaderMap::with_capacity(2);
        if config.secret_key.is_set() {
            let mut val = HeaderValue::from_str(&format!("Bearer {}", config.secret_key.reveal()))
                .map_err(|e| StripeApiError::Initialization(e.to_string()))?;
            val.set_sensitive(true);
            headers.insert(AUTHORIZATION, val);
        }
        headers.insert("Accept", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| StripeApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub fn is_configured(&self) -> bool {
        self.config.secret_key.is_set()
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/v1{path}", self.config.api_url)
    }

    pub async fn rest_query<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, StripeApiError> {
        if !self.is_configured() {
            return Err(StripeApiError::NotConfigured);
        }
        let url = self.url(path);
        trace!("Sending REST query: {url}");
        let mut req = self.client.get(url);
        if !params.is_empty() {
            req = req.query(params);
        }
        let response = req.send().await.map_err(|e| StripeApiError::RestRequestError(e.to_string()))?;
        if response.status().is_success() {
            trace!("REST query successful. {}", response.status());
            response.json::<T>().await.map_err(|e| StripeApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let request_id =
                response.headers().get(REQUEST_ID_HEADER).and_then(|v| v.to_str().ok()).map(String::from);
            let body = response.text().await.map_err(|e| StripeApiError::RestRequestError(e.to_string()))?;
            Err(StripeApiError::QueryError(api_error_from_response(status, request_id, &body)))
        }
    }

    pub async fn get_invoice(&self, invoice_id: &str, expand: &[&str]) -> Result<Value, StripeApiError> {
        let path = format!("/invoices/{invoice_id}");
        debug!("Fetching invoice {invoice_id}");
        let invoice = self.rest_query::<Value>(&path, &expand_params(expand)).await?;
        trace!("Fetched invoice {invoice_id}");
        Ok(invoice)
    }

    pub async fn get_payment_intent(&self, payment_intent_id: &str) -> Result<Value, StripeApiError> {
        let path = format!("/payment_intents/{payment_intent_id}");
        debug!("Fetching payment intent {payment_intent_id}");
        self.rest_query::<Value>(&path, &[]).await
    }

    pub async fn get_customer(&self, customer_id: &str) -> Result<Value, StripeApiError> {
        let path = format!("/customers/{customer_id}");
        debug!("Fetching customer {customer_id}");
        self.rest_query::<Value>(&path, &[]).await
    }
}

impl PaymentProvider for StripeApi {
    async fn fetch_invoice(&self, invoice_id: &str, expand: &[&str]) -> Result<Value, ProviderError> {
        Ok(self.get_invoice(invoice_id, expand).await?)
    }

    async fn fetch_payment_intent(&self, payment_intent_id: &str) -> Result<Value, ProviderError> {
        Ok(self.get_payment_intent(payment_intent_id).await?)
    }

    async fn fetch_customer(&self, customer_id: &str) -> Result<Value, ProviderError> {
        Ok(self.get_customer(customer_id).await?)
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use ledger_common::Secret;

    use super::*;

    fn config(key: &str) -> StripeConfig {
        StripeConfig {
            secret_key: Secret::new(key.to_string()),
            api_url: "http://127.0.0.1:1".to_string(),
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn urls() {
        let api = StripeApi::new(config("sk_test_123")).unwrap();
        assert!(api.is_configured());
        assert_eq!(api.url("/invoices/in_1"), "http://127.0.0.1:1/v1/invoices/in_1");
    }

    #[tokio::test]
    async fn unconfigured_client_never_calls_out() {
        let api = StripeApi::new(config("")).unwrap();
        assert!(!api.is_configured());
        let err = api.fetch_invoice("in_1", &["payment_intent"]).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
        assert_eq!(err.request_id(), None);
    }

    #[tokio::test]
    async fn unreachable_api_is_a_request_failure() {
        let api = StripeApi::new(config("sk_test_123")).unwrap();
        let err = api.fetch_customer("cus_1").await.unwrap_err();
        assert!(matches!(err, ProviderError::RequestFailed(_)));
    }
}
