//! Stripe signature middleware for Actix Web.
//!
//! Stripe signs every webhook delivery with the endpoint's signing secret and sends the signature in the
//! `Stripe-Signature` header. This middleware buffers the raw body, checks the signature (see
//! [`crate::helpers::verify_signature`]) and only then hands the request on, with the body restored.
//!
//! Requests that fail the check are rejected with a 400 and a JSON error body. Wrap every Stripe webhook route with it.

use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_http::h1;
use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    web,
    Error,
};
use chrono::{Duration, Utc};
use futures::future::LocalBoxFuture;
use ledger_common::Secret;
use log::{trace, warn};

use crate::{
    errors::ServerError,
    helpers::{verify_signature, STRIPE_SIGNATURE_HEADER},
};

pub struct StripeSignatureMiddlewareFactory {
    secret: Secret<String>,
    tolerance: Duration,
}

impl StripeSignatureMiddlewareFactory {
    pub fn new(secret: Secret<String>, tolerance: Duration) -> Self {
        StripeSignatureMiddlewareFactory { secret, tolerance }
    }
}

impl<S, B> Transform<S, ServiceRequest> for StripeSignatureMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = StripeSignatureMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(StripeSignatureMiddlewareService {
            secret: self.secret.clone(),
            tolerance: self.tolerance,
            service: Rc::new(service),
        }))
    }
}

pub struct StripeSignatureMiddlewareService<S> {
    secret: Secret<String>,
    tolerance: Duration,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for StripeSignatureMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let secret = self.secret.clone();
        let tolerance = self.tolerance;
        Box::pin(async move {
            trace!("🔐️ Checking Stripe signature for request");
            let data = req.extract::<web::Bytes>().await.map_err(|e| {
                warn!("🔐️ Failed to extract request data: {e:?}");
                ServerError::InvalidRequestBody(e.to_string())
            })?;
            let header = req.headers().get(STRIPE_SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
            match verify_signature(&secret, header, data.as_ref(), tolerance, Utc::now()) {
                Ok(()) => {
                    trace!("🔐️ Stripe signature for request ✅️");
                    req.set_payload(bytes_to_payload(data));
                    service.call(req).await
                },
                Err(e) => {
                    warn!("🔐️ Rejecting webhook. {e}");
                    Err(ServerError::from(e).into())
                },
            }
        })
    }
}

fn bytes_to_payload(buf: web::Bytes) -> Payload {
    let (_, mut pl) = h1::Payload::create(true);
    pl.unread_data(buf);
    Payload::from(pl)
}
