//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! Since each worker thread processes its requests sequentially, handlers must never block the current thread. Any
//! I/O (database writes, provider lookups) is expressed as futures, so that a worker can serve other requests while
//! one webhook waits on the ledger.
use actix_web::{get, web, HttpResponse, Responder};
use log::*;
use payment_ledger::{
    webhook_objects::ProviderEvent,
    PaymentLedgerDatabase,
    PaymentProvider,
    SubscriptionManagement,
    WebhookApi,
};

use crate::{data_objects::WebhookReceipt, errors::ServerError};

/// The storage a webhook handler needs: payment upserts and subscription transitions.
pub trait WebhookBackend: PaymentLedgerDatabase + SubscriptionManagement {}

impl<T> WebhookBackend for T where T: PaymentLedgerDatabase + SubscriptionManagement {}

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Stripe  ----------------------------------------------------
route!(stripe_webhook => Post "/webhook" impl WebhookBackend, PaymentProvider);
/// Route handler for Stripe webhooks.
///
/// The signature has already been checked by the time this handler runs. A body that is not a Stripe event is
/// rejected, but once an event has been parsed it is always acknowledged: Stripe retries on anything but a 2xx, and
/// a failed write is repaired by reconciliation rather than by redelivery.
pub async fn stripe_webhook<B, P>(
    body: web::Bytes,
    api: web::Data<WebhookApi<B, P>>,
) -> Result<HttpResponse, ServerError>
where
    B: WebhookBackend,
    P: PaymentProvider,
{
    trace!("🪝️ Received Stripe webhook");
    let event = serde_json::from_slice::<ProviderEvent>(body.as_ref()).map_err(|e| {
        warn!("🪝️ Could not deserialize webhook payload. {e}");
        ServerError::CouldNotDeserializePayload(e.to_string())
    })?;
    info!("🪝️ Stripe webhook received: {event}");
    match api.process_event(&event).await {
        Ok(outcome) => debug!("🪝️ {event} handled. {outcome:?}"),
        Err(e) => error!("🪝️ Error processing webhook event {event}. {e}"),
    }
    Ok(HttpResponse::Ok().json(WebhookReceipt::received()))
}
