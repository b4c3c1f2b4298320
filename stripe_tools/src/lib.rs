mod api;
mod config;
mod error;
mod helpers;

mod data_objects;

pub use api::StripeApi;
pub use config::StripeConfig;
pub use data_objects::{StripeErrorBody, StripeErrorDetail};
pub use error::StripeApiError;
