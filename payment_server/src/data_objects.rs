use serde::{Deserialize, Serialize};

/// The body of every acknowledged webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookReceipt {
    pub received: bool,
}

impl WebhookReceipt {
    pub fn received() -> Self {
        Self { received: true }
    }
}
