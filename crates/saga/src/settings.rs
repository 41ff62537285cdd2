//! Plain settings handed to the services at construction time.

use std::time::Duration;

use bus::DEFAULT_MAX_DELIVERIES;

/// Names of the inbound queue of each service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueNames {
    pub order: String,
    pub payment: String,
    pub staff: String,
    pub notification: String,
}

impl Default for QueueNames {
    fn default() -> Self {
        Self {
            order: "order_queue".to_string(),
            payment: "payment_queue".to_string(),
            staff: "staff_queue".to_string(),
            notification: "notification_queue".to_string(),
        }
    }
}

impl QueueNames {
    pub fn all(&self) -> [&str; 4] {
        [&self.order, &self.payment, &self.staff, &self.notification]
    }
}

/// Settings for building and awaiting payment requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSettings {
    /// How long order placement waits for the payment link.
    pub rpc_timeout: Duration,
    pub notify_url: String,
    pub currency_code: String,
    pub default_customer_ip: String,
    pub default_phone: String,
    pub default_language: String,
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self {
            rpc_timeout: Duration::from_secs(30),
            notify_url: "http://localhost:3000/payments/notify".to_string(),
            currency_code: "PLN".to_string(),
            default_customer_ip: "127.0.0.1".to_string(),
            default_phone: "000000000".to_string(),
            default_language: "pl".to_string(),
        }
    }
}

/// Everything the saga runtime needs besides its collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SagaSettings {
    pub queues: QueueNames,
    pub payment: PaymentSettings,
    /// Deliveries allowed before a failing message is dead-lettered.
    pub max_deliveries: u32,
    /// Recipient for status changes that carry no guest email.
    pub default_notification_email: Option<String>,
}

impl Default for SagaSettings {
    fn default() -> Self {
        Self {
            queues: QueueNames::default(),
            payment: PaymentSettings::default(),
            max_deliveries: DEFAULT_MAX_DELIVERIES,
            default_notification_email: None,
        }
    }
}
