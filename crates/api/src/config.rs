//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use saga::{PaymentSettings, QueueNames, SagaSettings};

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`, `RUST_LOG`: bind address, listen port, tracing filter
/// - `ORDER_QUEUE`, `PAYMENT_QUEUE`, `STAFF_QUEUE`, `NOTIFICATION_QUEUE`
/// - `PAYMENT_RPC_TIMEOUT_SECS` (default: `30`), `MAX_DELIVERIES` (default: `5`)
/// - `PAYMENT_NOTIFY_URL`, `PAYMENT_CURRENCY`, `DEFAULT_CUSTOMER_IP`,
///   `DEFAULT_PHONE_NUMBER`, `DEFAULT_LANGUAGE`
/// - `DEFAULT_NOTIFICATION_EMAIL`: recipient when a status change has no guest email
/// - `DATABASE_URL`: when set, orders and payments are kept in PostgreSQL
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub queues: QueueNames,
    pub payment: PaymentSettings,
    pub max_deliveries: u32,
    pub default_notification_email: Option<String>,
    pub database_url: Option<String>,
}

fn var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn var_or(key: &str, default: &str) -> String {
    var(key).unwrap_or_else(|| default.to_string())
}

fn parsed_or<T: FromStr>(key: &str, default: T) -> T {
    var(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let queues = QueueNames {
            order: var_or("ORDER_QUEUE", &defaults.queues.order),
            payment: var_or("PAYMENT_QUEUE", &defaults.queues.payment),
            staff: var_or("STAFF_QUEUE", &defaults.queues.staff),
            notification: var_or("NOTIFICATION_QUEUE", &defaults.queues.notification),
        };
        let payment = PaymentSettings {
            rpc_timeout: Duration::from_secs(parsed_or(
                "PAYMENT_RPC_TIMEOUT_SECS",
                defaults.payment.rpc_timeout.as_secs(),
            )),
            notify_url: var_or("PAYMENT_NOTIFY_URL", &defaults.payment.notify_url),
            currency_code: var_or("PAYMENT_CURRENCY", &defaults.payment.currency_code),
            default_customer_ip: var_or(
                "DEFAULT_CUSTOMER_IP",
                &defaults.payment.default_customer_ip,
            ),
            default_phone: var_or("DEFAULT_PHONE_NUMBER", &defaults.payment.default_phone),
            default_language: var_or("DEFAULT_LANGUAGE", &defaults.payment.default_language),
        };

        Self {
            host: var_or("HOST", &defaults.host),
            port: parsed_or("PORT", defaults.port),
            log_level: var_or("RUST_LOG", &defaults.log_level),
            queues,
            payment,
            max_deliveries: parsed_or("MAX_DELIVERIES", defaults.max_deliveries),
            default_notification_email: var("DEFAULT_NOTIFICATION_EMAIL"),
            database_url: var("DATABASE_URL"),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Settings handed to the saga runtime.
    pub fn saga_settings(&self) -> SagaSettings {
        SagaSettings {
            queues: self.queues.clone(),
            payment: self.payment.clone(),
            max_deliveries: self.max_deliveries,
            default_notification_email: self.default_notification_email.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let saga = SagaSettings::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            queues: saga.queues,
            payment: saga.payment,
            max_deliveries: saga.max_deliveries,
            default_notification_email: saga.default_notification_email,
            database_url: None,
        }
    }
}
