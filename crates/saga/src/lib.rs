//! Order lifecycle saga across the restaurant services.
//!
//! This crate provides:
//! - The order service, which owns the canonical order and obtains payment
//!   links through a request/reply call bounded by a timeout
//! - The payment service, which talks to the gateway, runs compensations and
//!   accepts gateway notifications
//! - The staff and notification consumers fed by the status fan-out
//! - [`SagaRuntime`], which declares the queues and runs one consumer each
//!
//! There is no central saga log. Each service keeps its own state and the
//! services converge through at-least-once status events.

pub mod error;
pub mod fanout;
pub mod gateway;
pub mod messages;
pub mod notification;
pub mod orchestrator;
pub mod order_service;
pub mod payload;
pub mod payment_service;
pub mod runtime;
pub mod settings;
pub mod staff;

pub use error::{Result, SagaError};
pub use fanout::{Origin, StatusFanout};
pub use gateway::{GatewayError, GatewayOrder, InMemoryPaymentGateway, PaymentGateway, RefundDetails};
pub use messages::{
    Buyer, CompensationRequest, CreatePaymentRequest, PaymentFailed, PaymentLink, Product,
    ServiceMessage, StatusChanged,
};
pub use notification::NotificationHandler;
pub use orchestrator::PaymentOrchestrator;
pub use order_service::{Checkout, OrderQueueHandler, OrderService, PlacedOrder, status_event};
pub use payload::{BuyerDetails, build_payment_request};
pub use payment_service::{
    GatewayNotification, NotifiedOrder, PaymentQueueHandler, PaymentService, WebhookOutcome,
};
pub use runtime::{Collaborators, SagaRuntime};
pub use settings::{PaymentSettings, QueueNames, SagaSettings};
pub use staff::{StaffQueueHandler, StaffService};
