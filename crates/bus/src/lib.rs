pub mod broker;
pub mod consumer;
pub mod envelope;
pub mod error;
pub mod memory;
pub mod message;
pub mod rpc;

pub use broker::{Broker, BrokerExt, ReplyQueue, Subscription, dead_letter_queue};
pub use consumer::{
    Classify, ConsumerOptions, DEFAULT_MAX_DELIVERIES, Disposition, MessageHandler, run_consumer,
};
pub use error::{BusError, Result};
pub use memory::InMemoryBroker;
pub use message::{Acker, Delivery, MessageProperties, Outbound, Settlement};
pub use rpc::RpcClient;
