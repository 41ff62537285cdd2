//! Long-lived consumer loop with the redelivery and dead-letter policy.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{FutureExt, StreamExt};
use tokio::sync::watch;

use crate::{Delivery, Result, Settlement, broker::Broker};

/// Default number of deliveries before a failing message is dead-lettered.
pub const DEFAULT_MAX_DELIVERIES: u32 = 5;

/// How the consumer loop should treat a handler error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The message was understood but refused; redelivery would not help.
    Discard,
    /// The message is unreadable and must never be redelivered.
    DeadLetter,
    /// Transient failure; redeliver until the delivery limit is reached.
    Retry,
}

/// Classifies handler errors for the consumer loop.
pub trait Classify {
    fn disposition(&self) -> Disposition;
}

/// A handler for messages arriving on one queue.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    type Error: std::error::Error + Classify + Send + Sync;

    /// Returns the name of this handler, used in logs.
    fn name(&self) -> &'static str;

    /// Handles a single delivery. The consumer loop settles it afterwards.
    async fn handle(&self, delivery: &Delivery) -> std::result::Result<(), Self::Error>;
}

/// Options for a consumer loop.
#[derive(Debug, Clone, Copy)]
pub struct ConsumerOptions {
    /// Deliveries allowed before a retryable failure is dead-lettered.
    pub max_deliveries: u32,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            max_deliveries: DEFAULT_MAX_DELIVERIES,
        }
    }
}

/// Maps a handler outcome to a broker settlement.
pub fn settlement_for(
    outcome: Option<Disposition>,
    delivery_count: u32,
    max_deliveries: u32,
) -> Settlement {
    match outcome {
        None | Some(Disposition::Discard) => Settlement::Ack,
        Some(Disposition::DeadLetter) => Settlement::Reject,
        Some(Disposition::Retry) if delivery_count < max_deliveries => {
            Settlement::Nack { requeue: true }
        }
        Some(Disposition::Retry) => Settlement::Reject,
    }
}

/// Consumes a queue until shutdown is signalled or the queue goes away.
///
/// On shutdown the loop stops taking new deliveries; a delivery already
/// being handled is finished and settled before returning. A handler panic
/// is treated as a retryable failure of that delivery.
#[tracing::instrument(skip(broker, handler, options, shutdown), fields(handler = handler.name()))]
pub async fn run_consumer<H: MessageHandler>(
    broker: Arc<dyn Broker>,
    queue: String,
    handler: Arc<H>,
    options: ConsumerOptions,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let mut subscription = broker.subscribe(&queue).await?;
    tracing::info!("consumer started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let delivery = tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            next = subscription.next() => match next {
                Some(delivery) => delivery,
                None => {
                    tracing::info!("queue closed");
                    break;
                }
            },
        };

        process(handler.as_ref(), delivery, options).await?;
    }

    tracing::info!("consumer stopped");
    Ok(())
}

async fn process<H: MessageHandler>(
    handler: &H,
    delivery: Delivery,
    options: ConsumerOptions,
) -> Result<()> {
    let handled = AssertUnwindSafe(handler.handle(&delivery))
        .catch_unwind()
        .await;
    let outcome = match handled {
        Ok(Ok(())) => None,
        Err(panic) => {
            tracing::error!(
                panic = panic_message(panic.as_ref()),
                delivery_count = delivery.delivery_count,
                "message handler panicked"
            );
            metrics::counter!("bus_handler_panics_total", "queue" => delivery.queue.clone())
                .increment(1);
            Some(Disposition::Retry)
        }
        Ok(Err(e)) => {
            let disposition = e.disposition();
            match disposition {
                Disposition::Discard => {
                    tracing::warn!(error = %e, "message refused; acknowledging")
                }
                Disposition::DeadLetter => {
                    tracing::warn!(error = %e, "malformed message; dead-lettering")
                }
                Disposition::Retry => tracing::error!(
                    error = %e,
                    delivery_count = delivery.delivery_count,
                    "message handling failed"
                ),
            }
            Some(disposition)
        }
    };

    let settlement = settlement_for(outcome, delivery.delivery_count, options.max_deliveries);
    metrics::counter!("bus_messages_consumed_total", "queue" => delivery.queue.clone())
        .increment(1);
    delivery.settle(settlement).await
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
