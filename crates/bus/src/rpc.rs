//! Request/response over queues.
//!
//! An [`RpcClient`] owns one exclusive reply queue and a single background
//! task consuming it. Each call registers a oneshot sender in a table keyed
//! by correlation id; the background task resolves the matching sender when
//! a reply arrives. Entries are removed on every exit path of a call, so a
//! reply arriving after a timeout finds nothing and is dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use common::CorrelationId;
use futures_util::StreamExt;
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::{
    BusError, Outbound, Result,
    broker::{Broker, ReplyQueue},
    envelope,
};

type PendingTable = Arc<Mutex<HashMap<CorrelationId, oneshot::Sender<Vec<u8>>>>>;

fn lock(pending: &PendingTable) -> MutexGuard<'_, HashMap<CorrelationId, oneshot::Sender<Vec<u8>>>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes a pending entry when the call completes, fails, times out or is cancelled.
struct PendingGuard<'a> {
    pending: &'a PendingTable,
    correlation_id: CorrelationId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock(self.pending).remove(&self.correlation_id);
    }
}

/// Client for RPC-style calls over the message bus.
pub struct RpcClient {
    broker: Arc<dyn Broker>,
    reply_to: String,
    pending: PendingTable,
    reply_queue: Mutex<Option<ReplyQueue>>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl RpcClient {
    /// Declares the reply queue and starts the reply consumer.
    pub async fn start(broker: Arc<dyn Broker>) -> Result<Self> {
        let reply_queue = broker.declare_reply_queue().await?;
        let reply_to = reply_queue.name().to_string();
        let mut subscription = broker.subscribe(&reply_to).await?;
        let pending: PendingTable = Arc::default();

        let table = pending.clone();
        let consumer = tokio::spawn(async move {
            while let Some(delivery) = subscription.next().await {
                let sender = delivery
                    .properties
                    .correlation_id
                    .and_then(|id| lock(&table).remove(&id));
                match sender {
                    Some(sender) => {
                        let _ = sender.send(delivery.body.clone());
                    }
                    None => tracing::debug!(
                        correlation_id = ?delivery.properties.correlation_id,
                        "discarding reply with no pending call"
                    ),
                }
                if let Err(e) = delivery.ack().await {
                    tracing::warn!(error = %e, "failed to ack reply");
                }
            }
            tracing::debug!("reply consumer stopped");
        });

        tracing::info!(reply_to = %reply_to, "rpc client started");

        Ok(Self {
            broker,
            reply_to,
            pending,
            reply_queue: Mutex::new(Some(reply_queue)),
            consumer: Mutex::new(Some(consumer)),
        })
    }

    /// Returns the name of the reply queue.
    pub fn reply_to(&self) -> &str {
        &self.reply_to
    }

    /// Returns the number of calls currently awaiting a reply.
    pub fn pending_calls(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Publishes a raw request and waits for the correlated reply body.
    #[tracing::instrument(skip(self, body), fields(correlation_id = tracing::field::Empty))]
    pub async fn call_raw(&self, queue: &str, body: Vec<u8>, timeout: Duration) -> Result<Vec<u8>> {
        let correlation_id = CorrelationId::new();
        tracing::Span::current().record("correlation_id", tracing::field::display(correlation_id));

        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(correlation_id, tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            correlation_id,
        };

        let outbound = Outbound::new(body)
            .with_correlation_id(correlation_id)
            .with_reply_to(self.reply_to.clone());
        self.broker.publish(queue, outbound).await?;

        let start = Instant::now();
        let reply = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => return Err(BusError::RpcClosed),
            Err(_) => {
                tracing::warn!(?timeout, "rpc call timed out");
                return Err(BusError::RpcTimeout {
                    queue: queue.to_string(),
                    timeout,
                });
            }
        };
        tracing::debug!(elapsed_ms = start.elapsed().as_millis() as u64, "rpc reply received");
        Ok(reply)
    }

    /// Sends a tagged message and decodes the tagged reply.
    pub async fn call<Req, Resp>(&self, queue: &str, request: &Req, timeout: Duration) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let body = envelope::encode(request)?;
        let reply = self.call_raw(queue, body, timeout).await?;
        envelope::decode(&reply)
    }

    /// Releases the reply queue and stops the reply consumer.
    ///
    /// Calls still in flight fail with `RpcClosed`.
    pub async fn shutdown(&self) {
        let reply_queue = self
            .reply_queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(reply_queue);
        lock(&self.pending).clear();

        let consumer = self
            .consumer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(consumer) = consumer
            && let Err(e) = consumer.await
        {
            tracing::warn!(error = %e, "reply consumer panicked");
        }
        tracing::info!(reply_to = %self.reply_to, "rpc client shut down");
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        if let Some(consumer) = self
            .consumer
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            consumer.abort();
        }
    }
}
