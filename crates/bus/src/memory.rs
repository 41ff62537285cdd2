use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::{
    Acker, BusError, Delivery, MessageProperties, Outbound, Result, Settlement,
    broker::{Broker, ReplyQueue, Subscription, dead_letter_queue},
};

/// In-memory broker implementation for tests and single-process deployments.
///
/// Provides the same semantics the services rely on from a networked broker:
/// per-queue FIFO, ack/nack/reject settlement, redelivery of abandoned
/// messages with a delivery count, dead-letter routing, and exclusive reply
/// queues that disappear with their guard.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    queues: Mutex<HashMap<String, QueueState>>,
}

struct QueueState {
    ready: VecDeque<StoredMessage>,
    unacked: usize,
    dead_letter: Option<String>,
    notify: Arc<Notify>,
}

impl QueueState {
    fn new(dead_letter: Option<String>) -> Self {
        Self {
            ready: VecDeque::new(),
            unacked: 0,
            dead_letter,
            notify: Arc::new(Notify::new()),
        }
    }
}

#[derive(Clone)]
struct StoredMessage {
    body: Vec<u8>,
    properties: MessageProperties,
    delivery_count: u32,
}

impl Inner {
    fn queues(&self) -> MutexGuard<'_, HashMap<String, QueueState>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enqueue(&self, queue: &str, message: StoredMessage) -> Result<()> {
        let mut queues = self.queues();
        let state = queues
            .get_mut(queue)
            .ok_or_else(|| BusError::QueueNotFound(queue.to_string()))?;
        state.ready.push_back(message);
        state.notify.notify_one();
        Ok(())
    }

    fn delete(&self, queue: &str) {
        if let Some(state) = self.queues().remove(queue) {
            state.notify.notify_waiters();
        }
    }

    /// Pops the next ready message, or returns the queue's notifier to wait on.
    fn try_take(&self, queue: &str) -> Option<std::result::Result<StoredMessage, Arc<Notify>>> {
        let mut queues = self.queues();
        let state = queues.get_mut(queue)?;
        match state.ready.pop_front() {
            Some(mut message) => {
                message.delivery_count += 1;
                state.unacked += 1;
                Some(Ok(message))
            }
            None => Some(Err(state.notify.clone())),
        }
    }

    fn settle(&self, queue: &str, message: StoredMessage, settlement: Settlement) {
        let mut queues = self.queues();
        let Some(state) = queues.get_mut(queue) else {
            return;
        };
        state.unacked = state.unacked.saturating_sub(1);

        match settlement {
            Settlement::Ack => {}
            Settlement::Nack { requeue: true } => {
                state.ready.push_front(message);
                state.notify.notify_one();
            }
            Settlement::Nack { requeue: false } | Settlement::Reject => {
                let Some(dead_letter) = state.dead_letter.clone() else {
                    return;
                };
                metrics::counter!("bus_messages_dead_lettered_total", "queue" => queue.to_string())
                    .increment(1);
                tracing::warn!(queue, dead_letter = %dead_letter, "message dead-lettered");
                if let Some(dlq) = queues.get_mut(&dead_letter) {
                    dlq.ready.push_back(StoredMessage {
                        delivery_count: 0,
                        ..message
                    });
                    dlq.notify.notify_one();
                }
            }
        }
    }
}

impl InMemoryBroker {
    /// Creates a new broker with no queues.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of messages waiting in a queue, excluding unacked ones.
    pub fn message_count(&self, queue: &str) -> Option<usize> {
        self.inner.queues().get(queue).map(|state| state.ready.len())
    }

    /// Returns the number of delivered but not yet settled messages.
    pub fn unacked_count(&self, queue: &str) -> Option<usize> {
        self.inner.queues().get(queue).map(|state| state.unacked)
    }

    /// Returns true if the queue currently exists.
    pub fn queue_exists(&self, queue: &str) -> bool {
        self.inner.queues().contains_key(queue)
    }

    /// Removes and returns the bodies waiting in a queue.
    pub fn drain(&self, queue: &str) -> Vec<Vec<u8>> {
        self.inner
            .queues()
            .get_mut(queue)
            .map(|state| state.ready.drain(..).map(|m| m.body).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn declare_queue(&self, name: &str) -> Result<()> {
        let dead_letter = dead_letter_queue(name);
        let mut queues = self.inner.queues();
        queues
            .entry(dead_letter.clone())
            .or_insert_with(|| QueueState::new(None));
        queues
            .entry(name.to_string())
            .or_insert_with(|| QueueState::new(Some(dead_letter)));
        Ok(())
    }

    async fn declare_reply_queue(&self) -> Result<ReplyQueue> {
        let name = format!("amq.gen-{}", Uuid::new_v4());
        self.inner
            .queues()
            .insert(name.clone(), QueueState::new(None));
        tracing::debug!(queue = %name, "reply queue declared");

        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        Ok(ReplyQueue::new(name, move |queue| {
            if let Some(inner) = inner.upgrade() {
                inner.delete(queue);
                tracing::debug!(queue, "reply queue deleted");
            }
        }))
    }

    async fn publish(&self, queue: &str, message: Outbound) -> Result<()> {
        self.inner.enqueue(
            queue,
            StoredMessage {
                body: message.body,
                properties: message.properties,
                delivery_count: 0,
            },
        )?;
        metrics::counter!("bus_messages_published_total", "queue" => queue.to_string())
            .increment(1);
        Ok(())
    }

    async fn subscribe(&self, queue: &str) -> Result<Subscription> {
        if !self.queue_exists(queue) {
            return Err(BusError::QueueNotFound(queue.to_string()));
        }

        let state = (self.inner.clone(), queue.to_string());
        let stream = futures_util::stream::unfold(state, |(inner, queue)| async move {
            let delivery = next_delivery(&inner, &queue).await?;
            Some((delivery, (inner, queue)))
        });
        Ok(Box::pin(stream))
    }
}

async fn next_delivery(inner: &Arc<Inner>, queue: &str) -> Option<Delivery> {
    loop {
        let notify = match inner.try_take(queue)? {
            Ok(message) => return Some(into_delivery(inner, queue, message)),
            Err(notify) => notify,
        };

        let notified = notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        // Re-check after registering so a publish or delete in between is not missed.
        match inner.try_take(queue)? {
            Ok(message) => return Some(into_delivery(inner, queue, message)),
            Err(_) => notified.await,
        }
    }
}

fn into_delivery(inner: &Arc<Inner>, queue: &str, message: StoredMessage) -> Delivery {
    let acker = InMemoryAcker {
        inner: Arc::downgrade(inner),
        queue: queue.to_string(),
        message: message.clone(),
    };
    Delivery::new(
        queue,
        message.body,
        message.properties,
        message.delivery_count,
        Box::new(acker),
    )
}

struct InMemoryAcker {
    inner: Weak<Inner>,
    queue: String,
    message: StoredMessage,
}

#[async_trait]
impl Acker for InMemoryAcker {
    async fn settle(&self, settlement: Settlement) -> Result<()> {
        if let Some(inner) = self.inner.upgrade() {
            inner.settle(&self.queue, self.message.clone(), settlement);
        }
        Ok(())
    }

    fn abandon(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.settle(
                &self.queue,
                self.message.clone(),
                Settlement::Nack { requeue: true },
            );
        }
    }
}
