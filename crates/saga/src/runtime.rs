//! Wires the four services to the bus and runs their consumers.

use std::sync::Arc;

use bus::{Broker, ConsumerOptions, RpcClient, run_consumer};
use domain::Menu;
use projections::{NotificationDispatcher, Notifier, StaffOrdersView};
use store::{OrderStore, PaymentStore};
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::{
    Result,
    fanout::StatusFanout,
    gateway::PaymentGateway,
    notification::NotificationHandler,
    orchestrator::PaymentOrchestrator,
    order_service::{OrderQueueHandler, OrderService},
    payment_service::{PaymentQueueHandler, PaymentService},
    settings::SagaSettings,
    staff::{StaffQueueHandler, StaffService},
};

/// External collaborators of the saga.
#[derive(Clone)]
pub struct Collaborators {
    pub broker: Arc<dyn Broker>,
    pub orders: Arc<dyn OrderStore>,
    pub payments: Arc<dyn PaymentStore>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn Notifier>,
    pub menu: Arc<Menu>,
}

/// The running saga: services plus one consumer task per queue.
pub struct SagaRuntime {
    orders: Arc<OrderService>,
    payments: Arc<PaymentService>,
    staff: Arc<StaffService>,
    rpc: Arc<RpcClient>,
    shutdown: watch::Sender<bool>,
    consumers: JoinSet<bus::Result<()>>,
}

impl SagaRuntime {
    /// Declares every queue, starts the RPC client and spawns the consumers.
    #[tracing::instrument(skip_all)]
    pub async fn start(deps: Collaborators, settings: SagaSettings) -> Result<Self> {
        let queues = settings.queues;
        for queue in queues.all() {
            deps.broker.declare_queue(queue).await?;
        }

        let rpc = Arc::new(RpcClient::start(deps.broker.clone()).await?);
        let fanout = StatusFanout::new(deps.broker.clone(), queues.clone());

        let orders = Arc::new(OrderService::new(
            deps.orders,
            deps.broker.clone(),
            PaymentOrchestrator::new(rpc.clone(), &queues.payment, settings.payment.rpc_timeout),
            fanout.clone(),
            deps.menu,
            &queues.payment,
            settings.payment,
        ));
        let payments = Arc::new(PaymentService::new(
            deps.payments,
            deps.gateway,
            fanout.clone(),
        ));
        let staff = Arc::new(StaffService::new(
            StaffOrdersView::new(),
            orders.clone(),
            deps.broker.clone(),
            fanout,
            &queues.payment,
        ));
        staff.rebuild_view().await?;
        let mut notifications = NotificationDispatcher::new(deps.notifier);
        if let Some(recipient) = settings.default_notification_email {
            notifications = notifications.with_default_recipient(recipient);
        }

        let (shutdown, signal) = watch::channel(false);
        let options = ConsumerOptions {
            max_deliveries: settings.max_deliveries,
        };
        let mut consumers = JoinSet::new();
        consumers.spawn(run_consumer(
            deps.broker.clone(),
            queues.order.clone(),
            Arc::new(OrderQueueHandler::new(orders.clone())),
            options,
            signal.clone(),
        ));
        consumers.spawn(run_consumer(
            deps.broker.clone(),
            queues.payment.clone(),
            Arc::new(PaymentQueueHandler::new(payments.clone(), deps.broker.clone())),
            options,
            signal.clone(),
        ));
        consumers.spawn(run_consumer(
            deps.broker.clone(),
            queues.staff.clone(),
            Arc::new(StaffQueueHandler::new(staff.clone())),
            options,
            signal.clone(),
        ));
        consumers.spawn(run_consumer(
            deps.broker,
            queues.notification.clone(),
            Arc::new(NotificationHandler::new(notifications)),
            options,
            signal,
        ));

        tracing::info!(reply_to = rpc.reply_to(), "saga runtime started");
        Ok(Self {
            orders,
            payments,
            staff,
            rpc,
            shutdown,
            consumers,
        })
    }

    pub fn orders(&self) -> Arc<OrderService> {
        self.orders.clone()
    }

    pub fn payments(&self) -> Arc<PaymentService> {
        self.payments.clone()
    }

    pub fn staff(&self) -> Arc<StaffService> {
        self.staff.clone()
    }

    /// Stops the consumers after their in-flight message and closes the
    /// RPC client, failing any call still waiting for a reply.
    pub async fn shutdown(mut self) {
        self.shutdown.send_replace(true);
        while let Some(joined) = self.consumers.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "consumer stopped with error"),
                Err(e) => tracing::error!(error = %e, "consumer task panicked"),
            }
        }
        self.rpc.shutdown().await;
        tracing::info!("saga runtime stopped");
    }
}
