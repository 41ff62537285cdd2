//! HTTP API server for the restaurant ordering services.
//!
//! Exposes order placement, owner cancellation and refund, the staff board
//! and the payment gateway notification endpoint, with structured logging
//! (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod identity;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use bus::InMemoryBroker;
use domain::{Menu, MenuItem, Money};
use metrics_exporter_prometheus::PrometheusHandle;
use projections::LogNotifier;
use saga::{Collaborators, InMemoryPaymentGateway, SagaRuntime};
use store::{
    InMemoryOrderStore, InMemoryPaymentStore, PostgresOrderStore, PostgresPaymentStore,
    run_migrations,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
pub use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::system::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::system::health))
        .route("/orders", post(routes::orders::create))
        .route(
            "/orders/{id}",
            get(routes::orders::get).delete(routes::orders::cancel),
        )
        .route("/orders/{id}/refund", post(routes::orders::refund))
        .route("/staff/orders", get(routes::staff::list))
        .route("/staff/orders/{id}/status", put(routes::staff::update_status))
        .route("/payments/notify", post(routes::payments::notify))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// The menu served when no menu service is configured.
pub fn default_menu() -> Menu {
    Menu::new([
        MenuItem::new(1, "Pierogi ruskie", Money::from_minor(2800)),
        MenuItem::new(2, "Zurek", Money::from_minor(2200)),
        MenuItem::new(3, "Bigos", Money::from_minor(3400)),
        MenuItem::new(4, "Sernik", Money::from_minor(1600)),
        MenuItem::new(5, "Kompot", Money::from_minor(900)),
    ])
}

/// Collaborators backed by memory only, for tests and local runs.
pub fn in_memory_collaborators(broker: InMemoryBroker, menu: Menu) -> Collaborators {
    Collaborators {
        broker: Arc::new(broker),
        orders: Arc::new(InMemoryOrderStore::new()),
        payments: Arc::new(InMemoryPaymentStore::new()),
        gateway: Arc::new(InMemoryPaymentGateway::default()),
        notifier: Arc::new(LogNotifier),
        menu: Arc::new(menu),
    }
}

/// Builds the collaborators for `config` and starts the saga runtime.
///
/// With `DATABASE_URL` set, orders and payments live in PostgreSQL and the
/// schema is migrated first.
pub async fn start_runtime(config: &Config) -> Result<SagaRuntime, Box<dyn std::error::Error>> {
    let mut deps = in_memory_collaborators(InMemoryBroker::new(), default_menu());

    if let Some(url) = &config.database_url {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        run_migrations(&pool).await?;
        deps.orders = Arc::new(PostgresOrderStore::new(pool.clone()));
        deps.payments = Arc::new(PostgresPaymentStore::new(pool));
        tracing::info!("using PostgreSQL stores");
    } else {
        tracing::warn!("DATABASE_URL not set; orders and payments are kept in memory");
    }

    Ok(SagaRuntime::start(deps, config.saga_settings()).await?)
}
