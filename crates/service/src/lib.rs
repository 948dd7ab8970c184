//! Fulfillment pipeline service.
//!
//! Wires the stores, the event channel, the discovery feed and the
//! fulfillment worker together, and serves the ops endpoints:
//! - `GET /health`
//! - `GET /metrics` (Prometheus)
//! - `GET /orders/{id}` (status and failure reason)

pub mod config;
pub mod error;
pub mod pipeline;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use orders::OrderStore;
use tower_http::trace::TraceLayer;

pub use config::{Config, LogFormat, ServiceRole};
pub use error::{ApiError, StartupError};
pub use pipeline::Backends;

/// Registers help text for the pipeline metrics.
pub fn describe_metrics() {
    use metrics::{describe_counter, describe_histogram};

    describe_counter!("feed_ticks_total", "Discovery feed poll cycles");
    describe_counter!("feed_orders_published_total", "Orders handed to the event channel");
    describe_counter!("feed_publish_failures_total", "Orders whose publish failed");
    describe_counter!("feed_backlog_swept_total", "Orders re-announced by the backlog sweep");
    describe_counter!(
        "feed_watermark_stalled_total",
        "Ticks whose full batch ended at the watermark"
    );
    describe_counter!("fulfillment_messages_total", "Deliveries received by the worker");
    describe_counter!("fulfillment_decode_failures_total", "Deliveries dropped as undecodable");
    describe_counter!(
        "fulfillment_duplicates_skipped_total",
        "Deliveries for orders that were no longer pending"
    );
    describe_counter!("fulfillment_orders_completed_total", "Orders completed");
    describe_counter!("fulfillment_orders_failed_total", "Orders failed");
    describe_counter!("fulfillment_timeouts_total", "Fulfillments that hit the deadline");
    describe_counter!("fulfillment_claim_retries_total", "Claim attempts that hit a store error");
    describe_counter!(
        "fulfillment_claims_abandoned_total",
        "Deliveries handed back to the feed after the claim kept failing"
    );
    describe_counter!("inventory_compensations_total", "Reservations given back");
    describe_counter!(
        "inventory_compensation_failures_total",
        "Reservations that could not be given back"
    );
    describe_counter!("status_finalizer_errors_total", "Status writes that failed");
    describe_histogram!(
        "fulfillment_duration_seconds",
        metrics::Unit::Seconds,
        "Time from claim to final status"
    );
}

/// State shared by the ops routes.
pub struct AppState {
    pub orders: Arc<dyn OrderStore>,
    pub role: ServiceRole,
}

/// Creates the Axum router for the ops endpoints.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders/{id}", get(routes::orders::get))
        .with_state(state)
        .merge(metrics_router)
        .layer(TraceLayer::new_for_http())
}
