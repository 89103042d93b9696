//! HTTP surface: `GET /metrics` in the Prometheus text format.

use axum::Router;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use tracing::debug;

use fleet_metrics::{CONTENT_TYPE, Registry, render_prometheus};

pub fn build_router(registry: Registry) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .with_state(registry)
}

async fn metrics(State(registry): State<Registry>) -> impl IntoResponse {
    let samples = registry.gather().await;
    debug!(samples = samples.len(), "metrics scraped");
    ([(header::CONTENT_TYPE, CONTENT_TYPE)], render_prometheus(&samples))
}
