use std::future::ready;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use health::HealthRegistry;
use tower_http::trace::TraceLayer;

use crate::endpoint;
use crate::processor::Processor;
use crate::prometheus::{setup_metrics_recorder, track_metrics};

#[derive(Clone)]
pub struct State {
    pub processor: Arc<Processor>,
}

async fn index() -> &'static str {
    "webhook-ingest"
}

pub fn router(processor: Arc<Processor>, liveness: HealthRegistry, metrics: bool) -> Router {
    let state = State { processor };

    let router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route("/_liveness", get(move || ready(liveness.get_status())))
        .route("/webhook", post(endpoint::event))
        .route("/webhook/", post(endpoint::event))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(track_metrics))
        .with_state(state);

    // Don't install metrics unless asked to
    // Installing a global recorder when the crate is used as a library (during tests etc)
    // does not work well.
    if metrics {
        let recorder_handle = setup_metrics_recorder();
        router.route("/metrics", get(move || ready(recorder_handle.render())))
    } else {
        router
    }
}
