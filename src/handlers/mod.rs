mod beautify;
mod health;
mod markets;
mod metrics;

use axum::{
    Router,
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use std::sync::Arc;
use std::time::Instant;

pub use beautify::beautify_handler;
pub use health::health_handler;
pub use markets::{
    cancel_market_handler, create_market_handler, purchase_tickets_handler,
    resolve_market_handler,
};
pub use metrics::metrics_handler;

use crate::metrics::{REQUEST_LATENCY, REQUEST_TOTAL};
use crate::state::AppState;

// count and time every API call
async fn track_requests(request: Request, next: Next) -> Response {
    REQUEST_TOTAL.inc();
    let start_time = Instant::now();
    let response = next.run(request).await;
    REQUEST_LATENCY.observe(start_time.elapsed().as_secs_f64());
    response
}

pub fn app(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/markets", post(create_market_handler))
        .route("/markets/{id}/tickets", post(purchase_tickets_handler))
        .route("/markets/{id}/resolve", post(resolve_market_handler))
        .route("/markets/{id}/cancel", post(cancel_market_handler))
        .route("/beautify", post(beautify_handler))
        .layer(middleware::from_fn(track_requests));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .nest("/api", api)
        .with_state(state)
}
