use crate::{
    handlers::{get_receipt, get_stats, health_check, summarize, verify_receipt, SUMMARIZE_ENDPOINT},
    middleware::{payment_middleware, PaymentVerifier},
    state::AppState,
};
use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

pub fn build_router(state: AppState, verifier: Arc<dyn PaymentVerifier>) -> Router {
    // Payment required
    let paid = Router::new()
        .route(SUMMARIZE_ENDPOINT, post(summarize))
        .route_layer(axum_middleware::from_fn_with_state(verifier, payment_middleware));

    Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(get_stats))
        .route("/api/receipts/verify", post(verify_receipt))
        .route("/api/receipts/:id", get(get_receipt))
        .merge(paid)
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
}
