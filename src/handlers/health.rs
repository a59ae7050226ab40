use crate::{models::HealthStatus, state::AppState};
use axum::{extract::State, Json};
use chrono::Utc;

pub async fn health_check(State(state): State<AppState>) -> Json<HealthStatus> {
    let redis_ok = state.cache.ping().await;
    let signing_enabled = state.issuer.signing_enabled();

    // Without a signing key the gateway still serves, but issues no receipts
    let status = if signing_enabled { "healthy" } else { "degraded" };

    Json(HealthStatus {
        status: status.to_string(),
        service: "MicroAI Paygate".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        signing_enabled,
        server_public_key: state.issuer.public_key().map(str::to_string),
        redis: redis_ok,
        uptime_seconds: state.analytics.uptime_seconds(),
        timestamp: Utc::now(),
    })
}
