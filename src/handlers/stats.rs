use crate::{models::Stats, state::AppState};
use axum::{extract::State, Json};

pub async fn get_stats(State(state): State<AppState>) -> Json<Stats> {
    let stats = state.analytics.get_stats(state.issuer.store().len()).await;
    Json(stats)
}
