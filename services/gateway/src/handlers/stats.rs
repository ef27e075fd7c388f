use axum::{extract::State, Json};
use serde::Serialize;
use types::symbol::Symbol;

use crate::metrics::MetricsSnapshot;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub sessions: usize,
    pub subscriptions: usize,
    pub watched_symbols: usize,
    pub symbols_cached: Vec<Symbol>,
    pub counters: MetricsSnapshot,
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        sessions: state.registry.len(),
        subscriptions: state.router.subscription_count(),
        watched_symbols: state.router.watched_symbols(),
        symbols_cached: state.cache.symbols(),
        counters: state.metrics.snapshot(),
    })
}
