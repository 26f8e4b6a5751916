use crate::hub::{BroadcastHub, HubStats};
use crate::model::{AgentListing, BattleEvent};
use axum::{extract::State, response::Json, routing::get, Router};
use serde::Serialize;
use std::sync::Arc;

/// Shared state for the health endpoint
pub struct HealthAppState {
    pub agents: BroadcastHub<AgentListing>,
    pub battles: BroadcastHub<BattleEvent>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub agents_feed: HubStats,
    pub battle_feed: HubStats,
}

pub fn create_health_router(state: Arc<HealthAppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .with_state(state)
}

/// GET /api/health - liveness plus live feed counters
async fn health(State(state): State<Arc<HealthAppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        agents_feed: state.agents.stats(),
        battle_feed: state.battles.stats(),
    })
}
