//! Router assembly: live feeds, agent and battle queries and health behind one CORS layer.

use crate::api::{
    create_agents_router, create_health_router, create_query_router, AgentsAppState,
    HealthAppState, QueryAppState,
};
use crate::feed::{create_feed_router, FeedAppState};
use axum::http::HeaderValue;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

pub fn create_app(
    feed: Arc<FeedAppState>,
    query: Arc<QueryAppState>,
    agents: Arc<AgentsAppState>,
    health: Arc<HealthAppState>,
    cors_origins: &[String],
) -> Router {
    Router::new()
        .merge(create_feed_router(feed))
        .merge(create_query_router(query))
        .merge(create_agents_router(agents))
        .merge(create_health_router(health))
        .layer(cors_layer(cors_origins))
}

/// Any origin when the list is empty, otherwise exactly the listed ones.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return cors.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(allowed))
}
