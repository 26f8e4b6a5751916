//! Live websocket feeds.
//!
//! Two routes, one per hub:
//! - `/api/ws/agents`: newly created agents, priced once at publish time
//! - `/api/ws/battle`: committed battle results
//!
//! Every connection gets its own [`ConnectionSession`] subscribed to the
//! matching hub. The feed layer owns no business state.

use crate::hub::BroadcastHub;
use crate::model::{AgentListing, BattleEvent};
use crate::session::{ConnectionSession, SessionConfig};
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

mod encoder;
pub mod protocol;

pub use encoder::{AgentFeedEncoder, BattleFeedEncoder, FeedEncoder};

/// Shared state for the feed routes
#[derive(Clone)]
pub struct FeedAppState {
    pub agents: BroadcastHub<AgentListing>,
    pub battles: BroadcastHub<BattleEvent>,
    pub agent_encoder: Arc<dyn FeedEncoder<AgentListing>>,
    pub battle_encoder: Arc<dyn FeedEncoder<BattleEvent>>,
    pub session: SessionConfig,
    /// Parent of every session's cancellation token
    pub shutdown: CancellationToken,
}

/// GET /api/ws/agents - agent-created feed
pub async fn agents_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<FeedAppState>>,
) -> Response {
    info!(feed = "agents", "WebSocket upgrade request received");
    let session = ConnectionSession::new(
        "agents",
        state.agents.subscribe(),
        state.agent_encoder.clone(),
        state.session.clone(),
        state.shutdown.child_token(),
    );
    ws.on_upgrade(move |socket| serve_socket(socket, session))
}

/// GET /api/ws/battle - battle result feed
pub async fn battle_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<FeedAppState>>,
) -> Response {
    info!(feed = "battle", "WebSocket upgrade request received");
    let session = ConnectionSession::new(
        "battle",
        state.battles.subscribe(),
        state.battle_encoder.clone(),
        state.session.clone(),
        state.shutdown.child_token(),
    );
    ws.on_upgrade(move |socket| serve_socket(socket, session))
}

/// Create the feed router
pub fn create_feed_router(state: Arc<FeedAppState>) -> Router {
    Router::new()
        .route("/api/ws/agents", get(agents_ws_handler))
        .route("/api/ws/battle", get(battle_ws_handler))
        .with_state(state)
}

async fn serve_socket<T: Send + Sync + 'static>(socket: WebSocket, session: ConnectionSession<T>) {
    let (sink, stream) = socket.split();
    session.run(sink, stream).await;
}
