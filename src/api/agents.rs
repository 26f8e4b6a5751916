use super::query::{parse_id, QueryError};
use crate::model::{Agent, AgentId};
use crate::oracle::MarketValuer;
use crate::store::Repository;
use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Agents shown on the leaderboard
pub const LEADERBOARD_SIZE: u32 = 100;

const DEFAULT_PAGE_SIZE: u32 = 10;
const MAX_PAGE_SIZE: u32 = 100;

/// Shared state for the agent views
pub struct AgentsAppState {
    pub repository: Arc<dyn Repository>,
    pub valuer: Arc<MarketValuer>,
}

/// Query parameters for the agent directory
#[derive(Deserialize)]
pub struct AgentsPageParams {
    pub page: Option<String>,
    pub page_size: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AgentResponse {
    pub id: AgentId,
    pub name: String,
    pub ticker: String,
    pub prompt: String,
    pub description: String,
    pub image_url: String,
    pub token_address: String,
    pub created_at: DateTime<Utc>,
}

/// Directory entry: the agent plus its market cap (`null` when unpriced)
#[derive(Debug, Serialize)]
pub struct ListedAgentResponse {
    #[serde(flatten)]
    pub agent: AgentResponse,
    pub user_wallet_address: String,
    pub market_cap: Option<f64>,
    pub market_cap_updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct AgentsPageResponse {
    pub agents: Vec<ListedAgentResponse>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardEntry {
    pub id: AgentId,
    pub name: String,
    pub ticker: String,
    pub wins: u32,
    pub win_rate: f64,
    pub created_at: DateTime<Utc>,
    pub image_url: String,
    pub description: String,
    pub market_cap: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardResponse {
    pub leaderboard: Vec<LeaderboardEntry>,
}

impl From<&Agent> for AgentResponse {
    fn from(agent: &Agent) -> Self {
        Self {
            id: agent.id,
            name: agent.name.clone(),
            ticker: agent.ticker.clone(),
            prompt: agent.prompt.clone(),
            description: agent.description.clone(),
            image_url: agent.image_url.clone(),
            token_address: agent.token_address.clone(),
            created_at: agent.created_at,
        }
    }
}

/// Create agent views router
pub fn create_agents_router(state: Arc<AgentsAppState>) -> Router {
    Router::new()
        .route("/api/agent/:id", get(get_agent))
        .route("/api/agents/all", get(list_agents))
        .route("/api/leaderboard", get(leaderboard))
        .with_state(state)
}

/// GET /api/agent/:id - One agent
async fn get_agent(
    State(state): State<Arc<AgentsAppState>>,
    Path(raw): Path<String>,
) -> Result<Json<AgentResponse>, QueryError> {
    let id = parse_id(Some(raw.as_str())).ok_or(QueryError::BadRequest("Invalid agent id"))?;
    let agent = state
        .repository
        .get_agent(id)
        .map_err(|e| QueryError::from_repository(e, "Agent not found"))?;

    Ok(Json(AgentResponse::from(&agent)))
}

/// GET /api/agents/all?page=N&page_size=M - Every agent, newest first
///
/// Missing or malformed paging values fall back to page 1 of 10.
async fn list_agents(
    State(state): State<Arc<AgentsAppState>>,
    Query(params): Query<AgentsPageParams>,
) -> Result<Json<AgentsPageResponse>, QueryError> {
    let page = parse_positive(params.page.as_deref()).unwrap_or(1);
    let page_size = parse_positive(params.page_size.as_deref())
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .min(MAX_PAGE_SIZE);
    let offset = (page - 1).saturating_mul(page_size);

    let (agents, total) = state
        .repository
        .list_agents_page(offset, page_size)
        .map_err(QueryError::internal)?;

    let tokens: Vec<String> = agents.iter().map(|a| a.token_address.clone()).collect();
    let caps = state.valuer.market_caps(&tokens).await;
    let priced_at = Utc::now();

    let agents = agents
        .iter()
        .map(|agent| ListedAgentResponse {
            agent: AgentResponse::from(agent),
            user_wallet_address: agent.user_wallet_address.clone(),
            market_cap: caps.get(&agent.token_address).copied(),
            market_cap_updated_at: priced_at,
        })
        .collect();

    Ok(Json(AgentsPageResponse {
        agents,
        total,
        page,
        page_size,
    }))
}

/// GET /api/leaderboard - Top agents by wins, then win rate, then age
async fn leaderboard(
    State(state): State<Arc<AgentsAppState>>,
) -> Result<Json<LeaderboardResponse>, QueryError> {
    let agents = state
        .repository
        .leaderboard(LEADERBOARD_SIZE)
        .map_err(QueryError::internal)?;

    let tokens: Vec<String> = agents.iter().map(|a| a.token_address.clone()).collect();
    let caps = state.valuer.market_caps(&tokens).await;

    let leaderboard = agents
        .into_iter()
        .map(|agent| LeaderboardEntry {
            market_cap: caps.get(&agent.token_address).copied(),
            id: agent.id,
            name: agent.name,
            ticker: agent.ticker,
            wins: agent.wins,
            win_rate: agent.win_rate,
            created_at: agent.created_at,
            image_url: agent.image_url,
            description: agent.description,
        })
        .collect();

    Ok(Json(LeaderboardResponse { leaderboard }))
}

fn parse_positive(raw: Option<&str>) -> Option<u32> {
    raw.and_then(|raw| raw.trim().parse().ok()).filter(|n| *n > 0)
}
