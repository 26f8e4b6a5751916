use crate::feed::protocol::AgentSnapshot;
use crate::model::{AgentId, Battle, BattleId, BattleOutcome};
use crate::store::{Repository, RepositoryError};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

/// Shared state for the battle query API
pub struct QueryAppState {
    pub repository: Arc<dyn Repository>,
}

/// Query parameters for a single battle
#[derive(Deserialize)]
pub struct BattleQueryParams {
    pub id: Option<String>,
}

/// Query parameters for battle history
#[derive(Deserialize)]
pub struct BattlesQueryParams {
    /// Kept as text so a malformed id gets our JSON error, not axum's rejection
    pub agent_id: Option<String>,
}

/// Battle with both participants as they are now
#[derive(Debug, Serialize)]
pub struct BattleResponse {
    pub id: BattleId,
    pub attacker_id: AgentId,
    pub defender_id: AgentId,
    pub outcome: BattleOutcome,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub attacker: AgentSnapshot,
    pub defender: AgentSnapshot,
}

/// An agent's battles, newest first, with its running record
#[derive(Debug, Serialize)]
pub struct BattleHistoryResponse {
    pub battles: Vec<BattleResponse>,
    pub total: u32,
    pub wins: u32,
    pub losses: u32,
    pub win_rate: f64,
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Create battle query router
pub fn create_query_router(state: Arc<QueryAppState>) -> Router {
    Router::new()
        .route("/api/battle", get(get_battle_by_query))
        .route("/api/battle/:id", get(get_battle))
        .route("/api/battles", get(list_battles))
        .with_state(state)
}

/// GET /api/battle/:id - Single battle
async fn get_battle(
    State(state): State<Arc<QueryAppState>>,
    Path(id): Path<BattleId>,
) -> Result<Json<BattleResponse>, QueryError> {
    fetch_battle(&state, id).map(Json)
}

/// GET /api/battle?id=N - Single battle, query-string form used by the web client
async fn get_battle_by_query(
    State(state): State<Arc<QueryAppState>>,
    Query(params): Query<BattleQueryParams>,
) -> Result<Json<BattleResponse>, QueryError> {
    let id = parse_id(params.id.as_deref()).ok_or(QueryError::BadRequest("Invalid battle id"))?;
    fetch_battle(&state, id).map(Json)
}

fn fetch_battle(state: &QueryAppState, id: BattleId) -> Result<BattleResponse, QueryError> {
    let battle = state
        .repository
        .get_battle(id)
        .map_err(|e| QueryError::from_repository(e, "Battle not found"))?;

    battle_response(state.repository.as_ref(), battle)
}

/// GET /api/battles?agent_id=N - Battle history for one agent
async fn list_battles(
    State(state): State<Arc<QueryAppState>>,
    Query(params): Query<BattlesQueryParams>,
) -> Result<Json<BattleHistoryResponse>, QueryError> {
    let agent_id: AgentId =
        parse_id(params.agent_id.as_deref()).ok_or(QueryError::BadRequest("Invalid agent_id"))?;

    let agent = state
        .repository
        .get_agent(agent_id)
        .map_err(|e| QueryError::from_repository(e, "Agent not found"))?;

    let battles = state
        .repository
        .list_battles_for_agent(agent_id)
        .map_err(|e| QueryError::from_repository(e, "Agent not found"))?
        .into_iter()
        .map(|battle| battle_response(state.repository.as_ref(), battle))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(BattleHistoryResponse {
        battles,
        total: agent.total,
        wins: agent.wins,
        losses: agent.losses,
        win_rate: agent.win_rate,
    }))
}

/// Numeric id from a query-string value.
pub(super) fn parse_id(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|raw| raw.trim().parse().ok())
}

fn battle_response(
    repository: &dyn Repository,
    battle: Battle,
) -> Result<BattleResponse, QueryError> {
    let attacker = repository
        .get_agent(battle.attacker_id)
        .map_err(QueryError::internal)?;
    let defender = repository
        .get_agent(battle.defender_id)
        .map_err(QueryError::internal)?;

    Ok(BattleResponse {
        id: battle.id,
        attacker_id: battle.attacker_id,
        defender_id: battle.defender_id,
        outcome: battle.outcome,
        description: battle.description,
        created_at: battle.created_at,
        attacker: AgentSnapshot::from(&attacker),
        defender: AgentSnapshot::from(&defender),
    })
}

/// Query error types
#[derive(Debug)]
pub(super) enum QueryError {
    NotFound(&'static str),
    BadRequest(&'static str),
    Internal,
}

impl QueryError {
    pub(super) fn from_repository(err: RepositoryError, not_found: &'static str) -> Self {
        if err.is_not_found() {
            QueryError::NotFound(not_found)
        } else {
            QueryError::internal(err)
        }
    }

    pub(super) fn internal(err: RepositoryError) -> Self {
        error!(error = %err, "Arena query failed");
        QueryError::Internal
    }
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            QueryError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            QueryError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            QueryError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        };

        let body = Json(ErrorResponse {
            error: error_message.to_string(),
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewAgent, NewBattle};
    use crate::store::SqliteRepository;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn create_test_state() -> Arc<QueryAppState> {
        Arc::new(QueryAppState {
            repository: Arc::new(SqliteRepository::new(":memory:").unwrap()),
        })
    }

    fn add_agent(state: &QueryAppState, name: &str) -> AgentId {
        state
            .repository
            .create_agent(NewAgent {
                name: name.to_string(),
                token_address: format!("mint-{}", name),
                ..NewAgent::default()
            })
            .unwrap()
            .id
    }

    fn add_battle(state: &QueryAppState, attacker: AgentId, defender: AgentId) -> BattleId {
        state
            .repository
            .create_battle(NewBattle {
                attacker_id: attacker,
                defender_id: defender,
                outcome: BattleOutcome::NarrowDefeat,
                description: "close call".to_string(),
                created_at: Utc::now(),
            })
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_get_battle_includes_both_agents() {
        let state = create_test_state();
        let a = add_agent(&state, "alpha");
        let b = add_agent(&state, "beta");
        let id = add_battle(&state, a, b);

        let result = get_battle(State(state), Path(id)).await.unwrap();

        assert_eq!(result.0.id, id);
        assert_eq!(result.0.attacker.name, "alpha");
        assert_eq!(result.0.defender.name, "beta");
        assert_eq!(result.0.outcome, BattleOutcome::NarrowDefeat);
    }

    #[tokio::test]
    async fn test_get_missing_battle() {
        let state = create_test_state();

        let err = get_battle(State(state), Path(99)).await.unwrap_err();

        assert!(matches!(err, QueryError::NotFound(_)));
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_battle_by_query_string() {
        let state = create_test_state();
        let a = add_agent(&state, "alpha");
        let b = add_agent(&state, "beta");
        let id = add_battle(&state, a, b);

        let app = create_query_router(state);
        let uri = format!("/api/battle?id={}", id);
        let resp = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["id"], id);
        assert_eq!(json["attacker"]["name"], "alpha");

        // Path form still served
        let uri = format!("/api/battle/{}", id);
        let resp = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        for uri in ["/api/battle", "/api/battle?id=x"] {
            let resp = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{}", uri);
        }

        let resp = app
            .oneshot(Request::builder().uri("/api/battle?id=999").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_battles_with_record() {
        let state = create_test_state();
        let a = add_agent(&state, "alpha");
        let b = add_agent(&state, "beta");
        let c = add_agent(&state, "gamma");
        add_battle(&state, a, b);
        add_battle(&state, c, a);
        add_battle(&state, b, c);

        let mut agent = state.repository.get_agent(a).unwrap();
        agent.total = 2;
        agent.wins = 1;
        agent.losses = 1;
        agent.refresh_win_rate();
        state.repository.save_agent(&agent).unwrap();

        let params = BattlesQueryParams {
            agent_id: Some(a.to_string()),
        };
        let result = list_battles(State(state), Query(params)).await.unwrap();

        assert_eq!(result.0.battles.len(), 2);
        assert_eq!(result.0.total, 2);
        assert_eq!(result.0.win_rate, 50.0);
        assert!(result
            .0
            .battles
            .iter()
            .all(|battle| battle.attacker_id == a || battle.defender_id == a));
    }

    #[tokio::test]
    async fn test_list_battles_rejects_bad_agent_id() {
        for raw in [None, Some("abc".to_string())] {
            let state = create_test_state();
            let params = BattlesQueryParams { agent_id: raw };

            let err = list_battles(State(state), Query(params)).await.unwrap_err();

            assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn test_list_battles_unknown_agent() {
        let state = create_test_state();
        let params = BattlesQueryParams {
            agent_id: Some("12".to_string()),
        };

        let err = list_battles(State(state), Query(params)).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }
}
