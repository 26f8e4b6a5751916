// A full price-triggered battle: two poll cycles through the engine, the
// result pushed to a live battle-feed viewer, then read back over HTTP.

use anyhow::Result;
use arena::api::{AgentsAppState, HealthAppState, QueryAppState};
use arena::app::create_app;
use arena::battle::{BattleConfig, BattleEngine};
use arena::feed::{AgentFeedEncoder, BattleFeedEncoder, FeedAppState};
use arena::hub::BroadcastHub;
use arena::model::{AgentListing, BattleEvent, NewAgent};
use arena::narrator::OutcomeNarrator;
use arena::oracle::{MarketValuer, PriceOracle, DEFAULT_TOKEN_SUPPLY};
use arena::session::SessionConfig;
use arena::store::{Repository, SqliteRepository};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

#[derive(Default)]
struct MarketBoard {
    prices: Mutex<HashMap<String, f64>>,
}

impl MarketBoard {
    fn quote(&self, token: &str, price: f64) {
        self.prices.lock().unwrap().insert(token.to_string(), price);
    }
}

#[async_trait]
impl PriceOracle for MarketBoard {
    async fn get_prices(&self, token_ids: &[String]) -> Result<HashMap<String, f64>> {
        let prices = self.prices.lock().unwrap();
        Ok(token_ids
            .iter()
            .filter_map(|id| prices.get(id).map(|p| (id.clone(), *p)))
            .collect())
    }
}

struct FixedNarrator;

#[async_trait]
impl OutcomeNarrator for FixedNarrator {
    async fn narrate(
        &self,
        attacker_name: &str,
        _attacker_prompt: &str,
        defender_name: &str,
        _defender_prompt: &str,
    ) -> Result<String> {
        Ok(format!(
            "Total Victory!\n\n{} overwhelmed {} in seconds.",
            attacker_name, defender_name
        ))
    }
}

fn new_agent(name: &str, token: &str) -> NewAgent {
    NewAgent {
        name: name.to_string(),
        ticker: name.to_uppercase(),
        prompt: format!("{} fights with fire", name),
        token_address: token.to_string(),
        ..NewAgent::default()
    }
}

#[tokio::test]
async fn test_price_rise_battle_reaches_viewers_and_history() {
    let repository: Arc<dyn Repository> = Arc::new(SqliteRepository::new(":memory:").unwrap());
    let board = Arc::new(MarketBoard::default());
    let agent_hub: BroadcastHub<AgentListing> = BroadcastHub::new("agents", 10);
    let battle_hub: BroadcastHub<BattleEvent> = BroadcastHub::new("battles", 10);
    let shutdown = CancellationToken::new();

    let attacker = repository.create_agent(new_agent("blaze", "mint-blaze")).unwrap();
    let defender = repository.create_agent(new_agent("frost", "mint-frost")).unwrap();

    let engine = BattleEngine::new(
        Arc::clone(&repository),
        board.clone(),
        Arc::new(FixedNarrator),
        battle_hub.clone(),
        BattleConfig::default(),
    );

    let router = create_app(
        Arc::new(FeedAppState {
            agents: agent_hub.clone(),
            battles: battle_hub.clone(),
            agent_encoder: Arc::new(AgentFeedEncoder),
            battle_encoder: Arc::new(BattleFeedEncoder),
            session: SessionConfig::default(),
            shutdown: shutdown.clone(),
        }),
        Arc::new(QueryAppState {
            repository: Arc::clone(&repository),
        }),
        Arc::new(AgentsAppState {
            repository: Arc::clone(&repository),
            valuer: Arc::new(MarketValuer::new(board.clone(), DEFAULT_TOKEN_SUPPLY)),
        }),
        Arc::new(HealthAppState {
            agents: agent_hub,
            battles: battle_hub.clone(),
        }),
        &[],
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = router.clone();
    tokio::spawn(async move {
        axum::serve(listener, server).await.unwrap();
    });

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/api/ws/battle", addr))
        .await
        .unwrap();
    for _ in 0..100 {
        if battle_hub.subscriber_count() == 1 {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(battle_hub.subscriber_count(), 1);

    // First cycle only seeds prices
    board.quote("mint-blaze", 0.002);
    board.quote("mint-frost", 0.004);
    let report = engine.run_cycle().await.unwrap();
    assert_eq!(report.seeded, 2);
    assert_eq!(report.battles, 0);

    // Only the attacker's price rises
    board.quote("mint-blaze", 0.003);
    let report = engine.run_cycle().await.unwrap();
    assert_eq!(report.battles, 1);

    let event = loop {
        let msg = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("no battle result")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = msg {
            break serde_json::from_str::<Value>(&text).unwrap();
        }
    };
    assert_eq!(event["type"], "BATTLE_RESULT");
    assert_eq!(event["outcome"], "TOTAL_VICTORY");
    assert_eq!(event["attacker"]["id"], attacker.id);
    assert_eq!(event["attacker"]["wins"], 1);
    assert_eq!(event["defender"]["id"], defender.id);
    assert_eq!(event["defender"]["losses"], 1);
    assert_eq!(event["description"], "blaze overwhelmed frost in seconds.");

    let battle_id = event["id"].as_i64().unwrap();

    let resp = router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/battle/{}", battle_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let battle: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(battle["attacker_id"], attacker.id);
    assert_eq!(battle["outcome"], "TOTAL_VICTORY");

    let resp = router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/battle?id={}", battle_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let by_query: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(by_query, battle);

    let resp = router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/battles?agent_id={}", defender.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let history: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(history["total"], 1);
    assert_eq!(history["losses"], 1);
    assert_eq!(history["win_rate"], 0.0);
    assert_eq!(history["battles"].as_array().unwrap().len(), 1);

    let resp = router
        .oneshot(
            Request::builder()
                .uri("/api/leaderboard")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let board: Value = serde_json::from_slice(&body).unwrap();
    let leaders = board["leaderboard"].as_array().unwrap();
    assert_eq!(leaders[0]["id"], attacker.id);
    assert_eq!(leaders[0]["wins"], 1);
    assert_eq!(leaders[0]["market_cap"], 3_000_000.0);
    assert_eq!(leaders[1]["id"], defender.id);

    shutdown.cancel();
}
