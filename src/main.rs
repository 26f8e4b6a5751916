use anyhow::{Context, Result};
use arena::api::{AgentsAppState, HealthAppState, QueryAppState};
use arena::app::create_app;
use arena::battle::BattleEngine;
use arena::config::{env::config_path, load_config_or_default};
use arena::feed::{AgentFeedEncoder, BattleFeedEncoder, FeedAppState};
use arena::hub::BroadcastHub;
use arena::narrator::OpenAiNarrator;
use arena::oracle::{CachedPriceOracle, JupiterPriceOracle, MarketValuer};
use arena::store::{Repository, SqliteRepository};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "arena=info".into()),
        )
        .init();

    info!("Arena starting...");

    let path = config_path();
    let mut config = load_config_or_default(&path)?;
    config.apply_env();
    config.validate().context("Invalid configuration")?;

    info!(
        config = %path,
        bind_address = %config.server.bind_address,
        db_path = %config.database.path,
        battle_interval_seconds = config.battle.interval_seconds,
        "Configuration loaded"
    );
    if config.narrator.api_key.is_empty() {
        warn!("OPENAI_API_KEY is not set, battle narration will fail");
    }

    let repository: Arc<dyn Repository> = Arc::new(
        SqliteRepository::new(&config.database.path)
            .context("Failed to initialize arena store")?,
    );

    // Battles compare prices quoted in SOL; market caps are always USD
    let price_timeout = Duration::from_secs(config.price.timeout_seconds);
    let battle_oracle = Arc::new(
        JupiterPriceOracle::with_base_url(config.price.base_url.clone(), price_timeout)?
            .vs_token(config.price.battle_vs_token.clone())
            .round_to(config.price.battle_decimals),
    );
    let usd_oracle = Arc::new(CachedPriceOracle::new(
        Arc::new(JupiterPriceOracle::with_base_url(
            config.price.base_url.clone(),
            price_timeout,
        )?),
        Duration::from_secs(config.feed.price_cache_ttl_seconds),
    ));
    let valuer = Arc::new(MarketValuer::new(usd_oracle, config.feed.token_supply));

    let narrator = Arc::new(OpenAiNarrator::new(
        config.narrator.endpoint.clone(),
        config.narrator.api_key.clone(),
        config.narrator.model.clone(),
        config.narrator.max_tokens,
        Duration::from_secs(config.narrator.timeout_seconds),
    )?);

    let agent_hub = BroadcastHub::new("agents", config.feed.subscriber_capacity);
    let battle_hub = BroadcastHub::new("battles", config.feed.subscriber_capacity);

    let shutdown = CancellationToken::new();

    let engine = Arc::new(BattleEngine::new(
        Arc::clone(&repository),
        battle_oracle,
        narrator,
        battle_hub.clone(),
        config.battle.clone(),
    ));
    let engine_handle = engine.spawn(shutdown.clone());

    let feed_state = Arc::new(FeedAppState {
        agents: agent_hub.clone(),
        battles: battle_hub.clone(),
        agent_encoder: Arc::new(AgentFeedEncoder),
        battle_encoder: Arc::new(BattleFeedEncoder),
        session: config.feed.session(),
        shutdown: shutdown.clone(),
    });
    let query_state = Arc::new(QueryAppState {
        repository: Arc::clone(&repository),
    });
    let agents_state = Arc::new(AgentsAppState {
        repository: Arc::clone(&repository),
        valuer,
    });
    let health_state = Arc::new(HealthAppState {
        agents: agent_hub,
        battles: battle_hub,
    });
    let router = create_app(
        feed_state,
        query_state,
        agents_state,
        health_state,
        &config.server.cors_origins,
    );

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_address))?;
    info!(address = %config.server.bind_address, "Arena API listening");

    let server_shutdown = shutdown.clone();
    let server_handle = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "Arena API server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    // Cancels the engine, every feed session and the listener
    shutdown.cancel();
    let _ = engine_handle.await;
    let _ = server_handle.await;
    info!("Arena stopped");

    Ok(())
}
