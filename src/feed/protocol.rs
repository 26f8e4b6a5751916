use crate::model::{Agent, AgentId, AgentListing, BattleEvent, BattleId, BattleOutcome};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Wall-clock format used by the agent feed, e.g. `2025-01-31 14:05:09`.
pub const FEED_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Server → Client: a new agent entered the arena
#[derive(Debug, Clone, Serialize)]
pub struct AgentCreatedMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub id: AgentId,
    pub name: String,
    pub ticker: String,
    pub description: String,
    pub image_url: String,
    pub token_address: String,
    pub created_at: String,
    /// `null` when no USD price was available at publish time
    pub market_cap: Option<f64>,
    pub market_cap_updated_at: String,
}

impl From<&AgentListing> for AgentCreatedMessage {
    fn from(listing: &AgentListing) -> Self {
        let agent = &listing.agent;
        Self {
            msg_type: "AGENT_CREATED".to_string(),
            id: agent.id,
            name: agent.name.clone(),
            ticker: agent.ticker.clone(),
            description: agent.description.clone(),
            image_url: agent.image_url.clone(),
            token_address: agent.token_address.clone(),
            created_at: agent.created_at.format(FEED_TIME_FORMAT).to_string(),
            market_cap: listing.market_cap,
            market_cap_updated_at: listing
                .market_cap_updated_at
                .format(FEED_TIME_FORMAT)
                .to_string(),
        }
    }
}

/// Public view of an agent inside a battle result
#[derive(Debug, Clone, Serialize)]
pub struct AgentSnapshot {
    pub id: AgentId,
    pub name: String,
    pub ticker: String,
    pub image_url: String,
    pub token_address: String,
    pub previous_price: f64,
    pub highest_price: f64,
    pub total: u32,
    pub wins: u32,
    pub losses: u32,
    pub win_rate: f64,
}

impl From<&Agent> for AgentSnapshot {
    fn from(agent: &Agent) -> Self {
        Self {
            id: agent.id,
            name: agent.name.clone(),
            ticker: agent.ticker.clone(),
            image_url: agent.image_url.clone(),
            token_address: agent.token_address.clone(),
            previous_price: agent.previous_price,
            highest_price: agent.highest_price,
            total: agent.total,
            wins: agent.wins,
            losses: agent.losses,
            win_rate: agent.win_rate,
        }
    }
}

/// Server → Client: a battle was committed
#[derive(Debug, Clone, Serialize)]
pub struct BattleResultMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub id: BattleId,
    pub attacker: AgentSnapshot,
    pub defender: AgentSnapshot,
    pub outcome: BattleOutcome,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl From<&BattleEvent> for BattleResultMessage {
    fn from(event: &BattleEvent) -> Self {
        Self {
            msg_type: "BATTLE_RESULT".to_string(),
            id: event.battle.id,
            attacker: AgentSnapshot::from(&event.attacker),
            defender: AgentSnapshot::from(&event.defender),
            outcome: event.battle.outcome,
            description: event.battle.description.clone(),
            created_at: event.battle.created_at,
        }
    }
}
