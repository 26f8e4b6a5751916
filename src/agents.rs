use crate::hub::BroadcastHub;
use crate::model::{Agent, AgentListing, NewAgent};
use crate::oracle::MarketValuer;
use crate::store::{Repository, RepositoryError};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

/// Entry point for agents leaving the creation flow.
///
/// Persists the agent, prices it once and then announces it on the agent
/// feed. Nothing is published when the insert fails.
#[derive(Clone)]
pub struct AgentRegistry {
    repository: Arc<dyn Repository>,
    agents: BroadcastHub<AgentListing>,
    valuer: Arc<MarketValuer>,
}

impl AgentRegistry {
    pub fn new(
        repository: Arc<dyn Repository>,
        agents: BroadcastHub<AgentListing>,
        valuer: Arc<MarketValuer>,
    ) -> Self {
        Self {
            repository,
            agents,
            valuer,
        }
    }

    pub async fn register(&self, agent: NewAgent) -> Result<Agent, RepositoryError> {
        let agent = self.repository.create_agent(agent)?;

        let listing = AgentListing {
            market_cap: self.valuer.market_cap(&agent.token_address).await,
            market_cap_updated_at: Utc::now(),
            agent: agent.clone(),
        };
        let delivery = self.agents.publish(listing);

        info!(
            agent_id = agent.id,
            ticker = %agent.ticker,
            delivered = delivery.delivered,
            "Agent registered"
        );
        Ok(agent)
    }
}
