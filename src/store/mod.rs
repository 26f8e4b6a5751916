//! Durable agent and battle state.
//!
//! The engine and the HTTP layer only see the [`Repository`] trait. The SQLite
//! implementation lives in [`sqlite`].

use crate::model::{Agent, AgentId, Battle, BattleId, NewAgent, NewBattle};
use thiserror::Error;

mod sqlite;

pub use sqlite::SqliteRepository;


#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("no opponent available for agent {0}")]
    NoOpponent(AgentId),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("repository lock poisoned")]
    Poisoned,
}

impl RepositoryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound { .. })
    }
}

/// Agent and battle persistence.
///
/// Implementations provide their own isolation; callers never hold locks
/// across calls.
pub trait Repository: Send + Sync {
    /// Persist a new agent with zeroed prices and stats.
    fn create_agent(&self, agent: NewAgent) -> Result<Agent, RepositoryError>;

    fn list_agents(&self) -> Result<Vec<Agent>, RepositoryError>;

    fn get_agent(&self, id: AgentId) -> Result<Agent, RepositoryError>;

    /// One page of agents, newest first, plus the total agent count.
    fn list_agents_page(
        &self,
        offset: u32,
        limit: u32,
    ) -> Result<(Vec<Agent>, u64), RepositoryError>;

    /// Top `limit` agents by wins, then win rate, then earliest creation.
    fn leaderboard(&self, limit: u32) -> Result<Vec<Agent>, RepositoryError>;

    /// Overwrite the mutable fields of an existing agent (last write wins).
    fn save_agent(&self, agent: &Agent) -> Result<(), RepositoryError>;

    /// Pick one agent other than `id`, uniformly at random.
    ///
    /// Fails with [`RepositoryError::NoOpponent`] when `id` is the only agent.
    fn find_random_agent_except(&self, id: AgentId) -> Result<Agent, RepositoryError>;

    fn create_battle(&self, battle: NewBattle) -> Result<Battle, RepositoryError>;

    /// Insert the battle and save both agents in one transaction.
    ///
    /// Either all three writes land or none do.
    fn record_battle(
        &self,
        battle: NewBattle,
        attacker: &Agent,
        defender: &Agent,
    ) -> Result<Battle, RepositoryError>;

    fn get_battle(&self, id: BattleId) -> Result<Battle, RepositoryError>;

    /// Battles the agent fought on either side, newest first.
    fn list_battles_for_agent(&self, id: AgentId) -> Result<Vec<Battle>, RepositoryError>;
}
