// Agent and battle records shared by the store, engine and feeds

mod agent;
mod battle;

pub use agent::{Agent, AgentId, AgentListing, NewAgent, PriceObservation};
pub use battle::{Battle, BattleEvent, BattleId, BattleOutcome, NewBattle};
