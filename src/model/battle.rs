use super::agent::{Agent, AgentId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type BattleId = i64;

/// Classified result of a battle, always from the attacker's point of view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BattleOutcome {
    TotalVictory,
    NarrowVictory,
    CrushingDefeat,
    NarrowDefeat,
}

impl BattleOutcome {
    pub const ALL: [BattleOutcome; 4] = [
        BattleOutcome::TotalVictory,
        BattleOutcome::NarrowVictory,
        BattleOutcome::CrushingDefeat,
        BattleOutcome::NarrowDefeat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BattleOutcome::TotalVictory => "TOTAL_VICTORY",
            BattleOutcome::NarrowVictory => "NARROW_VICTORY",
            BattleOutcome::CrushingDefeat => "CRUSHING_DEFEAT",
            BattleOutcome::NarrowDefeat => "NARROW_DEFEAT",
        }
    }

    pub fn attacker_won(&self) -> bool {
        matches!(
            self,
            BattleOutcome::TotalVictory | BattleOutcome::NarrowVictory
        )
    }
}

impl fmt::Display for BattleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BattleOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BattleOutcome::ALL
            .into_iter()
            .find(|outcome| outcome.as_str() == s)
            .ok_or_else(|| format!("unknown battle outcome '{}'", s))
    }
}

/// A persisted battle. Immutable once created.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Battle {
    pub id: BattleId,
    pub attacker_id: AgentId,
    pub defender_id: AgentId,
    pub outcome: BattleOutcome,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Battle fields before the store assigns an id.
#[derive(Clone, Debug, PartialEq)]
pub struct NewBattle {
    pub attacker_id: AgentId,
    pub defender_id: AgentId,
    pub outcome: BattleOutcome,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Committed battle together with both agents as they were after the commit.
///
/// This is what the battle hub carries to live viewers.
#[derive(Clone, Debug, PartialEq)]
pub struct BattleEvent {
    pub battle: Battle,
    pub attacker: Agent,
    pub defender: Agent,
}
