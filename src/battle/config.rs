use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What to do when narration names no known outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrationPolicy {
    /// Record the battle as a narrow victory for the attacker
    DefaultVictory,
    /// Ask once more; skip the battle if the second answer is also unrecognized
    RetryThenSkip,
}

/// Configuration for the battle engine
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BattleConfig {
    /// Seconds between poll cycles
    pub interval_seconds: u64,

    pub narration_policy: NarrationPolicy,

    /// Stored descriptions are cut to this many characters
    pub max_description_chars: usize,
}

impl BattleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 300,
            narration_policy: NarrationPolicy::DefaultVictory,
            max_description_chars: 1000,
        }
    }
}
