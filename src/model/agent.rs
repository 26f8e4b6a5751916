use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store-assigned agent identifier. Never reused.
pub type AgentId = i64;

/// A user-created competitor tracked by market price and battle record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub ticker: String,

    /// Capability text handed to the narrator
    pub prompt: String,
    pub description: String,
    pub image_url: String,
    pub token_address: String,
    pub user_wallet_address: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Price seen in the last completed poll cycle (0 = never observed)
    pub previous_price: f64,

    /// All-time high, never decreases
    pub highest_price: f64,

    pub total: u32,
    pub wins: u32,
    pub losses: u32,

    /// wins / total * 100, or 0 when no battles were fought
    pub win_rate: f64,
}

/// Agent fields supplied by the creation flow before the store assigns an id.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NewAgent {
    pub name: String,
    pub ticker: String,
    pub prompt: String,
    pub description: String,
    pub image_url: String,
    pub token_address: String,
    pub user_wallet_address: String,
    /// Initial all-time high, if the creation flow already knows a launch price
    pub highest_price: f64,
}

/// A newly created agent as announced on the agent feed.
///
/// Priced once when it is published, so every viewer sees the same figure.
#[derive(Clone, Debug, PartialEq)]
pub struct AgentListing {
    pub agent: Agent,
    /// USD market cap; `None` when no USD price could be obtained
    pub market_cap: Option<f64>,
    pub market_cap_updated_at: DateTime<Utc>,
}

/// What a single price observation meant for an agent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PriceObservation {
    /// First price ever seen; only seeds `previous_price`
    Seeded,
    /// Strictly above the stored price; triggers a battle
    Rose { previous: f64 },
    /// Equal to or below the stored price
    Unchanged,
    Fell { previous: f64 },
}

impl Agent {
    /// Record the price from the current poll cycle.
    ///
    /// `previous_price` always ends up equal to `price`; `highest_price` only moves up.
    pub fn observe_price(&mut self, price: f64) -> PriceObservation {
        let previous = self.previous_price;

        let observation = if previous == 0.0 {
            PriceObservation::Seeded
        } else if price > previous {
            PriceObservation::Rose { previous }
        } else if price < previous {
            PriceObservation::Fell { previous }
        } else {
            PriceObservation::Unchanged
        };

        self.previous_price = price;
        if price > self.highest_price {
            self.highest_price = price;
        }

        observation
    }

    /// Recompute `win_rate` from the counters.
    pub fn refresh_win_rate(&mut self) {
        self.win_rate = if self.total == 0 {
            0.0
        } else {
            f64::from(self.wins) / f64::from(self.total) * 100.0
        };
    }
}

#[cfg(test)]
impl Agent {
    /// Unpersisted agent with empty stats, for tests.
    pub(crate) fn fixture(id: AgentId, name: &str) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.to_string(),
            ticker: name.to_uppercase(),
            prompt: format!("{} fights with raw determination", name),
            description: String::new(),
            image_url: format!("https://img.example/{}.png", id),
            token_address: format!("mint-{}", id),
            user_wallet_address: "wallet-1".to_string(),
            created_at: now,
            updated_at: now,
            previous_price: 0.0,
            highest_price: 0.0,
            total: 0,
            wins: 0,
            losses: 0,
            win_rate: 0.0,
        }
    }
}
