use super::protocol::{AgentCreatedMessage, BattleResultMessage};
use crate::model::{AgentListing, BattleEvent};
use anyhow::{Context, Result};

/// Turns one hub event into the text of one websocket message.
///
/// Events arrive fully priced, so encoding never does I/O.
pub trait FeedEncoder<T: Send + Sync>: Send + Sync {
    fn encode(&self, event: &T) -> Result<String>;
}

pub struct AgentFeedEncoder;

impl FeedEncoder<AgentListing> for AgentFeedEncoder {
    fn encode(&self, listing: &AgentListing) -> Result<String> {
        let msg = AgentCreatedMessage::from(listing);
        serde_json::to_string(&msg).context("Failed to serialize agent message")
    }
}

pub struct BattleFeedEncoder;

impl FeedEncoder<BattleEvent> for BattleFeedEncoder {
    fn encode(&self, event: &BattleEvent) -> Result<String> {
        let msg = BattleResultMessage::from(event);
        serde_json::to_string(&msg).context("Failed to serialize battle message")
    }
}
