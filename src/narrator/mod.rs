//! Free-text battle narration.

use anyhow::Result;
use async_trait::async_trait;

mod openai;

pub use openai::{OpenAiNarrator, DEFAULT_COMPLETIONS_ENDPOINT};

/// Writes the story of a fight between two agents.
///
/// The text is expected to open with one of the outcome phrases
/// ("Total Victory!", "Narrow Defeat!", ...); see [`crate::battle::classify`].
#[async_trait]
pub trait OutcomeNarrator: Send + Sync {
    async fn narrate(
        &self,
        attacker_name: &str,
        attacker_prompt: &str,
        defender_name: &str,
        defender_prompt: &str,
    ) -> Result<String>;
}
