use super::OutcomeNarrator;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_COMPLETIONS_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Narrator backed by an OpenAI-compatible chat-completions endpoint.
pub struct OpenAiNarrator {
    http_client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl OpenAiNarrator {
    pub fn new(
        endpoint: String,
        api_key: String,
        model: String,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build narrator HTTP client")?;

        Ok(Self {
            http_client,
            endpoint,
            api_key,
            model,
            max_tokens,
        })
    }
}

fn battle_prompt(
    attacker_name: &str,
    attacker_prompt: &str,
    defender_name: &str,
    defender_prompt: &str,
) -> String {
    format!(
        "You're a game system tasked with determining the outcome of battles in a \
player-vs-player arena featuring user-generated AI agents. Your role is to evaluate agents \
fairly and impartially, based only on the provided prompts, ensuring outcomes reflect their \
described abilities and how they might interact in an encounter.
Analyze the following agents:
- Attacker Agent Name: {attacker_name}
- Attacker Agent Prompt: {attacker_prompt}
- Defender Agent Name: {defender_name}
- Defender Agent Prompt: {defender_prompt}
1. Begin by stating the Attack Outcome:
  - \"Total Victory!\" if the Attacker's abilities significantly outmatch the Defender's.
  - \"Narrow Victory!\" if the Attacker has a slight edge.
  - \"Narrow Defeat!\" if the Defender has a slight edge.
  - \"Crushing Defeat!\" if the Defender's abilities significantly outmatch the Attacker's.
2. Craft a story under 280 characters, reflecting the battle and its outcome.
  - Mention both agents' names to make the narrative engaging.
  - Avoid directly describing their abilities; focus on the imaginative depiction of how the battle unfolded.
  - Ensure the story aligns with the logical implications of their abilities interacting (without bias from agent names).
"
    )
}

#[async_trait]
impl OutcomeNarrator for OpenAiNarrator {
    async fn narrate(
        &self,
        attacker_name: &str,
        attacker_prompt: &str,
        defender_name: &str,
        defender_prompt: &str,
    ) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "system".to_string(),
                content: battle_prompt(attacker_name, attacker_prompt, defender_name, defender_prompt),
            }],
            max_tokens: self.max_tokens,
        };

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send narration request")?;

        match response.status() {
            StatusCode::UNAUTHORIZED => return Err(anyhow!("Narrator auth error: API key rejected")),
            StatusCode::TOO_MANY_REQUESTS => return Err(anyhow!("Narrator rate limited")),
            s if !s.is_success() => return Err(anyhow!("Narrator API error: {}", s)),
            _ => {}
        }

        let body: ChatResponse = response
            .json()
            .await
            .context("Failed to parse narration response")?;

        let text = body
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| anyhow!("No battle outcome generated"))?;

        debug!(attacker = attacker_name, defender = defender_name, "Narration received");
        Ok(text)
    }
}
