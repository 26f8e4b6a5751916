pub mod env;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::narrator::DEFAULT_COMPLETIONS_ENDPOINT;
use crate::oracle::{DEFAULT_JUPITER_URL, SOL_MINT};
use crate::session::SessionConfig;

// Re-export existing config types
pub use crate::battle::config::{BattleConfig, NarrationPolicy};

/// Complete arena configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArenaConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub battle: BattleConfig,
    #[serde(default)]
    pub price: PriceConfig,
    #[serde(default)]
    pub narrator: NarratorConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Allowed CORS origins; empty allows any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_bind_address() -> String {
    "0.0.0.0:9100".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_origins: Vec::new(),
        }
    }
}

/// SQLite store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "arena.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Live feed configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Queue depth per websocket subscriber
    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval_seconds: u64,
    #[serde(default = "default_read_deadline")]
    pub read_deadline_seconds: u64,
    #[serde(default = "default_write_timeout")]
    pub write_timeout_seconds: u64,
    /// Market cap = USD price * token_supply
    #[serde(default = "default_token_supply")]
    pub token_supply: f64,
    /// How long a looked-up USD price is reused for market caps
    #[serde(default = "default_price_cache_ttl")]
    pub price_cache_ttl_seconds: u64,
}

fn default_subscriber_capacity() -> usize {
    crate::hub::DEFAULT_SUBSCRIBER_CAPACITY
}

fn default_keepalive_interval() -> u64 {
    30
}

fn default_read_deadline() -> u64 {
    120
}

fn default_write_timeout() -> u64 {
    10
}

fn default_token_supply() -> f64 {
    crate::oracle::DEFAULT_TOKEN_SUPPLY
}

fn default_price_cache_ttl() -> u64 {
    30
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: default_subscriber_capacity(),
            keepalive_interval_seconds: default_keepalive_interval(),
            read_deadline_seconds: default_read_deadline(),
            write_timeout_seconds: default_write_timeout(),
            token_supply: default_token_supply(),
            price_cache_ttl_seconds: default_price_cache_ttl(),
        }
    }
}

impl FeedConfig {
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            keepalive_interval: Duration::from_secs(self.keepalive_interval_seconds),
            read_deadline: Duration::from_secs(self.read_deadline_seconds),
            write_timeout: Duration::from_secs(self.write_timeout_seconds),
        }
    }
}

/// Price API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PriceConfig {
    #[serde(default = "default_price_url")]
    pub base_url: String,
    /// Quote token for battle triggers (wrapped SOL)
    #[serde(default = "default_vs_token")]
    pub battle_vs_token: String,
    /// Battle prices are rounded to this many decimals
    #[serde(default = "default_price_decimals")]
    pub battle_decimals: u32,
    #[serde(default = "default_price_timeout")]
    pub timeout_seconds: u64,
}

fn default_price_url() -> String {
    DEFAULT_JUPITER_URL.to_string()
}

fn default_vs_token() -> String {
    SOL_MINT.to_string()
}

fn default_price_decimals() -> u32 {
    10
}

fn default_price_timeout() -> u64 {
    10
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            base_url: default_price_url(),
            battle_vs_token: default_vs_token(),
            battle_decimals: default_price_decimals(),
            timeout_seconds: default_price_timeout(),
        }
    }
}

/// Battle narration (chat completions) configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NarratorConfig {
    #[serde(default = "default_completions_endpoint")]
    pub endpoint: String,
    /// Usually supplied through OPENAI_API_KEY instead of the file
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_narrator_timeout")]
    pub timeout_seconds: u64,
}

fn default_completions_endpoint() -> String {
    DEFAULT_COMPLETIONS_ENDPOINT.to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_narrator_timeout() -> u64 {
    30
}

impl Default for NarratorConfig {
    fn default() -> Self {
        Self {
            endpoint: default_completions_endpoint(),
            api_key: String::new(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            timeout_seconds: default_narrator_timeout(),
        }
    }
}

impl ArenaConfig {
    /// Reject settings the engine and sessions cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.battle.interval_seconds == 0 {
            bail!("battle.interval_seconds must be greater than 0");
        }
        if self.battle.max_description_chars == 0 {
            bail!("battle.max_description_chars must be greater than 0");
        }
        if self.feed.subscriber_capacity == 0 {
            bail!("feed.subscriber_capacity must be greater than 0");
        }
        if self.feed.keepalive_interval_seconds == 0 || self.feed.write_timeout_seconds == 0 {
            bail!("feed keepalive and write timeout must be greater than 0");
        }
        if self.feed.read_deadline_seconds <= self.feed.keepalive_interval_seconds {
            bail!(
                "feed.read_deadline_seconds ({}) must be longer than keepalive_interval_seconds ({})",
                self.feed.read_deadline_seconds,
                self.feed.keepalive_interval_seconds
            );
        }
        if !(self.feed.token_supply.is_finite() && self.feed.token_supply > 0.0) {
            bail!("feed.token_supply must be a positive number");
        }
        Ok(())
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<ArenaConfig> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path))?;
    let config: ArenaConfig =
        toml::from_str(&contents).with_context(|| format!("Invalid config {}", path))?;
    Ok(config)
}

/// Like [`load_config`], but a missing file means all defaults.
pub fn load_config_or_default(path: &str) -> Result<ArenaConfig> {
    if Path::new(path).exists() {
        load_config(path)
    } else {
        Ok(ArenaConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = ArenaConfig::default();
        assert_eq!(config.server.bind_address, "0.0.0.0:9100");
        assert_eq!(config.feed.subscriber_capacity, 10);
        assert_eq!(config.feed.keepalive_interval_seconds, 30);
        assert_eq!(config.feed.read_deadline_seconds, 120);
        assert_eq!(config.battle.interval_seconds, 300);
        assert_eq!(config.battle.narration_policy, NarrationPolicy::DefaultVictory);
        assert_eq!(config.price.battle_vs_token, SOL_MINT);
        assert_eq!(config.narrator.model, "gpt-4o");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [server]
            bind_address = "127.0.0.1:8080"
            cors_origins = ["https://arena.example"]

            [database]
            path = "/tmp/arena.db"

            [feed]
            subscriber_capacity = 32
            keepalive_interval_seconds = 15
            read_deadline_seconds = 60

            [battle]
            interval_seconds = 60
            narration_policy = "retry_then_skip"

            [narrator]
            model = "gpt-4o-mini"
        "#;

        let config: ArenaConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.cors_origins, vec!["https://arena.example"]);
        assert_eq!(config.database.path, "/tmp/arena.db");
        assert_eq!(config.feed.subscriber_capacity, 32);
        assert_eq!(config.feed.session().read_deadline, Duration::from_secs(60));
        assert_eq!(config.battle.narration_policy, NarrationPolicy::RetryThenSkip);
        assert_eq!(config.battle.max_description_chars, 1000); // Default
        assert_eq!(config.narrator.model, "gpt-4o-mini");
        assert_eq!(config.narrator.max_tokens, 1000); // Default
    }

    #[test]
    fn test_partial_config() {
        let toml = r#"
            [battle]
            interval_seconds = 5
        "#;

        let config: ArenaConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.battle.interval_seconds, 5);
        assert_eq!(config.feed.write_timeout_seconds, 10); // Default
        assert_eq!(config.database.path, "arena.db"); // Default
    }

    #[test]
    fn test_validate_rejects_bad_timing() {
        let mut config = ArenaConfig::default();
        config.feed.read_deadline_seconds = 30;
        assert!(config.validate().is_err());

        let mut config = ArenaConfig::default();
        config.battle.interval_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = ArenaConfig::default();
        config.feed.subscriber_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file_and_missing_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nbind_address = \"127.0.0.1:1\"").unwrap();

        let config = load_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:1");

        assert!(load_config("/nonexistent/arena.toml").is_err());
        let fallback = load_config_or_default("/nonexistent/arena.toml").unwrap();
        assert_eq!(fallback.server.bind_address, "0.0.0.0:9100");
    }
}
