//! Market price lookups for agent tokens.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

mod cache;
mod jupiter;
mod valuation;

pub use cache::CachedPriceOracle;
pub use jupiter::{JupiterPriceOracle, DEFAULT_JUPITER_URL, SOL_MINT};
pub use valuation::{MarketValuer, DEFAULT_TOKEN_SUPPLY};

/// Source of current token prices.
///
/// A token missing from the returned map has no price right now; an `Err`
/// means the whole lookup failed.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn get_prices(&self, token_ids: &[String]) -> Result<HashMap<String, f64>>;

    async fn get_price(&self, token_id: &str) -> Result<Option<f64>> {
        let ids = [token_id.to_string()];
        Ok(self.get_prices(&ids).await?.remove(token_id))
    }
}
