use super::PriceOracle;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Default token supply used for market cap.
pub const DEFAULT_TOKEN_SUPPLY: f64 = 1e9;

/// Market cap = USD price * token supply.
///
/// A token without a USD price has no market cap; there is no fallback to
/// prices quoted in another unit.
pub struct MarketValuer {
    oracle: Arc<dyn PriceOracle>,
    token_supply: f64,
}

impl MarketValuer {
    pub fn new(oracle: Arc<dyn PriceOracle>, token_supply: f64) -> Self {
        Self {
            oracle,
            token_supply,
        }
    }

    pub async fn market_cap(&self, token_id: &str) -> Option<f64> {
        match self.oracle.get_price(token_id).await {
            Ok(Some(price)) => Some(price * self.token_supply),
            Ok(None) => {
                warn!(token = %token_id, "No USD price, market cap unknown");
                None
            }
            Err(e) => {
                warn!(token = %token_id, error = %e, "Price lookup failed, market cap unknown");
                None
            }
        }
    }

    /// Market caps for many tokens in one lookup. Unpriced tokens are absent;
    /// a failed lookup yields an empty map.
    pub async fn market_caps(&self, token_ids: &[String]) -> HashMap<String, f64> {
        if token_ids.is_empty() {
            return HashMap::new();
        }
        match self.oracle.get_prices(token_ids).await {
            Ok(prices) => prices
                .into_iter()
                .map(|(id, price)| (id, price * self.token_supply))
                .collect(),
            Err(e) => {
                warn!(tokens = token_ids.len(), error = %e, "Batched price lookup failed, market caps unknown");
                HashMap::new()
            }
        }
    }
}
