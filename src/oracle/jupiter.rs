use super::PriceOracle;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_JUPITER_URL: &str = "https://api.jup.ag";

/// Wrapped SOL mint, used as `vsToken` when prices are quoted in SOL.
pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// Upper bound on ids per request accepted by the price endpoint.
const MAX_IDS_PER_REQUEST: usize = 100;

#[derive(Debug, Deserialize)]
struct PriceResponse {
    #[serde(default)]
    data: HashMap<String, Option<PriceEntry>>,
}

#[derive(Debug, Deserialize)]
struct PriceEntry {
    #[serde(default)]
    price: Option<RawPrice>,
}

/// The endpoint has returned prices both as strings and as numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPrice {
    Text(String),
    Number(f64),
}

impl RawPrice {
    fn value(&self) -> Option<f64> {
        match self {
            RawPrice::Text(s) => s.trim().parse().ok(),
            RawPrice::Number(n) => Some(*n),
        }
    }
}

/// HTTP client for the Jupiter `/price/v2` endpoint.
pub struct JupiterPriceOracle {
    http_client: Client,
    base_url: String,
    vs_token: Option<String>,
    decimals: Option<u32>,
}

impl JupiterPriceOracle {
    /// USD-quoted prices from `base_url` (normally [`DEFAULT_JUPITER_URL`]).
    pub fn with_base_url(base_url: String, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .user_agent("arena/0.1")
            .timeout(timeout)
            .build()
            .context("Failed to build price HTTP client")?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            vs_token: None,
            decimals: None,
        })
    }

    /// Quote prices against another token instead of USD.
    pub fn vs_token(mut self, mint: impl Into<String>) -> Self {
        self.vs_token = Some(mint.into());
        self
    }

    /// Round every returned price to `decimals` places.
    pub fn round_to(mut self, decimals: u32) -> Self {
        self.decimals = Some(decimals);
        self
    }

    fn request_url(&self, ids: &[String]) -> String {
        let mut url = format!(
            "{}/price/v2?ids={}",
            self.base_url,
            urlencoding::encode(&ids.join(","))
        );
        if let Some(vs) = &self.vs_token {
            url.push_str("&vsToken=");
            url.push_str(&urlencoding::encode(vs));
        }
        url
    }

    fn round(&self, price: f64) -> f64 {
        match self.decimals {
            Some(decimals) => {
                let factor = 10f64.powi(decimals as i32);
                (price * factor).round() / factor
            }
            None => price,
        }
    }

    async fn fetch_chunk(&self, ids: &[String]) -> Result<HashMap<String, f64>> {
        let url = self.request_url(ids);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .context("Failed to send price request")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("Price API error: {}", status));
        }

        let body: PriceResponse = response
            .json()
            .await
            .context("Failed to parse price response")?;

        let mut prices = HashMap::with_capacity(body.data.len());
        for (id, entry) in body.data {
            match entry.and_then(|e| e.price).and_then(|p| p.value()) {
                Some(price) if price.is_finite() && price >= 0.0 => {
                    prices.insert(id, self.round(price));
                }
                _ => warn!(token_id = %id, "No usable price in response"),
            }
        }
        Ok(prices)
    }
}

#[async_trait]
impl PriceOracle for JupiterPriceOracle {
    async fn get_prices(&self, token_ids: &[String]) -> Result<HashMap<String, f64>> {
        let mut prices = HashMap::new();
        for chunk in token_ids.chunks(MAX_IDS_PER_REQUEST) {
            prices.extend(self.fetch_chunk(chunk).await?);
        }
        debug!(requested = token_ids.len(), priced = prices.len(), "Fetched prices");
        Ok(prices)
    }
}
