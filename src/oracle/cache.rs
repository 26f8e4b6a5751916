use super::PriceOracle;
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

/// Keeps recent prices for `ttl` so that bursts of lookups do not each hit
/// the price API.
///
/// Misses are fetched by one caller at a time; concurrent callers wait and
/// then read what it cached. When the upstream fails, the last price seen
/// for a token is served even if it has expired.
pub struct CachedPriceOracle {
    inner: Arc<dyn PriceOracle>,
    ttl: Duration,
    entries: DashMap<String, (f64, Instant)>,
    refresh: Mutex<()>,
}

impl CachedPriceOracle {
    pub fn new(inner: Arc<dyn PriceOracle>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: DashMap::new(),
            refresh: Mutex::new(()),
        }
    }

    fn fresh(&self, token_id: &str) -> Option<f64> {
        self.entries
            .get(token_id)
            .filter(|entry| entry.1.elapsed() < self.ttl)
            .map(|entry| entry.0)
    }

    /// Split into cached prices and ids that still need a lookup.
    fn partition(&self, token_ids: &[String]) -> (HashMap<String, f64>, Vec<String>) {
        let mut prices = HashMap::with_capacity(token_ids.len());
        let mut misses = Vec::new();
        for id in token_ids {
            match self.fresh(id) {
                Some(price) => {
                    prices.insert(id.clone(), price);
                }
                None => misses.push(id.clone()),
            }
        }
        (prices, misses)
    }
}

#[async_trait]
impl PriceOracle for CachedPriceOracle {
    async fn get_prices(&self, token_ids: &[String]) -> Result<HashMap<String, f64>> {
        let (prices, misses) = self.partition(token_ids);
        if misses.is_empty() {
            return Ok(prices);
        }

        let _refresh = self.refresh.lock().await;
        // Another caller may have fetched these while we waited
        let (mut prices, misses) = self.partition(token_ids);
        if misses.is_empty() {
            return Ok(prices);
        }

        match self.inner.get_prices(&misses).await {
            Ok(fetched) => {
                let now = Instant::now();
                for (id, price) in fetched {
                    self.entries.insert(id.clone(), (price, now));
                    prices.insert(id, price);
                }
            }
            Err(e) => {
                let stale: Vec<(String, f64)> = misses
                    .iter()
                    .filter_map(|id| self.entries.get(id).map(|entry| (id.clone(), entry.0)))
                    .collect();
                if stale.is_empty() && prices.is_empty() {
                    return Err(e);
                }
                warn!(error = %e, stale = stale.len(), "Price lookup failed, serving last known prices");
                prices.extend(stale);
            }
        }

        Ok(prices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct CountingOracle {
        calls: AtomicUsize,
        price: f64,
    }

    #[async_trait]
    impl PriceOracle for CountingOracle {
        async fn get_prices(&self, token_ids: &[String]) -> Result<HashMap<String, f64>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(token_ids.iter().map(|id| (id.clone(), self.price)).collect())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hits_within_ttl_and_refetches_after() {
        let inner = Arc::new(CountingOracle {
            calls: AtomicUsize::new(0),
            price: 2.0,
        });
        let cache = CachedPriceOracle::new(inner.clone(), Duration::from_secs(60));

        assert_eq!(cache.get_price("mint-1").await.unwrap(), Some(2.0));
        assert_eq!(cache.get_price("mint-1").await.unwrap(), Some(2.0));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        cache.get_price("mint-1").await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_only_misses_are_fetched() {
        let inner = Arc::new(CountingOracle {
            calls: AtomicUsize::new(0),
            price: 1.0,
        });
        let cache = CachedPriceOracle::new(inner.clone(), Duration::from_secs(60));
        cache.get_price("mint-1").await.unwrap();

        let both = vec!["mint-1".to_string(), "mint-2".to_string()];
        let prices = cache.get_prices(&both).await.unwrap();

        assert_eq!(prices.len(), 2);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
        // Everything cached now
        cache.get_prices(&both).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    /// Counts calls and takes a while to answer, so callers overlap.
    struct SlowOracle {
        calls: AtomicUsize,
        fail: AtomicBool,
    }

    #[async_trait]
    impl PriceOracle for SlowOracle {
        async fn get_prices(&self, token_ids: &[String]) -> Result<HashMap<String, f64>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("upstream unavailable");
            }
            Ok(token_ids.iter().map(|id| (id.clone(), 3.0)).collect())
        }
    }

    fn slow_oracle() -> Arc<SlowOracle> {
        Arc::new(SlowOracle {
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_misses_share_one_lookup() {
        let inner = slow_oracle();
        let cache = Arc::new(CachedPriceOracle::new(inner.clone(), Duration::from_secs(30)));

        let lookups: Vec<_> = (0..20)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get_price("mint-new").await })
            })
            .collect();
        for lookup in lookups {
            assert_eq!(lookup.await.unwrap().unwrap(), Some(3.0));
        }

        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upstream_failure_serves_last_known_price() {
        let inner = slow_oracle();
        let cache = CachedPriceOracle::new(inner.clone(), Duration::from_secs(30));
        assert_eq!(cache.get_price("mint-1").await.unwrap(), Some(3.0));

        tokio::time::advance(Duration::from_secs(31)).await;
        inner.fail.store(true, Ordering::SeqCst);

        assert_eq!(cache.get_price("mint-1").await.unwrap(), Some(3.0));
        // Never seen: nothing to fall back on
        assert!(cache.get_price("mint-2").await.is_err());
    }
}
