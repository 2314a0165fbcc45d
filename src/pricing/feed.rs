//! Price feeds consumed by the tick loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{debug, instrument, warn};

use super::cache::PriceCache;
use super::classifier::{Prices, NEUTRAL_PRICE};
use crate::market::PolymarketClient;

/// Source of current UP/DOWN prices.
///
/// Implementations never fail: an unavailable leg is reported at the
/// neutral price so the tick can proceed.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Current prices for the two legs of a market.
    async fn current_prices(&self, up_token_id: &str, down_token_id: &str) -> Prices;

    /// Whether the feed holds a quote for `token_id` younger than `max_age`.
    fn is_fresh(&self, _token_id: &str, _max_age: Duration) -> bool {
        false
    }
}

/// Pull feed over the CLOB REST API.
#[derive(Debug, Clone)]
pub struct RestPriceFeed {
    client: PolymarketClient,
}

impl RestPriceFeed {
    /// Create a feed over a CLOB client.
    pub fn new(client: PolymarketClient) -> Self {
        Self { client }
    }

    /// Best ask, falling back to the midpoint, then to the neutral price.
    #[instrument(skip(self), fields(token_id = %crate::utils::short_id(token_id)))]
    async fn leg_price(&self, token_id: &str) -> Decimal {
        match self.client.get_price(token_id).await {
            Ok(price) if price > Decimal::ZERO => return price,
            Ok(_) => debug!("empty best ask, trying midpoint"),
            Err(e) => debug!(error = %e, "best ask unavailable, trying midpoint"),
        }

        match self.client.get_midpoint(token_id).await {
            Ok(mid) if mid > Decimal::ZERO => mid,
            Ok(_) => {
                warn!("no quote available, using neutral price");
                NEUTRAL_PRICE
            }
            Err(e) => {
                warn!(error = %e, "price fetch failed, using neutral price");
                NEUTRAL_PRICE
            }
        }
    }
}

#[async_trait]
impl PriceFeed for RestPriceFeed {
    async fn current_prices(&self, up_token_id: &str, down_token_id: &str) -> Prices {
        let _timer = crate::metrics::LatencyTimer::new(crate::metrics::PRICE_FETCH_LATENCY);
        let (up, down) = tokio::join!(self.leg_price(up_token_id), self.leg_price(down_token_id));
        Prices::new(up, down)
    }
}

/// Push-fed cache with a pull fallback.
///
/// Serves both legs from the cache when both are fresh, otherwise asks
/// the fallback feed.
pub struct CachedPriceFeed {
    cache: Arc<PriceCache>,
    fallback: Arc<dyn PriceFeed>,
    max_age: Duration,
}

impl CachedPriceFeed {
    /// Wrap a cache and a fallback feed.
    pub fn new(cache: Arc<PriceCache>, fallback: Arc<dyn PriceFeed>, max_age: Duration) -> Self {
        Self {
            cache,
            fallback,
            max_age,
        }
    }
}

#[async_trait]
impl PriceFeed for CachedPriceFeed {
    async fn current_prices(&self, up_token_id: &str, down_token_id: &str) -> Prices {
        let up = self.cache.get_fresh(up_token_id, self.max_age);
        let down = self.cache.get_fresh(down_token_id, self.max_age);

        match (up, down) {
            (Some(up), Some(down)) => {
                metrics::counter!(crate::metrics::PRICE_CACHE_HITS).increment(1);
                Prices::new(up, down)
            }
            _ => {
                metrics::counter!(crate::metrics::PRICE_CACHE_MISSES).increment(1);
                debug!("price cache stale, fetching directly");
                self.fallback
                    .current_prices(up_token_id, down_token_id)
                    .await
            }
        }
    }

    fn is_fresh(&self, token_id: &str, max_age: Duration) -> bool {
        self.cache.is_fresh(token_id, max_age)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::mock::MockPriceFeed;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn cached_feed_prefers_fresh_cache() {
        let cache = Arc::new(PriceCache::new());
        cache.update("up", dec!(0.51));
        cache.update("down", dec!(0.46));

        let fallback = Arc::new(MockPriceFeed::new(dec!(0.10), dec!(0.10)));
        let feed = CachedPriceFeed::new(cache, fallback.clone(), Duration::from_secs(3));

        let prices = feed.current_prices("up", "down").await;
        assert_eq!(prices, Prices::new(dec!(0.51), dec!(0.46)));
        assert_eq!(fallback.calls(), 0);
        assert!(feed.is_fresh("up", Duration::from_secs(3)));
    }

    #[tokio::test]
    async fn cached_feed_falls_back_when_one_leg_missing() {
        let cache = Arc::new(PriceCache::new());
        cache.update("up", dec!(0.51));

        let fallback = Arc::new(MockPriceFeed::new(dec!(0.30), dec!(0.60)));
        let feed = CachedPriceFeed::new(cache, fallback.clone(), Duration::from_secs(3));

        let prices = feed.current_prices("up", "down").await;
        assert_eq!(prices, Prices::new(dec!(0.30), dec!(0.60)));
        assert_eq!(fallback.calls(), 1);
    }
}
