//! Push-fed price cache.
//!
//! Written by the market WebSocket, read by the tick loop. Single writer,
//! many readers; staleness is checked on read, never enforced on write.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use rust_decimal::Decimal;

/// A cached quote and when it was observed.
#[derive(Debug, Clone, Copy)]
pub struct CachedPrice {
    /// Best ask for the token.
    pub price: Decimal,
    /// Receive time.
    pub updated_at: Instant,
}

/// Latest price per token id.
#[derive(Debug, Default)]
pub struct PriceCache {
    prices: DashMap<String, CachedPrice>,
}

impl PriceCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a price observed now.
    pub fn update(&self, token_id: &str, price: Decimal) {
        self.update_at(token_id, price, Instant::now());
    }

    /// Store a price observed at `at`.
    pub fn update_at(&self, token_id: &str, price: Decimal, at: Instant) {
        self.prices.insert(
            token_id.to_string(),
            CachedPrice {
                price,
                updated_at: at,
            },
        );
    }

    /// Latest price regardless of age.
    pub fn get(&self, token_id: &str) -> Option<CachedPrice> {
        self.prices.get(token_id).map(|entry| *entry)
    }

    /// Latest price if younger than `max_age`.
    pub fn get_fresh(&self, token_id: &str, max_age: Duration) -> Option<Decimal> {
        self.get(token_id)
            .filter(|cached| cached.updated_at.elapsed() < max_age)
            .map(|cached| cached.price)
    }

    /// Whether a token has a quote younger than `max_age`.
    pub fn is_fresh(&self, token_id: &str, max_age: Duration) -> bool {
        self.get_fresh(token_id, max_age).is_some()
    }

    /// Number of tokens with a quote.
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn fresh_and_stale_quotes() {
        let cache = PriceCache::new();
        cache.update("up", dec!(0.52));
        assert!(cache.is_fresh("up", Duration::from_secs(3)));
        assert_eq!(cache.get_fresh("up", Duration::from_secs(3)), Some(dec!(0.52)));
        assert!(!cache.is_fresh("down", Duration::from_secs(3)));

        let old = Instant::now() - Duration::from_secs(10);
        cache.update_at("down", dec!(0.47), old);
        assert!(!cache.is_fresh("down", Duration::from_secs(3)));
        assert_eq!(cache.get("down").map(|c| c.price), Some(dec!(0.47)));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn later_update_replaces_earlier() {
        let cache = PriceCache::new();
        cache.update("up", dec!(0.40));
        cache.update("up", dec!(0.41));
        assert_eq!(cache.get("up").map(|c| c.price), Some(dec!(0.41)));
        assert_eq!(cache.len(), 1);
    }
}
