//! Prices and market regimes.
//!
//! - [`classifier`]: pure price → regime mapping
//! - [`cache`]: WebSocket-fed price cache
//! - [`feed`]: price feeds used by the tick loop

pub mod cache;
pub mod classifier;
pub mod feed;

pub use cache::{CachedPrice, PriceCache};
pub use classifier::{classify, Prices, Regime, Thresholds, NEUTRAL_PRICE, RESOLVED_PRICE};
pub use feed::{CachedPriceFeed, PriceFeed, RestPriceFeed};
