//! Up/Down markets.
//!
//! - [`types`]: `Market` and `Leg`
//! - [`discovery`]: Gamma market discovery
//! - [`client`]: CLOB REST client (prices, trade history)
//! - [`mock`]: in-memory collaborators for tests

pub mod client;
pub mod discovery;
pub mod mock;
pub mod types;

pub use client::PolymarketClient;
pub use discovery::{GammaMarketFinder, MarketFeed};
pub use types::{Leg, Market};
