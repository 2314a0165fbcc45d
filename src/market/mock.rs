//! In-memory collaborators for unit and integration tests.
//!
//! Each mock implements one of the crate's collaborator traits without
//! touching the network, and records how it was called.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::{MarketError, SettlementError, TradingError};
use crate::execution::{
    MergeTarget, OrderPlacer, PlacedOrder, Settlement, TradeHistorySource, TradeRecord,
};
use crate::pricing::{PriceFeed, Prices};

use super::discovery::MarketFeed;
use super::types::Market;

/// Price feed returning fixed prices.
#[derive(Debug)]
pub struct MockPriceFeed {
    prices: Mutex<Prices>,
    calls: AtomicUsize,
}

impl MockPriceFeed {
    /// Feed that always returns `(up, down)`.
    pub fn new(up: Decimal, down: Decimal) -> Self {
        Self {
            prices: Mutex::new(Prices::new(up, down)),
            calls: AtomicUsize::new(0),
        }
    }

    /// Change the returned prices.
    pub fn set(&self, up: Decimal, down: Decimal) {
        *self.prices.lock().unwrap() = Prices::new(up, down);
    }

    /// Number of price requests served.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceFeed for MockPriceFeed {
    async fn current_prices(&self, _up_token_id: &str, _down_token_id: &str) -> Prices {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.prices.lock().unwrap()
    }
}

/// A buy the mock placer received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockBuy {
    /// Token bought.
    pub token_id: String,
    /// Collateral requested.
    pub usdc: Decimal,
    /// Price hint passed.
    pub price_hint: Decimal,
}

/// Order placer that fills everything except tokens marked as failing.
#[derive(Debug, Default)]
pub struct MockOrderPlacer {
    failing_tokens: Mutex<HashSet<String>>,
    reported_tokens: Mutex<Option<Decimal>>,
    latency: Mutex<Duration>,
    buys: Mutex<Vec<MockBuy>>,
    next_id: AtomicUsize,
}

impl MockOrderPlacer {
    /// Placer that fills every order without reporting a filled size.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every buy of `token_id`.
    pub fn fail_token(&self, token_id: &str) {
        self.failing_tokens.lock().unwrap().insert(token_id.to_string());
    }

    /// Report this many tokens received on every fill.
    pub fn report_tokens(&self, tokens: Decimal) {
        *self.reported_tokens.lock().unwrap() = Some(tokens);
    }

    /// Delay every buy.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    /// Every buy received, in arrival order.
    pub fn buys(&self) -> Vec<MockBuy> {
        self.buys.lock().unwrap().clone()
    }
}

#[async_trait]
impl OrderPlacer for MockOrderPlacer {
    async fn buy(
        &self,
        token_id: &str,
        usdc: Decimal,
        price_hint: Decimal,
    ) -> Result<PlacedOrder, TradingError> {
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        self.buys.lock().unwrap().push(MockBuy {
            token_id: token_id.to_string(),
            usdc,
            price_hint,
        });

        if self.failing_tokens.lock().unwrap().contains(token_id) {
            return Err(TradingError::OrderRejected {
                reason: "mock rejection".to_string(),
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(PlacedOrder {
            order_id: format!("mock-{}", id),
            tokens_received: *self.reported_tokens.lock().unwrap(),
            usdc_spent: None,
        })
    }
}

/// Settlement with a scripted on-chain balance.
#[derive(Debug)]
pub struct MockSettlement {
    ready: bool,
    on_chain_pairs: Mutex<Option<Decimal>>,
    fail_merge: bool,
    merges: Mutex<Vec<(String, Decimal)>>,
}

impl MockSettlement {
    /// Ready settlement holding `on_chain_pairs` pairs per market.
    pub fn ready(on_chain_pairs: Decimal) -> Self {
        Self {
            ready: true,
            on_chain_pairs: Mutex::new(Some(on_chain_pairs)),
            fail_merge: false,
            merges: Mutex::new(Vec::new()),
        }
    }

    /// Settlement without a signing key.
    pub fn unavailable() -> Self {
        Self {
            ready: false,
            ..Self::ready(Decimal::ZERO)
        }
    }

    /// Settlement whose merge transaction always reverts.
    pub fn reverting(on_chain_pairs: Decimal) -> Self {
        Self {
            fail_merge: true,
            ..Self::ready(on_chain_pairs)
        }
    }

    /// Settlement whose balance query fails.
    pub fn balance_unavailable() -> Self {
        let settlement = Self::ready(Decimal::ZERO);
        *settlement.on_chain_pairs.lock().unwrap() = None;
        settlement
    }

    /// Merges executed: `(condition_id, pairs)`.
    pub fn merges(&self) -> Vec<(String, Decimal)> {
        self.merges.lock().unwrap().clone()
    }
}

#[async_trait]
impl Settlement for MockSettlement {
    fn is_ready(&self) -> bool {
        self.ready
    }

    async fn on_chain_redeemable_pairs(
        &self,
        _target: &MergeTarget,
    ) -> Result<Decimal, SettlementError> {
        self.on_chain_pairs
            .lock()
            .unwrap()
            .ok_or_else(|| SettlementError::Rpc("mock balance unavailable".to_string()))
    }

    async fn merge(&self, target: &MergeTarget, pairs: Decimal) -> Result<Decimal, SettlementError> {
        if self.fail_merge {
            return Err(SettlementError::Reverted {
                tx_hash: "0xmock".to_string(),
            });
        }
        self.merges
            .lock()
            .unwrap()
            .push((target.condition_id.clone(), pairs));
        Ok(pairs)
    }
}

/// Trade history serving a fixed list.
#[derive(Debug, Default)]
pub struct MockTradeHistory {
    trades: Mutex<Vec<TradeRecord>>,
    fail: bool,
    calls: AtomicUsize,
}

impl MockTradeHistory {
    /// History returning `trades`.
    pub fn new(trades: Vec<TradeRecord>) -> Self {
        Self {
            trades: Mutex::new(trades),
            ..Self::default()
        }
    }

    /// History whose fetch always fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Replace the served trades.
    pub fn set_trades(&self, trades: Vec<TradeRecord>) {
        *self.trades.lock().unwrap() = trades;
    }

    /// Number of fetches.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TradeHistorySource for MockTradeHistory {
    async fn trades(&self) -> Result<Vec<TradeRecord>, TradingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(TradingError::HistoryFailed("mock outage".to_string()));
        }
        Ok(self.trades.lock().unwrap().clone())
    }
}

/// Market feed serving a fixed list.
#[derive(Debug, Default)]
pub struct MockMarketFeed {
    markets: Mutex<Vec<Market>>,
    fail: bool,
}

impl MockMarketFeed {
    /// Feed returning `markets`.
    pub fn new(markets: Vec<Market>) -> Self {
        Self {
            markets: Mutex::new(markets),
            fail: false,
        }
    }

    /// Replace the listed markets.
    pub fn set_markets(&self, markets: Vec<Market>) {
        *self.markets.lock().unwrap() = markets;
    }

    /// Feed whose discovery always fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl MarketFeed for MockMarketFeed {
    async fn active_markets(&self) -> Result<Vec<Market>, MarketError> {
        if self.fail {
            return Err(MarketError::NoActiveMarketFound);
        }
        Ok(self.markets.lock().unwrap().clone())
    }
}
