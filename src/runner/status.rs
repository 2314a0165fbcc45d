//! Live bot status shared with the HTTP API.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;

use crate::engine::Decision;
use crate::market::Market;
use crate::pricing::{Prices, Regime};

/// What the bot last saw and did on one market.
#[derive(Debug, Clone, Serialize)]
pub struct MarketView {
    /// Condition ID.
    pub condition_id: String,
    /// Slug.
    pub slug: String,
    /// Close time (RFC 3339).
    pub close_time: String,
    /// Last classified regime.
    pub regime: Option<Regime>,
    /// Last UP price.
    pub up_price: Option<Decimal>,
    /// Last DOWN price.
    pub down_price: Option<Decimal>,
    /// Last action kind.
    pub action: Option<String>,
    /// Reason given for it.
    pub reason: Option<String>,
}

impl MarketView {
    fn new(market: &Market) -> Self {
        Self {
            condition_id: market.condition_id.clone(),
            slug: market.slug.clone(),
            close_time: market.close_time.format(&Rfc3339).unwrap_or_default(),
            regime: None,
            up_price: None,
            down_price: None,
            action: None,
            reason: None,
        }
    }
}

/// Counters and per-market views updated by the tick loop.
#[derive(Debug, Default)]
pub struct BotStatus {
    ready: AtomicBool,
    ticks: AtomicU64,
    actions: AtomicU64,
    failed_orders: AtomicU64,
    markets: DashMap<String, MarketView>,
}

impl BotStatus {
    /// Fresh status, not ready.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the bot ready (markets loaded) or not.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Whether markets are loaded.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Replace the tracked market set, keeping views of markets still tracked.
    pub fn set_markets(&self, markets: &[Market]) {
        self.markets
            .retain(|id, _| markets.iter().any(|m| &m.condition_id == id));
        for market in markets {
            self.markets
                .entry(market.condition_id.clone())
                .or_insert_with(|| MarketView::new(market));
        }
    }

    /// Record one market tick.
    pub fn record_tick(&self, market: &Market, prices: &Prices, decision: &Decision) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        if decision.action.is_actionable() {
            self.actions.fetch_add(1, Ordering::Relaxed);
        }
        let mut view = self
            .markets
            .entry(market.condition_id.clone())
            .or_insert_with(|| MarketView::new(market));
        view.regime = Some(decision.regime);
        view.up_price = Some(prices.up);
        view.down_price = Some(prices.down);
        view.action = Some(decision.action.kind().to_string());
        view.reason = Some(decision.action.reason().to_string());
    }

    /// Count failed orders.
    pub fn record_failed_orders(&self, count: u64) {
        self.failed_orders.fetch_add(count, Ordering::Relaxed);
    }

    /// Market ticks so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Actionable decisions so far.
    pub fn actions(&self) -> u64 {
        self.actions.load(Ordering::Relaxed)
    }

    /// Failed orders so far.
    pub fn failed_orders(&self) -> u64 {
        self.failed_orders.load(Ordering::Relaxed)
    }

    /// Views of the tracked markets, soonest close first.
    pub fn markets(&self) -> Vec<MarketView> {
        let mut views: Vec<_> = self.markets.iter().map(|v| v.value().clone()).collect();
        views.sort_by(|a, b| a.close_time.cmp(&b.close_time));
        views
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Action;
    use rust_decimal_macros::dec;
    use time::OffsetDateTime;

    fn market(id: &str) -> Market {
        Market {
            condition_id: id.to_string(),
            slug: format!("bitcoin-up-or-down-{}", id),
            up_token_id: "up".to_string(),
            down_token_id: "down".to_string(),
            close_time: OffsetDateTime::now_utc(),
            question: None,
        }
    }

    #[test]
    fn tick_updates_counters_and_view() {
        let status = BotStatus::new();
        status.set_markets(&[market("m1")]);

        let decision = Decision {
            regime: Regime::Grey,
            action: Action::wait("no signal"),
        };
        status.record_tick(&market("m1"), &Prices::new(dec!(0.5), dec!(0.49)), &decision);

        assert_eq!(status.ticks(), 1);
        assert_eq!(status.actions(), 0);
        let view = &status.markets()[0];
        assert_eq!(view.regime, Some(Regime::Grey));
        assert_eq!(view.action.as_deref(), Some("WAIT"));
        assert_eq!(view.reason.as_deref(), Some("no signal"));
    }

    #[test]
    fn set_markets_drops_untracked() {
        let status = BotStatus::new();
        status.set_markets(&[market("m1"), market("m2")]);
        status.set_markets(&[market("m2")]);
        let ids: Vec<_> = status.markets().into_iter().map(|v| v.condition_id).collect();
        assert_eq!(ids, vec!["m2".to_string()]);
    }
}
