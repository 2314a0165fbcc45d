//! The polling loop.
//!
//! Every poll interval each tracked market goes through
//! prices -> classify/decide -> execute -> ledger. Markets are refreshed
//! from the market feed on a slower cadence. A failure on one market is
//! logged and never stops the others.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use time::OffsetDateTime;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, instrument, warn};

use super::status::BotStatus;
use crate::engine::{Decision, DecisionEngine, MIN_MERGE_PAIRS};
use crate::execution::{Execution, ExecutionCoordinator};
use crate::market::{Market, MarketFeed};
use crate::pricing::PriceFeed;

/// How long a closed market with unmerged pairs stays tracked.
const MERGE_GRACE: time::Duration = time::Duration::hours(1);

/// Loop cadence.
#[derive(Debug, Clone, Copy)]
pub struct BotTiming {
    /// Time between ticks.
    pub poll_interval: Duration,
    /// Time between market refreshes.
    pub market_refresh: Duration,
}

impl Default for BotTiming {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(2000),
            market_refresh: Duration::from_secs(600),
        }
    }
}

/// Token and market IDs published to the WebSocket listeners.
#[derive(Debug)]
pub struct Subscriptions {
    /// Token IDs of every tracked leg.
    pub tokens: watch::Sender<Vec<String>>,
    /// Condition IDs of every tracked market.
    pub markets: watch::Sender<Vec<String>>,
}

impl Subscriptions {
    /// New senders plus their receivers `(tokens, markets)`.
    pub fn channel() -> (Self, watch::Receiver<Vec<String>>, watch::Receiver<Vec<String>>) {
        let (tokens, tokens_rx) = watch::channel(Vec::new());
        let (markets, markets_rx) = watch::channel(Vec::new());
        (Self { tokens, markets }, tokens_rx, markets_rx)
    }

    fn publish(&self, markets: &[Market]) {
        let tokens: Vec<String> = markets
            .iter()
            .flat_map(|m| [m.up_token_id.clone(), m.down_token_id.clone()])
            .collect();
        let ids: Vec<String> = markets.iter().map(|m| m.condition_id.clone()).collect();
        self.tokens.send_if_modified(|current| replace_if_changed(current, tokens));
        self.markets.send_if_modified(|current| replace_if_changed(current, ids));
    }
}

fn replace_if_changed(current: &mut Vec<String>, next: Vec<String>) -> bool {
    if *current == next {
        return false;
    }
    *current = next;
    true
}

/// The trading bot: market set, engine, coordinator and feeds.
pub struct Bot {
    engine: Arc<DecisionEngine>,
    coordinator: Arc<ExecutionCoordinator>,
    prices: Arc<dyn PriceFeed>,
    market_feed: Arc<dyn MarketFeed>,
    status: Arc<BotStatus>,
    timing: BotTiming,
    markets: RwLock<Vec<Market>>,
    subscriptions: Option<Subscriptions>,
}

impl Bot {
    /// Assemble a bot from its collaborators.
    pub fn new(
        engine: Arc<DecisionEngine>,
        coordinator: Arc<ExecutionCoordinator>,
        prices: Arc<dyn PriceFeed>,
        market_feed: Arc<dyn MarketFeed>,
        status: Arc<BotStatus>,
    ) -> Self {
        Self {
            engine,
            coordinator,
            prices,
            market_feed,
            status,
            timing: BotTiming::default(),
            markets: RwLock::new(Vec::new()),
            subscriptions: None,
        }
    }

    /// Override the loop cadence.
    pub fn with_timing(mut self, timing: BotTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Publish tracked tokens and markets to the feeds.
    pub fn with_subscriptions(mut self, subscriptions: Subscriptions) -> Self {
        self.subscriptions = Some(subscriptions);
        self
    }

    /// Currently tracked markets.
    pub async fn markets(&self) -> Vec<Market> {
        self.markets.read().await.clone()
    }

    /// Reload the market set from the feed.
    ///
    /// On failure the previous set is kept. Closed markets that still hold
    /// mergeable pairs stay tracked for a grace period so the resolution
    /// branch can redeem them.
    #[instrument(skip(self))]
    pub async fn refresh_markets(&self) -> usize {
        let fresh = match self.market_feed.active_markets().await {
            Ok(markets) => markets,
            Err(e) => {
                warn!(error = %e, "market refresh failed, keeping current markets");
                return self.markets.read().await.len();
            }
        };

        let now = OffsetDateTime::now_utc();
        let ledger = self.coordinator.ledger();
        let mut markets = self.markets.write().await;
        let lingering: Vec<Market> = markets
            .iter()
            .filter(|m| !fresh.iter().any(|f| f.condition_id == m.condition_id))
            .filter(|m| now - m.close_time < MERGE_GRACE)
            .filter(|m| ledger.redeemable_pairs(&m.condition_id) > MIN_MERGE_PAIRS)
            .cloned()
            .collect();

        for market in &lingering {
            debug!(market = %crate::utils::short_id(&market.condition_id), "keeping closed market with pairs to merge");
        }

        *markets = fresh.into_iter().chain(lingering).collect();
        for market in markets.iter() {
            self.engine.note_close(&market.condition_id, market.close_time);
        }
        self.engine.prune_closed(now, MERGE_GRACE);
        self.status.set_markets(&markets);
        self.status.set_ready(!markets.is_empty());
        if let Some(subscriptions) = &self.subscriptions {
            subscriptions.publish(&markets);
        }

        info!(count = markets.len(), "tracking markets");
        markets.len()
    }

    /// Run one tick on one market.
    pub async fn tick_market(&self, market: &Market) -> (Decision, Execution) {
        let prices = self
            .prices
            .current_prices(&market.up_token_id, &market.down_token_id)
            .await;
        let snapshot = self.coordinator.ledger().snapshot(&market.condition_id);
        let minutes_to_close = market.minutes_to_close();

        let decision = self.engine.decide(
            &market.condition_id,
            &prices,
            snapshot.as_ref(),
            minutes_to_close,
        );

        info!(
            market = %crate::utils::short_id(&market.condition_id),
            slug = %market.slug,
            regime = %decision.regime,
            up = %prices.up,
            down = %prices.down,
            minutes_left = minutes_to_close,
            action = %decision.action.kind(),
            reason = %decision.action.reason(),
            "tick"
        );
        crate::metrics::inc_ticks(&decision.regime.to_string());
        crate::metrics::inc_actions(&decision.action.kind().to_string());
        self.status.record_tick(market, &prices, &decision);

        let execution = self.coordinator.execute(&decision.action, market, &prices).await;
        if let Execution::Orders(results) = &execution {
            let failed = results.iter().filter(|r| !r.success).count() as u64;
            if failed > 0 {
                self.status.record_failed_orders(failed);
            }
        }

        (decision, execution)
    }

    /// Tick every tracked market. Markets run concurrently and independently.
    pub async fn tick(&self) -> usize {
        let markets = self.markets().await;
        join_all(markets.iter().map(|m| self.tick_market(m))).await;
        markets.len()
    }

    /// Run until `shutdown` flips to `true`.
    ///
    /// The tick in progress completes before the loop exits.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_ms = self.timing.poll_interval.as_millis() as u64,
            refresh_s = self.timing.market_refresh.as_secs(),
            "bot loop starting"
        );

        self.refresh_markets().await;
        let mut last_refresh = Instant::now();
        let mut interval = tokio::time::interval(self.timing.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = interval.tick() => {}
            }
            if *shutdown.borrow() {
                break;
            }

            if last_refresh.elapsed() >= self.timing.market_refresh {
                self.refresh_markets().await;
                last_refresh = Instant::now();
            }

            let ticked = self.tick().await;
            if ticked == 0 {
                debug!("no markets to tick");
            }
        }

        info!(
            ticks = self.status.ticks(),
            actions = self.status.actions(),
            "bot loop stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Action, EngineConfig};
    use crate::ledger::Ledger;
    use crate::market::mock::{
        MockMarketFeed, MockOrderPlacer, MockPriceFeed, MockSettlement, MockTradeHistory,
    };
    use crate::market::Leg;
    use crate::pricing::Regime;
    use rust_decimal_macros::dec;

    struct Harness {
        _dir: tempfile::TempDir,
        ledger: Arc<Ledger>,
        placer: Arc<MockOrderPlacer>,
        prices: Arc<MockPriceFeed>,
        status: Arc<BotStatus>,
        feed: Arc<MockMarketFeed>,
        bot: Bot,
    }

    fn market(id: &str, minutes: i64) -> Market {
        Market {
            condition_id: id.to_string(),
            slug: format!("bitcoin-up-or-down-{}", id),
            up_token_id: format!("{}-up", id),
            down_token_id: format!("{}-down", id),
            close_time: OffsetDateTime::now_utc() + time::Duration::minutes(minutes),
            question: None,
        }
    }

    fn harness(feed: MockMarketFeed) -> Harness {
        harness_with(feed, EngineConfig::default())
    }

    fn harness_with(feed: MockMarketFeed, engine: EngineConfig) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(Ledger::open(dir.path().join("ledger.json")));
        let placer = Arc::new(MockOrderPlacer::new());
        let prices = Arc::new(MockPriceFeed::new(dec!(0.50), dec!(0.49)));
        let status = Arc::new(BotStatus::new());
        let feed = Arc::new(feed);
        let coordinator = Arc::new(ExecutionCoordinator::new(
            ledger.clone(),
            placer.clone(),
            Arc::new(MockSettlement::ready(dec!(100))),
            Arc::new(MockTradeHistory::new(Vec::new())),
        ));
        let bot = Bot::new(
            Arc::new(DecisionEngine::new(engine)),
            coordinator,
            prices.clone(),
            feed.clone(),
            status.clone(),
        );
        Harness {
            _dir: dir,
            ledger,
            placer,
            prices,
            status,
            feed,
            bot,
        }
    }

    #[tokio::test]
    async fn refresh_publishes_tokens() {
        let h = harness(MockMarketFeed::new(vec![market("m1", 30)]));
        let (subs, tokens_rx, markets_rx) = Subscriptions::channel();
        let bot = h.bot.with_subscriptions(subs);

        assert_eq!(bot.refresh_markets().await, 1);
        assert_eq!(*tokens_rx.borrow(), vec!["m1-up".to_string(), "m1-down".to_string()]);
        assert_eq!(*markets_rx.borrow(), vec!["m1".to_string()]);
        assert!(h.status.is_ready());
    }

    #[tokio::test]
    async fn failed_refresh_keeps_markets() {
        let h = harness(MockMarketFeed::failing());
        assert_eq!(h.bot.refresh_markets().await, 0);
        assert!(!h.status.is_ready());
    }

    #[tokio::test]
    async fn grey_tick_waits() {
        let h = harness(MockMarketFeed::new(vec![market("m1", 30)]));
        h.bot.refresh_markets().await;

        let (decision, execution) = h.bot.tick_market(&market("m1", 30)).await;
        assert_eq!(decision.regime, Regime::Grey);
        assert!(matches!(decision.action, Action::Wait { .. }));
        assert_eq!(execution, Execution::Idle);
        assert_eq!(h.status.ticks(), 1);
    }

    #[tokio::test]
    async fn arbitrage_tick_buys_both_legs() {
        let h = harness(MockMarketFeed::new(vec![market("m1", 30)]));
        h.bot.refresh_markets().await;
        h.prices.set(dec!(0.50), dec!(0.45));

        assert_eq!(h.bot.tick().await, 1);
        assert_eq!(h.placer.buys().len(), 2);
        let entry = h.ledger.snapshot("m1").unwrap();
        assert!(entry.balance(Leg::Up) > dec!(0));
        assert!(entry.balance(Leg::Down) > dec!(0));
        assert_eq!(h.status.actions(), 1);
    }

    #[tokio::test]
    async fn failed_leg_is_counted_and_other_markets_proceed() {
        let h = harness(MockMarketFeed::new(vec![market("m1", 30), market("m2", 40)]));
        h.bot.refresh_markets().await;
        h.prices.set(dec!(0.50), dec!(0.45));
        h.placer.fail_token("m1-up");

        h.bot.tick().await;
        assert_eq!(h.status.failed_orders(), 1);
        assert_eq!(h.status.ticks(), 2);
        let m2 = h.ledger.snapshot("m2").unwrap();
        assert!(m2.redeemable_pairs() > dec!(0));
    }

    #[tokio::test]
    async fn closed_market_with_pairs_lingers() {
        let h = harness(MockMarketFeed::new(Vec::new()));
        *h.bot.markets.write().await = vec![market("old", -5)];
        h.ledger
            .record_buy("old", "old-up", "old-down", Leg::Up, dec!(3), dec!(1.5));
        h.ledger
            .record_buy("old", "old-up", "old-down", Leg::Down, dec!(3), dec!(1.5));

        assert_eq!(h.bot.refresh_markets().await, 1);
        assert_eq!(h.bot.markets().await[0].condition_id, "old");
    }

    #[tokio::test]
    async fn spend_cap_survives_discovery_gap() {
        let config = EngineConfig {
            arb_order_usdc: dec!(5),
            arb_max_usdc: dec!(10),
            arb_cooldown: Duration::ZERO,
            ..EngineConfig::default()
        };
        let h = harness_with(MockMarketFeed::new(vec![market("m1", 30)]), config);
        h.bot.refresh_markets().await;
        h.prices.set(dec!(0.50), dec!(0.45));
        // No pairs booked, so nothing keeps the market tracked once it is unlisted.
        h.placer.fail_token("m1-up");
        h.placer.fail_token("m1-down");

        let (first, _) = h.bot.tick_market(&market("m1", 30)).await;
        assert!(matches!(first.action, Action::BuyBoth { .. }));

        h.feed.set_markets(Vec::new());
        assert_eq!(h.bot.refresh_markets().await, 0);
        h.feed.set_markets(vec![market("m1", 30)]);
        assert_eq!(h.bot.refresh_markets().await, 1);

        let (after, execution) = h.bot.tick_market(&market("m1", 30)).await;
        assert!(matches!(&after.action, Action::Skip { reason } if reason.contains("cap")));
        assert_eq!(execution, Execution::Idle);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let h = harness(MockMarketFeed::new(vec![market("m1", 30)]));
        let bot = Arc::new(h.bot.with_timing(BotTiming {
            poll_interval: Duration::from_millis(10),
            market_refresh: Duration::from_secs(600),
        }));
        let (tx, rx) = watch::channel(false);
        let handle = {
            let bot = bot.clone();
            tokio::spawn(async move { bot.run(rx).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();
        assert!(h.status.ticks() > 0);
    }
}
