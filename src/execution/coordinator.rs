//! Turns engine actions into orders and merges, and books them in the ledger.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use tracing::{error, info, instrument, warn};

use super::fills::FillRegistry;
use super::order::OrderResult;
use super::traits::{MergeTarget, OrderPlacer, Settlement, TradeHistorySource};
use crate::engine::{Action, MIN_MERGE_PAIRS};
use crate::ledger::Ledger;
use crate::market::{Leg, Market};
use crate::pricing::Prices;

/// What executing one action did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Execution {
    /// The action needed no execution.
    Idle,
    /// Orders placed, one result per leg.
    Orders(Vec<OrderResult>),
    /// Collateral recovered by a merge (zero if nothing was merged).
    Merged(Decimal),
}

impl Execution {
    /// Whether any order failed.
    pub fn has_failures(&self) -> bool {
        matches!(self, Execution::Orders(results) if results.iter().any(|r| !r.success))
    }
}

/// Coordinates order placement, settlement and ledger updates.
pub struct ExecutionCoordinator {
    ledger: Arc<Ledger>,
    placer: Arc<dyn OrderPlacer>,
    settlement: Arc<dyn Settlement>,
    history: Arc<dyn TradeHistorySource>,
    fills: Option<Arc<FillRegistry>>,
    order_timeout: Duration,
    settlement_timeout: Duration,
}

impl ExecutionCoordinator {
    /// Coordinator over the given collaborators, with 10s order and 90s settlement deadlines.
    pub fn new(
        ledger: Arc<Ledger>,
        placer: Arc<dyn OrderPlacer>,
        settlement: Arc<dyn Settlement>,
        history: Arc<dyn TradeHistorySource>,
    ) -> Self {
        Self {
            ledger,
            placer,
            settlement,
            history,
            fills: None,
            order_timeout: Duration::from_secs(10),
            settlement_timeout: Duration::from_secs(90),
        }
    }

    /// Register placed orders with a fill registry.
    pub fn with_fill_registry(mut self, fills: Arc<FillRegistry>) -> Self {
        self.fills = Some(fills);
        self
    }

    /// Override the order and settlement deadlines.
    pub fn with_timeouts(mut self, order: Duration, settlement: Duration) -> Self {
        self.order_timeout = order;
        self.settlement_timeout = settlement;
        self
    }

    /// The ledger this coordinator books into.
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Execute `action` for `market` at `prices`.
    pub async fn execute(&self, action: &Action, market: &Market, prices: &Prices) -> Execution {
        match action {
            Action::Wait { .. } | Action::Skip { .. } => Execution::Idle,
            Action::BuyMomentum {
                main_leg,
                hedge_leg,
                main_usdc,
                hedge_usdc,
                ..
            } => {
                let (main, hedge) = tokio::join!(
                    self.execute_buy(market, *main_leg, *main_usdc, prices.price(*main_leg)),
                    self.execute_buy(market, *hedge_leg, *hedge_usdc, prices.price(*hedge_leg)),
                );
                Execution::Orders(vec![main, hedge])
            }
            Action::BuyBoth {
                up_usdc, down_usdc, ..
            } => {
                let (up, down) = self
                    .execute_both_sides(market, *up_usdc, *down_usdc, prices.up, prices.down)
                    .await;
                Execution::Orders(vec![up, down])
            }
            Action::Merge { .. } => Execution::Merged(self.execute_merge(market).await),
        }
    }

    /// Buy one leg and record the fill.
    ///
    /// Tokens come from the placer when it reports them, otherwise they are
    /// estimated as `usdc / price_hint`. A failed buy leaves the ledger alone.
    #[instrument(skip(self, market), fields(market = %crate::utils::short_id(&market.condition_id), leg = %leg))]
    pub async fn execute_buy(
        &self,
        market: &Market,
        leg: Leg,
        usdc: Decimal,
        price_hint: Decimal,
    ) -> OrderResult {
        if price_hint <= Decimal::ZERO || usdc <= Decimal::ZERO {
            return OrderResult::failed(leg, format!("invalid buy: {} USDC at {}", usdc, price_hint));
        }

        let token_id = market.token_id(leg);
        let start = Instant::now();
        metrics::counter!(crate::metrics::ORDERS_SUBMITTED).increment(1);

        let placed = match tokio::time::timeout(
            self.order_timeout,
            self.placer.buy(token_id, usdc, price_hint),
        )
        .await
        {
            Ok(Ok(placed)) => placed,
            Ok(Err(e)) => {
                metrics::counter!(crate::metrics::ORDERS_FAILED).increment(1);
                warn!(error = %e, usdc = %usdc, price = %price_hint, "buy failed");
                return OrderResult::failed(leg, e.to_string());
            }
            Err(_) => {
                metrics::counter!(crate::metrics::ORDERS_FAILED).increment(1);
                warn!(timeout_ms = self.order_timeout.as_millis() as u64, "buy timed out");
                return OrderResult::failed(leg, "order placement timed out");
            }
        };
        crate::metrics::record_order_latency(start);
        metrics::counter!(crate::metrics::ORDERS_FILLED).increment(1);

        let tokens = placed
            .tokens_received
            .filter(|t| *t > Decimal::ZERO)
            .unwrap_or(usdc / price_hint);
        let spent = placed.usdc_spent.filter(|u| *u > Decimal::ZERO).unwrap_or(usdc);

        self.ledger.record_buy(
            &market.condition_id,
            &market.up_token_id,
            &market.down_token_id,
            leg,
            tokens,
            spent,
        );
        if let Some(fills) = &self.fills {
            fills.register(&placed.order_id, market, leg, tokens);
        }

        info!(
            order_id = %placed.order_id,
            tokens = %tokens,
            usdc = %spent,
            latency_ms = start.elapsed().as_millis() as u64,
            "buy filled"
        );
        OrderResult::filled(leg, placed.order_id, tokens, spent)
    }

    /// Buy both legs concurrently. One leg failing does not undo the other.
    pub async fn execute_both_sides(
        &self,
        market: &Market,
        up_usdc: Decimal,
        down_usdc: Decimal,
        up_price: Decimal,
        down_price: Decimal,
    ) -> (OrderResult, OrderResult) {
        let (up, down) = tokio::join!(
            self.execute_buy(market, Leg::Up, up_usdc, up_price),
            self.execute_buy(market, Leg::Down, down_usdc, down_price),
        );

        if up.success != down.success {
            warn!(
                market = %crate::utils::short_id(&market.condition_id),
                up_ok = up.success,
                down_ok = down.success,
                "partial both-sides fill"
            );
        }
        (up, down)
    }

    /// Merge redeemable pairs. Returns the collateral recovered, zero on any failure.
    #[instrument(skip(self, market), fields(market = %crate::utils::short_id(&market.condition_id)))]
    pub async fn execute_merge(&self, market: &Market) -> Decimal {
        let market_id = market.condition_id.as_str();

        if let Err(e) = self.ledger.reconcile(self.history.as_ref(), true).await {
            warn!(error = %e, "reconciliation before merge failed, using current ledger");
        }

        let pairs = self.ledger.redeemable_pairs(market_id);
        if pairs < MIN_MERGE_PAIRS {
            info!(pairs = %pairs, "nothing to merge");
            return Decimal::ZERO;
        }

        if !self.settlement.is_ready() {
            warn!(pairs = %pairs, "settlement unavailable, redeem manually");
            return Decimal::ZERO;
        }

        let target = MergeTarget::from(market);
        let on_chain = match tokio::time::timeout(
            self.settlement_timeout,
            self.settlement.on_chain_redeemable_pairs(&target),
        )
        .await
        {
            Ok(Ok(balance)) => balance,
            Ok(Err(e)) => {
                error!(error = %e, "on-chain balance check failed");
                return Decimal::ZERO;
            }
            Err(_) => {
                error!("on-chain balance check timed out");
                return Decimal::ZERO;
            }
        };

        let amount = pairs.min(on_chain);
        if on_chain < pairs {
            warn!(ledger = %pairs, on_chain = %on_chain, "ledger ahead of chain, merging on-chain balance");
        }
        if amount < MIN_MERGE_PAIRS {
            info!(on_chain = %on_chain, "nothing to merge on-chain");
            return Decimal::ZERO;
        }

        let recovered = match tokio::time::timeout(
            self.settlement_timeout,
            self.settlement.merge(&target, amount),
        )
        .await
        {
            Ok(Ok(recovered)) => recovered,
            Ok(Err(e)) => {
                error!(error = %e, pairs = %amount, "merge failed");
                return Decimal::ZERO;
            }
            Err(_) => {
                error!(pairs = %amount, "merge timed out");
                return Decimal::ZERO;
            }
        };

        let removed = self.ledger.record_redemption(market_id, recovered);
        crate::metrics::record_merge(recovered);
        info!(pairs = %amount, recovered = %recovered, removed = %removed, "merge complete");
        recovered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::mock::{MockOrderPlacer, MockSettlement, MockTradeHistory};
    use rust_decimal_macros::dec;
    use time::OffsetDateTime;

    fn market() -> Market {
        Market {
            condition_id: "m1".to_string(),
            slug: "bitcoin-up-or-down-test".to_string(),
            up_token_id: "up".to_string(),
            down_token_id: "down".to_string(),
            close_time: OffsetDateTime::now_utc() + time::Duration::minutes(30),
            question: None,
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        ledger: Arc<Ledger>,
        placer: Arc<MockOrderPlacer>,
        history: Arc<MockTradeHistory>,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(Ledger::open(dir.path().join("ledger.json")));
        Harness {
            _dir: dir,
            ledger,
            placer: Arc::new(MockOrderPlacer::new()),
            history: Arc::new(MockTradeHistory::new(Vec::new())),
        }
    }

    fn coordinator(h: &Harness, settlement: MockSettlement) -> ExecutionCoordinator {
        ExecutionCoordinator::new(
            h.ledger.clone(),
            h.placer.clone(),
            Arc::new(settlement),
            h.history.clone(),
        )
    }

    #[tokio::test]
    async fn buy_estimates_tokens_from_price_hint() {
        let h = harness();
        let coord = coordinator(&h, MockSettlement::ready(dec!(0)));

        let result = coord.execute_buy(&market(), Leg::Up, dec!(5), dec!(0.5)).await;
        assert!(result.success);
        assert_eq!(result.tokens_received, dec!(10));

        let entry = h.ledger.snapshot("m1").unwrap();
        assert_eq!(entry.up_balance, dec!(10));
        assert_eq!(entry.total_invested, dec!(5));
    }

    #[tokio::test]
    async fn buy_prefers_reported_fill() {
        let h = harness();
        h.placer.report_tokens(dec!(9.5));
        let coord = coordinator(&h, MockSettlement::ready(dec!(0)));

        let result = coord.execute_buy(&market(), Leg::Down, dec!(5), dec!(0.5)).await;
        assert_eq!(result.tokens_received, dec!(9.5));
        assert_eq!(h.ledger.snapshot("m1").unwrap().down_balance, dec!(9.5));
    }

    #[tokio::test]
    async fn failed_buy_leaves_ledger_untouched() {
        let h = harness();
        h.placer.fail_token("up");
        let coord = coordinator(&h, MockSettlement::ready(dec!(0)));

        let result = coord.execute_buy(&market(), Leg::Up, dec!(5), dec!(0.5)).await;
        assert!(!result.success);
        assert!(result.error.is_some());
        assert!(h.ledger.snapshot("m1").is_none());
        assert_eq!(h.placer.buys().len(), 1);
    }

    #[tokio::test]
    async fn slow_buy_times_out_as_failure() {
        let h = harness();
        h.placer.set_latency(Duration::from_millis(200));
        let coord = coordinator(&h, MockSettlement::ready(dec!(0)))
            .with_timeouts(Duration::from_millis(20), Duration::from_secs(1));

        let result = coord.execute_buy(&market(), Leg::Up, dec!(5), dec!(0.5)).await;
        assert!(!result.success);
        assert!(h.ledger.is_empty());
    }

    #[tokio::test]
    async fn both_sides_run_concurrently() {
        let h = harness();
        h.placer.set_latency(Duration::from_millis(100));
        let coord = coordinator(&h, MockSettlement::ready(dec!(0)));

        let start = Instant::now();
        let (up, down) = coord
            .execute_both_sides(&market(), dec!(5), dec!(5), dec!(0.5), dec!(0.45))
            .await;
        assert!(start.elapsed() < Duration::from_millis(190));
        assert!(up.success && down.success);
    }

    #[tokio::test]
    async fn partial_both_sides_fill_is_kept() {
        let h = harness();
        h.placer.fail_token("down");
        let coord = coordinator(&h, MockSettlement::ready(dec!(0)));

        let (up, down) = coord
            .execute_both_sides(&market(), dec!(5), dec!(5), dec!(0.5), dec!(0.45))
            .await;
        assert!(up.success);
        assert!(!down.success);
        let entry = h.ledger.snapshot("m1").unwrap();
        assert_eq!(entry.up_balance, dec!(10));
        assert_eq!(entry.down_balance, dec!(0));
    }

    #[tokio::test]
    async fn merge_caps_to_on_chain_balance() {
        let h = harness();
        h.ledger.record_buy("m1", "up", "down", Leg::Up, dec!(5), dec!(2.5));
        h.ledger.record_buy("m1", "up", "down", Leg::Down, dec!(5), dec!(2.5));
        let coord = coordinator(&h, MockSettlement::ready(dec!(3)));

        let recovered = coord.execute_merge(&market()).await;
        assert_eq!(recovered, dec!(3));
        let entry = h.ledger.snapshot("m1").unwrap();
        assert_eq!(entry.up_balance, dec!(2));
        assert_eq!(entry.down_balance, dec!(2));
        assert_eq!(entry.total_redeemed, dec!(3));
        assert_eq!(h.history.calls(), 1);
    }

    #[tokio::test]
    async fn merge_without_settlement_changes_nothing() {
        let h = harness();
        h.ledger.record_buy("m1", "up", "down", Leg::Up, dec!(5), dec!(2.5));
        h.ledger.record_buy("m1", "up", "down", Leg::Down, dec!(5), dec!(2.5));

        for settlement in [
            MockSettlement::unavailable(),
            MockSettlement::reverting(dec!(5)),
            MockSettlement::balance_unavailable(),
            MockSettlement::ready(dec!(0)),
        ] {
            let coord = coordinator(&h, settlement);
            assert_eq!(coord.execute_merge(&market()).await, dec!(0));
            assert_eq!(h.ledger.redeemable_pairs("m1"), dec!(5));
        }
    }

    #[tokio::test]
    async fn merge_with_nothing_redeemable_skips_settlement() {
        let h = harness();
        h.ledger.record_buy("m1", "up", "down", Leg::Up, dec!(5), dec!(2.5));
        let settlement = Arc::new(MockSettlement::ready(dec!(5)));
        let coord = ExecutionCoordinator::new(
            h.ledger.clone(),
            h.placer.clone(),
            settlement.clone(),
            h.history.clone(),
        );

        assert_eq!(coord.execute_merge(&market()).await, dec!(0));
        assert!(settlement.merges().is_empty());
    }

    #[tokio::test]
    async fn dispatch_by_action() {
        let h = harness();
        let coord = coordinator(&h, MockSettlement::ready(dec!(0)));
        let prices = Prices::new(dec!(0.88), dec!(0.10));

        let idle = coord.execute(&Action::wait("grey"), &market(), &prices).await;
        assert_eq!(idle, Execution::Idle);

        let action = Action::BuyMomentum {
            main_leg: Leg::Up,
            hedge_leg: Leg::Down,
            main_usdc: dec!(8.8),
            hedge_usdc: dec!(1),
            reason: "momentum".to_string(),
        };
        let Execution::Orders(results) = coord.execute(&action, &market(), &prices).await else {
            panic!("expected orders");
        };
        assert_eq!(results.len(), 2);
        let entry = h.ledger.snapshot("m1").unwrap();
        assert_eq!(entry.up_balance, dec!(10));
        assert_eq!(entry.down_balance, dec!(10));
        assert_eq!(entry.total_invested, dec!(9.8));
    }
}
