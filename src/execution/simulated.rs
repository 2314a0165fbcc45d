//! Dry-run stand-ins: no orders, no transactions, ledger still updated.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::info;

use super::order::PlacedOrder;
use super::traits::{MergeTarget, OrderPlacer, Settlement, TradeHistorySource, TradeRecord};
use crate::error::{SettlementError, TradingError};
use crate::ledger::Ledger;

/// Fills every buy instantly at the hinted price.
#[derive(Debug, Default)]
pub struct SimulatedOrderPlacer {
    next_id: AtomicU64,
}

impl SimulatedOrderPlacer {
    /// New simulated placer.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderPlacer for SimulatedOrderPlacer {
    async fn buy(
        &self,
        token_id: &str,
        usdc: Decimal,
        price_hint: Decimal,
    ) -> Result<PlacedOrder, TradingError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        info!(
            token = %crate::utils::short_id(token_id),
            usdc = %usdc,
            price = %price_hint,
            "[DRY RUN] buy"
        );
        Ok(PlacedOrder {
            order_id: format!("sim-{}", id),
            tokens_received: None,
            usdc_spent: Some(usdc),
        })
    }
}

/// Merges whatever the ledger says is redeemable.
#[derive(Debug, Clone)]
pub struct SimulatedSettlement {
    ledger: Arc<Ledger>,
}

impl SimulatedSettlement {
    /// Settlement backed by the ledger's own view.
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl Settlement for SimulatedSettlement {
    fn is_ready(&self) -> bool {
        true
    }

    async fn on_chain_redeemable_pairs(&self, target: &MergeTarget) -> Result<Decimal, SettlementError> {
        Ok(self.ledger.redeemable_pairs(&target.condition_id))
    }

    async fn merge(&self, target: &MergeTarget, pairs: Decimal) -> Result<Decimal, SettlementError> {
        info!(
            market = %crate::utils::short_id(&target.condition_id),
            pairs = %pairs,
            "[DRY RUN] merge"
        );
        Ok(pairs)
    }
}

/// Empty trade history: reconciliation leaves simulated entries alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedTradeHistory;

#[async_trait]
impl TradeHistorySource for SimulatedTradeHistory {
    async fn trades(&self) -> Result<Vec<TradeRecord>, TradingError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::Leg;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn placer_issues_sequential_ids() {
        let placer = SimulatedOrderPlacer::new();
        let first = placer.buy("1", dec!(5), dec!(0.5)).await.unwrap();
        let second = placer.buy("2", dec!(5), dec!(0.5)).await.unwrap();
        assert_eq!(first.order_id, "sim-0");
        assert_eq!(second.order_id, "sim-1");
        assert_eq!(first.tokens_received, None);
        assert_eq!(first.usdc_spent, Some(dec!(5)));
    }

    #[tokio::test]
    async fn settlement_reads_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(Ledger::open(dir.path().join("ledger.json")));
        ledger.record_buy("m1", "up", "down", Leg::Up, dec!(4), dec!(2));
        ledger.record_buy("m1", "up", "down", Leg::Down, dec!(3), dec!(1.5));

        let settlement = SimulatedSettlement::new(ledger);
        let target = MergeTarget {
            condition_id: "m1".to_string(),
            up_token_id: "up".to_string(),
            down_token_id: "down".to_string(),
        };
        assert!(settlement.is_ready());
        assert_eq!(settlement.on_chain_redeemable_pairs(&target).await.unwrap(), dec!(3));
        assert_eq!(settlement.merge(&target, dec!(3)).await.unwrap(), dec!(3));
        assert!(SimulatedTradeHistory.trades().await.unwrap().is_empty());
    }
}
