//! Rebuilding ledger balances from the exchange's trade history.

use std::collections::BTreeMap;
use std::time::Instant;

use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use super::book::Ledger;
use super::entry::LedgerEntry;
use crate::error::LedgerError;
use crate::execution::{TradeHistorySource, TradeRecord};
use crate::market::Leg;

/// Result of a reconciliation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Skipped: the previous run was too recent.
    RateLimited,
    /// Balances were rebuilt.
    Rebuilt {
        /// Markets whose entries were replaced.
        markets_updated: usize,
        /// Trades that contributed.
        trades_used: usize,
    },
}

impl ReconcileOutcome {
    /// Markets updated, zero when rate-limited.
    pub fn markets_updated(&self) -> usize {
        match self {
            ReconcileOutcome::RateLimited => 0,
            ReconcileOutcome::Rebuilt {
                markets_updated, ..
            } => *markets_updated,
        }
    }
}

/// Fresh entries from settled buys only, keyed by market ID.
pub fn rebuild_from_trades(trades: &[TradeRecord]) -> BTreeMap<String, LedgerEntry> {
    let mut rebuilt: BTreeMap<String, LedgerEntry> = BTreeMap::new();

    for trade in trades.iter().filter(|t| t.is_settled_buy()) {
        let entry = rebuilt
            .entry(trade.market_id.clone())
            .or_insert_with(|| LedgerEntry::new(&trade.market_id, "", ""));

        match trade.leg {
            Leg::Up if entry.up_token_id.is_empty() => entry.up_token_id = trade.asset_id.clone(),
            Leg::Down if entry.down_token_id.is_empty() => {
                entry.down_token_id = trade.asset_id.clone()
            }
            _ => {}
        }
        entry.apply_buy(trade.leg, trade.size, trade.size * trade.price);
    }

    rebuilt
}

impl Ledger {
    /// Rebuild balances from `source`.
    ///
    /// Unless `force`, runs at most once per reconcile interval. Each
    /// market seen in the history is rebuilt from scratch, then its
    /// previously recorded redemptions are subtracted (clamped at zero)
    /// and carried over. Markets absent from the history are untouched.
    #[instrument(skip(self, source))]
    pub async fn reconcile(
        &self,
        source: &dyn TradeHistorySource,
        force: bool,
    ) -> Result<ReconcileOutcome, LedgerError> {
        {
            let mut last = self
                .last_reconcile
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if !force {
                if let Some(at) = *last {
                    if at.elapsed() < self.reconcile_interval {
                        return Ok(ReconcileOutcome::RateLimited);
                    }
                }
            }
            *last = Some(Instant::now());
        }

        // Fetched without holding the ledger lock.
        let trades = source.trades().await.map_err(|e| {
            warn!(error = %e, "trade history unavailable, ledger unchanged");
            LedgerError::Reconcile(e)
        })?;

        let rebuilt = rebuild_from_trades(&trades);
        let trades_used = trades.iter().filter(|t| t.is_settled_buy()).count();
        let markets_updated = rebuilt.len();

        let mut entries = self.lock_entries();
        for (market_id, mut fresh) in rebuilt {
            if let Some(previous) = entries.get(&market_id) {
                let redeemed = previous.total_redeemed;
                fresh.up_balance = (fresh.up_balance - redeemed).max(Decimal::ZERO);
                fresh.down_balance = (fresh.down_balance - redeemed).max(Decimal::ZERO);
                fresh.total_redeemed = redeemed;
                fresh.adopt_token_ids(&previous.up_token_id, &previous.down_token_id);
            }
            entries.insert(market_id, fresh);
        }

        if markets_updated > 0 {
            self.persist(&entries);
        }
        drop(entries);

        metrics::counter!(crate::metrics::RECONCILIATIONS).increment(1);
        info!(
            markets_updated,
            trades_used, "ledger reconciled from trade history"
        );

        Ok(ReconcileOutcome::Rebuilt {
            markets_updated,
            trades_used,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::Side;
    use crate::market::mock::MockTradeHistory;
    use rust_decimal_macros::dec;

    fn trade(market: &str, leg: Leg, size: Decimal, price: Decimal, status: &str) -> TradeRecord {
        TradeRecord {
            market_id: market.to_string(),
            asset_id: format!("{}-{}", market, leg),
            leg,
            side: Side::Buy,
            size,
            price,
            status: status.to_string(),
        }
    }

    fn ledger() -> (tempfile::TempDir, Ledger) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(dir.path().join("inventory.json"));
        (dir, ledger)
    }

    #[test]
    fn rebuild_ignores_unsettled_and_sells() {
        let mut sell = trade("m1", Leg::Up, dec!(50), dec!(0.5), "MATCHED");
        sell.side = Side::Sell;
        let trades = vec![
            trade("m1", Leg::Up, dec!(10), dec!(0.5), "MATCHED"),
            trade("m1", Leg::Down, dec!(4), dec!(0.25), "CONFIRMED"),
            trade("m1", Leg::Down, dec!(99), dec!(0.5), "FAILED"),
            sell,
        ];

        let rebuilt = rebuild_from_trades(&trades);
        let entry = &rebuilt["m1"];
        assert_eq!(entry.up_balance, dec!(10));
        assert_eq!(entry.down_balance, dec!(4));
        assert_eq!(entry.total_invested, dec!(6));
        assert_eq!(entry.up_token_id, "m1-UP");
        assert_eq!(entry.down_token_id, "m1-DOWN");
    }

    #[tokio::test]
    async fn reconcile_subtracts_prior_redemptions() {
        let (_dir, ledger) = ledger();
        ledger.record_buy("m1", "m1-UP", "m1-DOWN", Leg::Up, dec!(5), dec!(2.5));
        ledger.record_buy("m1", "m1-UP", "m1-DOWN", Leg::Down, dec!(5), dec!(2.5));
        ledger.record_redemption("m1", dec!(3));

        let source = MockTradeHistory::new(vec![
            trade("m1", Leg::Up, dec!(6), dec!(0.5), "MATCHED"),
            trade("m1", Leg::Down, dec!(2), dec!(0.5), "MATCHED"),
        ]);

        let outcome = ledger.reconcile(&source, true).await.unwrap();
        assert_eq!(outcome.markets_updated(), 1);

        let entry = ledger.snapshot("m1").unwrap();
        assert_eq!(entry.up_balance, dec!(3));
        assert_eq!(entry.down_balance, dec!(0));
        assert_eq!(entry.total_redeemed, dec!(3));
        assert_eq!(entry.total_invested, dec!(4));
    }

    #[tokio::test]
    async fn reconcile_is_rate_limited_without_force() {
        let (_dir, ledger) = ledger();
        let source = MockTradeHistory::new(vec![trade("m1", Leg::Up, dec!(6), dec!(0.5), "MATCHED")]);

        let first = ledger.reconcile(&source, false).await.unwrap();
        assert!(matches!(first, ReconcileOutcome::Rebuilt { markets_updated: 1, .. }));
        let after_first = ledger.entries();

        source.set_trades(vec![trade("m1", Leg::Up, dec!(60), dec!(0.5), "MATCHED")]);
        let second = ledger.reconcile(&source, false).await.unwrap();
        assert_eq!(second, ReconcileOutcome::RateLimited);
        assert_eq!(ledger.entries(), after_first);
        assert_eq!(source.calls(), 1);

        let forced = ledger.reconcile(&source, true).await.unwrap();
        assert_eq!(forced.markets_updated(), 1);
        assert_eq!(ledger.snapshot("m1").unwrap().up_balance, dec!(60));
    }

    #[tokio::test]
    async fn empty_history_is_distinct_from_rate_limit() {
        let (_dir, ledger) = ledger();
        ledger.record_buy("m1", "up", "down", Leg::Up, dec!(2), dec!(1));

        let source = MockTradeHistory::new(Vec::new());
        let outcome = ledger.reconcile(&source, true).await.unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::Rebuilt {
                markets_updated: 0,
                trades_used: 0
            }
        );
        assert_eq!(ledger.snapshot("m1").unwrap().up_balance, dec!(2));
    }

    #[tokio::test]
    async fn failed_history_fetch_leaves_ledger_unchanged() {
        let (_dir, ledger) = ledger();
        ledger.record_buy("m1", "up", "down", Leg::Up, dec!(2), dec!(1));

        let source = MockTradeHistory::failing();
        assert!(ledger.reconcile(&source, true).await.is_err());
        assert_eq!(ledger.snapshot("m1").unwrap().up_balance, dec!(2));
    }
}
