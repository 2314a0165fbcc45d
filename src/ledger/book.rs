//! The position ledger: one entry per market, write-through to disk.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use tracing::{debug, error, info};

use super::entry::LedgerEntry;
use super::store::{self, LedgerDocument};
use crate::market::Leg;

/// Default minimum spacing between unforced reconciliations.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(120);

/// Durable per-market token balances.
///
/// All mutations are serialized by a single ledger-wide lock and persisted
/// before the lock is released. A failed write is logged; the in-memory
/// state stays authoritative for the life of the process.
#[derive(Debug)]
pub struct Ledger {
    /// Ledger file.
    path: PathBuf,
    /// Entries by market ID.
    pub(super) entries: Mutex<LedgerDocument>,
    /// When the last reconciliation started.
    pub(super) last_reconcile: Mutex<Option<Instant>>,
    /// Minimum spacing between unforced reconciliations.
    pub(super) reconcile_interval: Duration,
}

impl Ledger {
    /// Load the ledger at `path`, starting empty if it is missing or corrupt.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = store::load(&path);
        Self {
            path,
            entries: Mutex::new(entries),
            last_reconcile: Mutex::new(None),
            reconcile_interval: DEFAULT_RECONCILE_INTERVAL,
        }
    }

    /// Override the reconciliation rate limit.
    pub fn with_reconcile_interval(mut self, interval: Duration) -> Self {
        self.reconcile_interval = interval;
        self
    }

    /// Ledger file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(super) fn lock_entries(&self) -> MutexGuard<'_, LedgerDocument> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Persist while the caller still holds the lock.
    pub(super) fn persist(&self, entries: &LedgerDocument) {
        if let Err(e) = store::save(&self.path, entries) {
            error!(error = %e, "ledger write failed, keeping in-memory state");
            metrics::counter!(crate::metrics::LEDGER_WRITE_FAILURES).increment(1);
        }
    }

    /// Record a filled buy, creating the market's entry if needed.
    pub fn record_buy(
        &self,
        market_id: &str,
        up_token_id: &str,
        down_token_id: &str,
        leg: Leg,
        tokens: Decimal,
        usdc_spent: Decimal,
    ) {
        let mut entries = self.lock_entries();
        let entry = entries
            .entry(market_id.to_string())
            .or_insert_with(|| LedgerEntry::new(market_id, up_token_id, down_token_id));
        entry.adopt_token_ids(up_token_id, down_token_id);
        entry.apply_buy(leg, tokens, usdc_spent);

        info!(
            market = %crate::utils::short_id(market_id),
            leg = %leg,
            tokens = %tokens,
            usdc = %usdc_spent,
            up = %entry.up_balance,
            down = %entry.down_balance,
            "ledger: buy recorded"
        );

        self.persist(&entries);
    }

    /// Remove up to `pairs` merged pairs. Returns the amount actually removed.
    ///
    /// No-op (returns zero) for an untracked market.
    pub fn record_redemption(&self, market_id: &str, pairs: Decimal) -> Decimal {
        let mut entries = self.lock_entries();
        let Some(entry) = entries.get_mut(market_id) else {
            debug!(market = %crate::utils::short_id(market_id), "redemption for untracked market ignored");
            return Decimal::ZERO;
        };

        let removed = entry.apply_redemption(pairs);
        info!(
            market = %crate::utils::short_id(market_id),
            requested = %pairs,
            removed = %removed,
            up = %entry.up_balance,
            down = %entry.down_balance,
            "ledger: redemption recorded"
        );

        self.persist(&entries);
        removed
    }

    /// `min(up, down)` for a market, zero if untracked.
    pub fn redeemable_pairs(&self, market_id: &str) -> Decimal {
        self.lock_entries()
            .get(market_id)
            .map(LedgerEntry::redeemable_pairs)
            .unwrap_or(Decimal::ZERO)
    }

    /// Surplus leg and amount. Untracked markets and ties report `(Down, 0)`.
    pub fn imbalance(&self, market_id: &str) -> (Leg, Decimal) {
        self.lock_entries()
            .get(market_id)
            .map(LedgerEntry::imbalance)
            .unwrap_or((Leg::Down, Decimal::ZERO))
    }

    /// Copy of one market's entry.
    pub fn snapshot(&self, market_id: &str) -> Option<LedgerEntry> {
        self.lock_entries().get(market_id).cloned()
    }

    /// Copy of every entry, ordered by market ID.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.lock_entries().values().cloned().collect()
    }

    /// Number of tracked markets.
    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    /// Whether no market is tracked.
    pub fn is_empty(&self) -> bool {
        self.lock_entries().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn ledger() -> (tempfile::TempDir, Ledger) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(dir.path().join("inventory.json"));
        (dir, ledger)
    }

    #[test]
    fn buy_creates_entry_and_persists() {
        let (_dir, ledger) = ledger();
        ledger.record_buy("m1", "up", "down", Leg::Up, dec!(10), dec!(5));
        ledger.record_buy("m1", "up", "down", Leg::Down, dec!(8), dec!(4));

        let entry = ledger.snapshot("m1").unwrap();
        assert_eq!(entry.up_balance, dec!(10));
        assert_eq!(entry.down_balance, dec!(8));
        assert_eq!(entry.total_invested, dec!(9));
        assert_eq!(entry.up_token_id, "up");

        let reopened = Ledger::open(ledger.path());
        assert_eq!(reopened.snapshot("m1"), Some(entry));
    }

    #[test]
    fn redemption_clamps_to_smaller_leg() {
        let (_dir, ledger) = ledger();
        ledger.record_buy("m1", "up", "down", Leg::Up, dec!(3), dec!(1.5));
        ledger.record_buy("m1", "up", "down", Leg::Down, dec!(2), dec!(1));

        assert_eq!(ledger.record_redemption("m1", dec!(1000)), dec!(2));
        let entry = ledger.snapshot("m1").unwrap();
        assert_eq!(entry.up_balance, dec!(1));
        assert_eq!(entry.down_balance, dec!(0));
        assert_eq!(ledger.redeemable_pairs("m1"), dec!(0));
        assert_eq!(entry.total_redeemed, dec!(2));
    }

    #[test]
    fn untracked_market_queries_are_zero() {
        let (_dir, ledger) = ledger();
        assert_eq!(ledger.redeemable_pairs("nope"), dec!(0));
        assert_eq!(ledger.imbalance("nope"), (Leg::Down, dec!(0)));
        assert_eq!(ledger.record_redemption("nope", dec!(5)), dec!(0));
        assert!(ledger.is_empty());
    }

    #[test]
    fn balances_never_negative_over_mixed_sequence() {
        let (_dir, ledger) = ledger();
        let steps = [
            (Some((Leg::Up, dec!(4))), None),
            (None, Some(dec!(3))),
            (Some((Leg::Down, dec!(1.5))), None),
            (None, Some(dec!(10))),
            (Some((Leg::Down, dec!(6))), None),
            (None, Some(dec!(0.5))),
        ];

        for (buy, redeem) in steps {
            if let Some((leg, tokens)) = buy {
                ledger.record_buy("m1", "up", "down", leg, tokens, tokens / dec!(2));
            }
            if let Some(pairs) = redeem {
                ledger.record_redemption("m1", pairs);
            }
            let entry = ledger.snapshot("m1").unwrap();
            assert!(entry.up_balance >= Decimal::ZERO);
            assert!(entry.down_balance >= Decimal::ZERO);
            assert!(ledger.redeemable_pairs("m1") <= entry.up_balance.min(entry.down_balance));
        }
    }

    #[test]
    fn concurrent_buys_are_not_lost() {
        let (_dir, ledger) = ledger();
        let ledger = Arc::new(ledger);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    let leg = if i % 2 == 0 { Leg::Up } else { Leg::Down };
                    for _ in 0..5 {
                        ledger.record_buy("m1", "up", "down", leg, dec!(1), dec!(0.5));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let entry = ledger.snapshot("m1").unwrap();
        assert_eq!(entry.up_balance, dec!(20));
        assert_eq!(entry.down_balance, dec!(20));
        assert_eq!(entry.total_invested, dec!(20));
    }

    #[test]
    fn failed_write_keeps_in_memory_state() {
        let dir = tempfile::tempdir().unwrap();
        // A directory at the ledger path makes the rename fail.
        let path = dir.path().join("ledger.json");
        std::fs::create_dir(&path).unwrap();

        let ledger = Ledger::open(&path);
        ledger.record_buy("m1", "up", "down", Leg::Up, dec!(2), dec!(1));
        assert_eq!(ledger.snapshot("m1").unwrap().up_balance, dec!(2));
    }
}
