//! Per-market ledger entry.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::market::Leg;

/// Token balances and collateral totals for one market.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Market condition ID.
    #[serde(default)]
    pub condition_id: String,
    /// UP token ID.
    #[serde(default)]
    pub up_token_id: String,
    /// DOWN token ID.
    #[serde(default)]
    pub down_token_id: String,
    /// UP tokens held.
    #[serde(default)]
    pub up_balance: Decimal,
    /// DOWN tokens held.
    #[serde(default)]
    pub down_balance: Decimal,
    /// Cumulative collateral spent on buys.
    #[serde(default, rename = "total_invested_usdc")]
    pub total_invested: Decimal,
    /// Cumulative collateral recovered through merges.
    #[serde(default, rename = "total_merged_usdc")]
    pub total_redeemed: Decimal,
}

impl LedgerEntry {
    /// Create an empty entry for a market.
    pub fn new(condition_id: &str, up_token_id: &str, down_token_id: &str) -> Self {
        Self {
            condition_id: condition_id.to_string(),
            up_token_id: up_token_id.to_string(),
            down_token_id: down_token_id.to_string(),
            ..Default::default()
        }
    }

    /// Balance of one leg.
    pub fn balance(&self, leg: Leg) -> Decimal {
        match leg {
            Leg::Up => self.up_balance,
            Leg::Down => self.down_balance,
        }
    }

    /// Pairs that can be merged: `min(up, down)`.
    pub fn redeemable_pairs(&self) -> Decimal {
        self.up_balance.min(self.down_balance)
    }

    /// Leg holding the surplus and its size. Ties report DOWN with zero.
    pub fn imbalance(&self) -> (Leg, Decimal) {
        if self.up_balance > self.down_balance {
            (Leg::Up, self.up_balance - self.down_balance)
        } else {
            (Leg::Down, self.down_balance - self.up_balance)
        }
    }

    /// Apply a buy of `tokens` on `leg` costing `collateral`.
    pub(crate) fn apply_buy(&mut self, leg: Leg, tokens: Decimal, collateral: Decimal) {
        let tokens = tokens.max(Decimal::ZERO);
        match leg {
            Leg::Up => self.up_balance += tokens,
            Leg::Down => self.down_balance += tokens,
        }
        self.total_invested += collateral.max(Decimal::ZERO);
    }

    /// Remove up to `pairs` from both legs. Returns the clamped amount removed.
    pub(crate) fn apply_redemption(&mut self, pairs: Decimal) -> Decimal {
        let clamped = pairs.max(Decimal::ZERO).min(self.redeemable_pairs());
        self.up_balance -= clamped;
        self.down_balance -= clamped;
        self.total_redeemed += clamped;
        clamped
    }

    /// Fill in token IDs that are still unknown.
    pub(crate) fn adopt_token_ids(&mut self, up_token_id: &str, down_token_id: &str) {
        if self.up_token_id.is_empty() {
            self.up_token_id = up_token_id.to_string();
        }
        if self.down_token_id.is_empty() {
            self.down_token_id = down_token_id.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn entry(up: Decimal, down: Decimal) -> LedgerEntry {
        LedgerEntry {
            up_balance: up,
            down_balance: down,
            ..LedgerEntry::new("0xabc", "up", "down")
        }
    }

    #[test]
    fn redemption_is_clamped_to_pairs() {
        let mut e = entry(dec!(3), dec!(2));
        let removed = e.apply_redemption(dec!(1000));
        assert_eq!(removed, dec!(2));
        assert_eq!(e.up_balance, dec!(1));
        assert_eq!(e.down_balance, dec!(0));
        assert_eq!(e.redeemable_pairs(), dec!(0));
        assert_eq!(e.total_redeemed, dec!(2));
    }

    #[test]
    fn negative_inputs_never_reduce_balances() {
        let mut e = entry(dec!(1), dec!(1));
        e.apply_buy(Leg::Up, dec!(-5), dec!(-2));
        assert_eq!(e.up_balance, dec!(1));
        assert_eq!(e.total_invested, dec!(0));

        assert_eq!(e.apply_redemption(dec!(-1)), dec!(0));
        assert_eq!(e.redeemable_pairs(), dec!(1));
    }

    #[test]
    fn imbalance_reports_surplus_leg() {
        assert_eq!(entry(dec!(7), dec!(4)).imbalance(), (Leg::Up, dec!(3)));
        assert_eq!(entry(dec!(4), dec!(6.5)).imbalance(), (Leg::Down, dec!(2.5)));
        assert_eq!(entry(dec!(5), dec!(5)).imbalance(), (Leg::Down, dec!(0)));
    }

    #[test]
    fn serializes_with_inventory_field_names() {
        let e = entry(dec!(1.5), dec!(2));
        let json = serde_json::to_value(&e).unwrap();
        assert!(json.get("total_invested_usdc").is_some());
        assert!(json.get("total_merged_usdc").is_some());
        assert!(json.get("up_balance").is_some());

        let numeric = r#"{"condition_id":"0x1","up_balance":2.5,"down_balance":1}"#;
        let parsed: LedgerEntry = serde_json::from_str(numeric).unwrap();
        assert_eq!(parsed.up_balance, dec!(2.5));
        assert_eq!(parsed.total_redeemed, dec!(0));
    }
}
