//! Collaborator seams used by the execution coordinator and the ledger.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::order::{PlacedOrder, Side};
use crate::error::{SettlementError, TradingError};
use crate::market::{Leg, Market};

/// Places single-leg buys.
#[async_trait]
pub trait OrderPlacer: Send + Sync {
    /// Buy `usdc` worth of `token_id` at no worse than `price_hint`.
    ///
    /// Returns only once the order is filled; anything else is an error.
    async fn buy(
        &self,
        token_id: &str,
        usdc: Decimal,
        price_hint: Decimal,
    ) -> Result<PlacedOrder, TradingError>;
}

/// The market a merge applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeTarget {
    /// Condition ID.
    pub condition_id: String,
    /// UP token ID.
    pub up_token_id: String,
    /// DOWN token ID.
    pub down_token_id: String,
}

impl From<&Market> for MergeTarget {
    fn from(market: &Market) -> Self {
        Self {
            condition_id: market.condition_id.clone(),
            up_token_id: market.up_token_id.clone(),
            down_token_id: market.down_token_id.clone(),
        }
    }
}

/// Redeems matched UP/DOWN pairs for collateral.
#[async_trait]
pub trait Settlement: Send + Sync {
    /// Whether merges can be executed (signing key, wallet, RPC configured).
    fn is_ready(&self) -> bool;

    /// Pairs actually held on-chain for the market.
    async fn on_chain_redeemable_pairs(&self, target: &MergeTarget) -> Result<Decimal, SettlementError>;

    /// Merge `pairs` pairs. Returns the collateral recovered.
    async fn merge(&self, target: &MergeTarget, pairs: Decimal) -> Result<Decimal, SettlementError>;
}

/// One trade from the exchange's trade history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Market condition ID.
    pub market_id: String,
    /// Token traded.
    pub asset_id: String,
    /// Leg traded.
    pub leg: Leg,
    /// Trade side.
    pub side: Side,
    /// Tokens traded.
    pub size: Decimal,
    /// Execution price.
    pub price: Decimal,
    /// Exchange status (MATCHED, MINED, CONFIRMED, FAILED, ...).
    pub status: String,
}

impl TradeRecord {
    /// A buy the exchange has matched or confirmed.
    pub fn is_settled_buy(&self) -> bool {
        self.side == Side::Buy
            && (self.status.eq_ignore_ascii_case("MATCHED")
                || self.status.eq_ignore_ascii_case("CONFIRMED"))
    }
}

/// Authoritative trade history.
#[async_trait]
pub trait TradeHistorySource: Send + Sync {
    /// Every trade of the account.
    async fn trades(&self) -> Result<Vec<TradeRecord>, TradingError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn trade(side: Side, status: &str) -> TradeRecord {
        TradeRecord {
            market_id: "0xabc".to_string(),
            asset_id: "up".to_string(),
            leg: Leg::Up,
            side,
            size: dec!(10),
            price: dec!(0.5),
            status: status.to_string(),
        }
    }

    #[test]
    fn settled_buys_only() {
        assert!(trade(Side::Buy, "MATCHED").is_settled_buy());
        assert!(trade(Side::Buy, "confirmed").is_settled_buy());
        assert!(!trade(Side::Buy, "FAILED").is_settled_buy());
        assert!(!trade(Side::Buy, "RETRYING").is_settled_buy());
        assert!(!trade(Side::Sell, "MATCHED").is_settled_buy());
    }
}
