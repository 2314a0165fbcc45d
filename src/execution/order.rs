//! Order types and results.

use rust_decimal::RoundingStrategy;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::market::Leg;

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy order.
    #[strum(to_string = "BUY", serialize = "buy", serialize = "Buy")]
    Buy,
    /// Sell order.
    #[strum(to_string = "SELL", serialize = "sell", serialize = "Sell")]
    Sell,
}

impl Side {
    /// Numeric side used in signed orders.
    pub fn as_u8(&self) -> u8 {
        match self {
            Side::Buy => 0,
            Side::Sell => 1,
        }
    }
}

/// Order time-in-force.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    /// Fill-or-kill: must fill entirely or cancel.
    #[default]
    #[strum(to_string = "FOK", serialize = "fok")]
    FOK,
    /// Fill-and-kill: fill what's available, cancel rest.
    #[strum(to_string = "FAK", serialize = "fak")]
    FAK,
    /// Good-till-cancelled: rests on the book until filled or cancelled.
    #[strum(to_string = "GTC", serialize = "gtc")]
    GTC,
}

/// A collateral-denominated buy, ready to be signed.
#[derive(Debug, Clone)]
pub struct OrderParams {
    /// Token ID to buy.
    pub token_id: String,
    /// Collateral to spend (USDC).
    pub usdc: Decimal,
    /// Worst acceptable price.
    pub price: Decimal,
    /// Time-in-force.
    pub tif: TimeInForce,
}

impl OrderParams {
    /// Create an immediate-or-cancel buy.
    pub fn buy(token_id: impl Into<String>, usdc: Decimal, price: Decimal) -> Self {
        Self {
            token_id: token_id.into(),
            usdc,
            price,
            tif: TimeInForce::FOK,
        }
    }

    /// Set time-in-force.
    pub fn with_tif(mut self, tif: TimeInForce) -> Self {
        self.tif = tif;
        self
    }

    /// Tokens expected at the limit price, truncated to cents.
    pub fn expected_tokens(&self) -> Decimal {
        if self.price <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        (self.usdc / self.price).round_dp_with_strategy(2, RoundingStrategy::ToZero)
    }

    /// Validate order parameters.
    pub fn validate(&self) -> Result<(), String> {
        if self.token_id.is_empty() {
            return Err("token_id is required".to_string());
        }
        if self.price <= Decimal::ZERO || self.price >= Decimal::ONE {
            return Err("price must be between 0 and 1".to_string());
        }
        if self.usdc <= Decimal::ZERO {
            return Err("usdc amount must be positive".to_string());
        }
        Ok(())
    }
}

/// Order status reported by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum OrderStatus {
    /// Accepted, not yet processed.
    #[strum(serialize = "pending")]
    Pending,
    /// Resting on the book.
    #[strum(serialize = "live")]
    Live,
    /// Held by the matching delay.
    #[strum(serialize = "delayed")]
    Delayed,
    /// Matched against resting liquidity.
    #[strum(serialize = "matched")]
    Matched,
    /// Fully filled.
    #[strum(serialize = "filled")]
    Filled,
    /// Immediate order that found no liquidity.
    #[strum(serialize = "unmatched")]
    Unmatched,
    /// Cancelled.
    #[strum(serialize = "canceled", serialize = "cancelled")]
    Canceled,
    /// Rejected.
    #[strum(serialize = "rejected")]
    Rejected,
    /// Expired.
    #[strum(serialize = "expired")]
    Expired,
}

impl OrderStatus {
    /// Check if status is terminal (won't change).
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            OrderStatus::Pending | OrderStatus::Live | OrderStatus::Delayed
        )
    }

    /// Check if order was filled.
    pub fn is_filled(&self) -> bool {
        matches!(self, OrderStatus::Matched | OrderStatus::Filled)
    }
}

/// Order state summary from a status poll.
#[derive(Debug, Clone, Default)]
pub struct OrderState {
    /// Order ID.
    pub order_id: String,
    /// Current status.
    pub status: Option<OrderStatus>,
    /// Filled size in tokens.
    pub filled_size: Option<Decimal>,
    /// Whether order is in terminal state.
    pub is_terminal: bool,
    /// Whether order was filled.
    pub is_filled: bool,
}

/// A filled order as reported by an [`OrderPlacer`](super::OrderPlacer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedOrder {
    /// Exchange order ID.
    pub order_id: String,
    /// Tokens actually received, when the exchange reports it.
    pub tokens_received: Option<Decimal>,
    /// Collateral actually spent, when the exchange reports it.
    pub usdc_spent: Option<Decimal>,
}

/// Outcome of a single-leg buy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderResult {
    /// Leg bought.
    pub leg: Leg,
    /// Whether the order filled.
    pub success: bool,
    /// Exchange order ID, if one was assigned.
    pub order_id: Option<String>,
    /// Tokens recorded in the ledger.
    pub tokens_received: Decimal,
    /// Collateral recorded in the ledger.
    pub usdc_spent: Decimal,
    /// Failure reason.
    pub error: Option<String>,
}

impl OrderResult {
    /// A filled buy.
    pub fn filled(leg: Leg, order_id: String, tokens: Decimal, usdc: Decimal) -> Self {
        Self {
            leg,
            success: true,
            order_id: Some(order_id),
            tokens_received: tokens,
            usdc_spent: usdc,
            error: None,
        }
    }

    /// A failed buy; nothing was recorded.
    pub fn failed(leg: Leg, error: impl Into<String>) -> Self {
        Self {
            leg,
            success: false,
            order_id: None,
            tokens_received: Decimal::ZERO,
            usdc_spent: Decimal::ZERO,
            error: Some(error.into()),
        }
    }
}
