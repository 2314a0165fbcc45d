//! Market regime classification from two-sided prices.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use strum::{Display, EnumString};

use crate::market::Leg;

/// Winner price at or above which a market is treated as settled.
pub const RESOLVED_PRICE: Decimal = dec!(0.99);

/// Price used for a leg whose quote is unavailable this tick.
pub const NEUTRAL_PRICE: Decimal = dec!(0.5);

/// Current market regime, recomputed every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Regime {
    /// Market has settled to near-certainty.
    Resolved,
    /// UP leg is running away.
    MomentumUp,
    /// DOWN leg is running away.
    MomentumDown,
    /// Both legs can be bought for less than the guaranteed redemption value.
    Arbitrage,
    /// No actionable edge.
    Grey,
}

impl Regime {
    /// The triggering leg of a momentum regime.
    pub fn momentum_leg(&self) -> Option<Leg> {
        match self {
            Regime::MomentumUp => Some(Leg::Up),
            Regime::MomentumDown => Some(Leg::Down),
            _ => None,
        }
    }
}

/// Thresholds the classifier is tuned with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Combined price below which the regime is arbitrage.
    pub arb_threshold: Decimal,
    /// Winner price above which the regime is momentum.
    pub momentum_trigger: Decimal,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            arb_threshold: dec!(0.97),
            momentum_trigger: dec!(0.85),
        }
    }
}

/// Current UP/DOWN prices of a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Prices {
    /// UP leg price in [0, 1].
    pub up: Decimal,
    /// DOWN leg price in [0, 1].
    pub down: Decimal,
}

impl Prices {
    /// Create a price pair.
    pub fn new(up: Decimal, down: Decimal) -> Self {
        Self { up, down }
    }

    /// Neutral pair used when no quote is available.
    pub fn neutral() -> Self {
        Self::new(NEUTRAL_PRICE, NEUTRAL_PRICE)
    }

    /// Sum of both legs (ideally about 1.0).
    pub fn spread(&self) -> Decimal {
        self.up + self.down
    }

    /// Price of a given leg.
    pub fn price(&self, leg: Leg) -> Decimal {
        match leg {
            Leg::Up => self.up,
            Leg::Down => self.down,
        }
    }

    /// Leg with the higher price (ties go to UP).
    pub fn winner(&self) -> Leg {
        if self.up >= self.down {
            Leg::Up
        } else {
            Leg::Down
        }
    }

    /// The higher of the two prices.
    pub fn winner_price(&self) -> Decimal {
        self.up.max(self.down)
    }

    /// The lower of the two prices.
    pub fn loser_price(&self) -> Decimal {
        self.up.min(self.down)
    }

    /// Classify these prices.
    pub fn classify(&self, thresholds: &Thresholds) -> Regime {
        classify(self.up, self.down, thresholds)
    }
}

/// Map raw two-sided prices to a regime. First match wins:
/// resolved, momentum (strict `>`), arbitrage (strict `<`), grey.
pub fn classify(up: Decimal, down: Decimal, thresholds: &Thresholds) -> Regime {
    let winner = up.max(down);

    if winner >= RESOLVED_PRICE {
        return Regime::Resolved;
    }

    if winner > thresholds.momentum_trigger {
        return if up >= down {
            Regime::MomentumUp
        } else {
            Regime::MomentumDown
        };
    }

    if up + down < thresholds.arb_threshold {
        return Regime::Arbitrage;
    }

    Regime::Grey
}
