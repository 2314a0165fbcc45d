//! Actions emitted by the decision engine.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::Serialize;
use strum::{Display, EnumString};

use crate::market::Leg;
use crate::pricing::Regime;

/// Action kind, for logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    /// Nothing to do yet.
    Wait,
    /// Conditions rule out acting.
    Skip,
    /// Winner buy plus loser hedge.
    BuyMomentum,
    /// Buy both legs at once.
    BuyBoth,
    /// Redeem matched pairs.
    Merge,
}

/// The single action chosen for a market on one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// No signal, or a cooldown is running.
    Wait {
        /// Why.
        reason: String,
        /// Time left on the cooldown, if that is the reason.
        cooldown_remaining: Option<Duration>,
    },
    /// Acting is ruled out (cap reached, too late, nothing to merge).
    Skip {
        /// Why.
        reason: String,
    },
    /// Buy the running leg and hedge the other.
    BuyMomentum {
        /// Leg that triggered momentum.
        main_leg: Leg,
        /// Losing leg bought as insurance.
        hedge_leg: Leg,
        /// Collateral for the main leg.
        main_usdc: Decimal,
        /// Collateral for the hedge.
        hedge_usdc: Decimal,
        /// Why.
        reason: String,
    },
    /// Buy both legs simultaneously.
    BuyBoth {
        /// Collateral for UP.
        up_usdc: Decimal,
        /// Collateral for DOWN.
        down_usdc: Decimal,
        /// Why.
        reason: String,
    },
    /// Merge redeemable pairs.
    Merge {
        /// Why.
        reason: String,
    },
}

impl Action {
    /// Wait without a cooldown.
    pub fn wait(reason: impl Into<String>) -> Self {
        Action::Wait {
            reason: reason.into(),
            cooldown_remaining: None,
        }
    }

    /// Skip.
    pub fn skip(reason: impl Into<String>) -> Self {
        Action::Skip {
            reason: reason.into(),
        }
    }

    /// Kind of this action.
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Wait { .. } => ActionKind::Wait,
            Action::Skip { .. } => ActionKind::Skip,
            Action::BuyMomentum { .. } => ActionKind::BuyMomentum,
            Action::BuyBoth { .. } => ActionKind::BuyBoth,
            Action::Merge { .. } => ActionKind::Merge,
        }
    }

    /// Human-readable reason.
    pub fn reason(&self) -> &str {
        match self {
            Action::Wait { reason, .. }
            | Action::Skip { reason }
            | Action::BuyMomentum { reason, .. }
            | Action::BuyBoth { reason, .. }
            | Action::Merge { reason } => reason,
        }
    }

    /// Whether executing this action touches the exchange or chain.
    pub fn is_actionable(&self) -> bool {
        matches!(
            self,
            Action::BuyMomentum { .. } | Action::BuyBoth { .. } | Action::Merge { .. }
        )
    }
}

/// Regime plus the action chosen for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Regime the prices classified as.
    pub regime: Regime,
    /// Action to execute.
    pub action: Action,
}
