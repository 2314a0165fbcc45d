//! Per-market decision engine.
//!
//! A flat decision table evaluated every tick. The only state carried
//! between ticks is, per market and per strategy, the time of the last
//! action and the collateral committed so far. That state lives in memory
//! and resets on restart.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, instrument};

use super::action::{Action, Decision};
use crate::config::Config;
use crate::ledger::LedgerEntry;
use crate::pricing::{Prices, Regime, Thresholds};

/// Redeemable pairs at or below which a merge is not worth sending.
pub const MIN_MERGE_PAIRS: Decimal = dec!(0.01);

/// Tunables for the decision table.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Classifier thresholds.
    pub thresholds: Thresholds,
    /// Winner price above which momentum entries are skipped.
    pub momentum_max_entry: Decimal,
    /// Main-leg collateral per momentum buy.
    pub momentum_main_usdc: Decimal,
    /// Hedge collateral per momentum buy.
    pub momentum_hedge_usdc: Decimal,
    /// Momentum spend cap per market.
    pub momentum_max_usdc: Decimal,
    /// Minimum spacing between momentum buys.
    pub momentum_cooldown: Duration,
    /// Per-leg collateral per arbitrage buy.
    pub arb_order_usdc: Decimal,
    /// Arbitrage spend cap per market.
    pub arb_max_usdc: Decimal,
    /// Minimum spacing between arbitrage buys.
    pub arb_cooldown: Duration,
    /// Minutes-to-close below which only resolution is considered.
    pub resolution_minutes: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for EngineConfig {
    fn from(config: &Config) -> Self {
        Self {
            thresholds: Thresholds {
                arb_threshold: config.arb_threshold,
                momentum_trigger: config.momentum_trigger,
            },
            momentum_max_entry: config.momentum_max_entry,
            momentum_main_usdc: config.momentum_main_usdc,
            momentum_hedge_usdc: config.momentum_hedge_usdc,
            momentum_max_usdc: config.momentum_max_usdc,
            momentum_cooldown: Duration::from_secs(config.momentum_cooldown_secs),
            arb_order_usdc: config.arb_order_usdc,
            arb_max_usdc: config.arb_max_usdc,
            arb_cooldown: Duration::from_secs(config.arb_cooldown_secs),
            resolution_minutes: config.resolution_minutes.to_f64().unwrap_or(1.0),
        }
    }
}

/// Cooldown clock and spend counter for one strategy on one market.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrategyState {
    /// When the strategy last bought.
    pub last_action: Option<Instant>,
    /// Collateral committed so far.
    pub spent: Decimal,
}

impl StrategyState {
    /// Time left before the strategy may act again.
    fn cooldown_remaining(&self, cooldown: Duration, now: Instant) -> Option<Duration> {
        let elapsed = now.saturating_duration_since(self.last_action?);
        (elapsed < cooldown).then(|| cooldown - elapsed)
    }

    fn commit(&mut self, usdc: Decimal, now: Instant) {
        self.last_action = Some(now);
        self.spent += usdc;
    }
}

/// Both strategies' state for one market.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarketStrategies {
    /// Arbitrage (buy both legs).
    pub arb: StrategyState,
    /// Momentum (buy the runner, hedge the other).
    pub momentum: StrategyState,
    /// Market close, once discovery has reported it.
    pub closes_at: Option<OffsetDateTime>,
}

/// Spend summary for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct StrategySpend {
    /// Market ID.
    pub market_id: String,
    /// Committed by arbitrage.
    pub arb_spent: Decimal,
    /// Committed by momentum.
    pub momentum_spent: Decimal,
}

/// The decision engine. One per process, shared by reference.
#[derive(Debug)]
pub struct DecisionEngine {
    config: EngineConfig,
    markets: DashMap<String, MarketStrategies>,
}

impl DecisionEngine {
    /// Create an engine.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            markets: DashMap::new(),
        }
    }

    /// Engine tunables.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Decide for `market_id` now.
    pub fn decide(
        &self,
        market_id: &str,
        prices: &Prices,
        ledger: Option<&LedgerEntry>,
        minutes_to_close: f64,
    ) -> Decision {
        self.decide_at(market_id, prices, ledger, minutes_to_close, Instant::now())
    }

    /// Decide for `market_id` as of `now`.
    ///
    /// Holds the market's state for the whole evaluation, so concurrent
    /// calls for one market serialize while other markets proceed.
    #[instrument(level = "debug", skip(self, prices, ledger, now), fields(market = %crate::utils::short_id(market_id)))]
    pub fn decide_at(
        &self,
        market_id: &str,
        prices: &Prices,
        ledger: Option<&LedgerEntry>,
        minutes_to_close: f64,
        now: Instant,
    ) -> Decision {
        let regime = prices.classify(&self.config.thresholds);
        let mut state = self.markets.entry(market_id.to_string()).or_default();

        if regime == Regime::Resolved || minutes_to_close < self.config.resolution_minutes {
            let pairs = ledger
                .map(LedgerEntry::redeemable_pairs)
                .unwrap_or(Decimal::ZERO);
            let action = if pairs > MIN_MERGE_PAIRS {
                Action::Merge {
                    reason: format!(
                        "{} with {:.1}m left, {} pairs redeemable",
                        regime, minutes_to_close, pairs
                    ),
                }
            } else {
                Action::skip("nothing to merge")
            };
            return Decision { regime, action };
        }

        let action = match regime {
            // Handled above.
            Regime::Resolved => Action::skip("nothing to merge"),
            Regime::MomentumUp | Regime::MomentumDown => {
                self.decide_momentum(regime, prices, &mut state.momentum, now)
            }
            Regime::Grey => Action::wait(format!("no signal (sum {})", prices.spread())),
            Regime::Arbitrage => self.decide_arbitrage(prices, &mut state.arb, now),
        };

        debug!(regime = %regime, action = %action.kind(), reason = action.reason(), "decided");
        Decision { regime, action }
    }

    fn decide_momentum(
        &self,
        regime: Regime,
        prices: &Prices,
        state: &mut StrategyState,
        now: Instant,
    ) -> Action {
        let Some(main_leg) = regime.momentum_leg() else {
            return Action::skip(format!("{} is not a momentum regime", regime));
        };
        let cfg = &self.config;
        let winner_price = prices.price(main_leg);

        if winner_price > cfg.momentum_max_entry {
            return Action::skip(format!(
                "{} at {} above entry ceiling {}",
                main_leg, winner_price, cfg.momentum_max_entry
            ));
        }

        if state.spent >= cfg.momentum_max_usdc {
            return Action::skip(format!(
                "momentum cap reached ({} / {})",
                state.spent, cfg.momentum_max_usdc
            ));
        }

        if let Some(remaining) = state.cooldown_remaining(cfg.momentum_cooldown, now) {
            return Action::Wait {
                reason: format!("momentum cooldown {}s", remaining.as_secs()),
                cooldown_remaining: Some(remaining),
            };
        }

        let main_usdc = cfg.momentum_main_usdc.min(cfg.momentum_max_usdc - state.spent);
        let hedge_usdc = cfg.momentum_hedge_usdc;
        state.commit(main_usdc + hedge_usdc, now);

        Action::BuyMomentum {
            main_leg,
            hedge_leg: main_leg.opposite(),
            main_usdc,
            hedge_usdc,
            reason: format!(
                "{} at {} (trigger {}), spent {}/{}",
                main_leg,
                winner_price,
                cfg.thresholds.momentum_trigger,
                state.spent,
                cfg.momentum_max_usdc
            ),
        }
    }

    fn decide_arbitrage(&self, prices: &Prices, state: &mut StrategyState, now: Instant) -> Action {
        let cfg = &self.config;

        if state.spent >= cfg.arb_max_usdc {
            return Action::skip(format!(
                "arbitrage cap reached ({} / {})",
                state.spent, cfg.arb_max_usdc
            ));
        }

        if let Some(remaining) = state.cooldown_remaining(cfg.arb_cooldown, now) {
            return Action::skip(format!("arbitrage cooldown {}ms", remaining.as_millis()));
        }

        state.commit(cfg.arb_order_usdc * Decimal::TWO, now);

        Action::BuyBoth {
            up_usdc: cfg.arb_order_usdc,
            down_usdc: cfg.arb_order_usdc,
            reason: format!(
                "sum {} below {}, spent {}/{}",
                prices.spread(),
                cfg.thresholds.arb_threshold,
                state.spent,
                cfg.arb_max_usdc
            ),
        }
    }

    /// Current strategy state for a market.
    pub fn strategies(&self, market_id: &str) -> Option<MarketStrategies> {
        self.markets.get(market_id).map(|s| *s)
    }

    /// Spend per market for every market seen.
    pub fn spend_summary(&self) -> Vec<StrategySpend> {
        let mut summary: Vec<_> = self
            .markets
            .iter()
            .map(|entry| StrategySpend {
                market_id: entry.key().clone(),
                arb_spent: entry.arb.spent,
                momentum_spent: entry.momentum.spent,
            })
            .collect();
        summary.sort_by(|a, b| a.market_id.cmp(&b.market_id));
        summary
    }

    /// Remember when `market_id` closes.
    pub fn note_close(&self, market_id: &str, close_time: OffsetDateTime) {
        self.markets
            .entry(market_id.to_string())
            .or_default()
            .closes_at = Some(close_time);
    }

    /// Drop state for markets closed more than `grace` before `now`.
    ///
    /// Absence from one discovery result is not enough: spend caps and
    /// cooldowns must survive a short or failed listing.
    pub fn prune_closed(&self, now: OffsetDateTime, grace: time::Duration) -> usize {
        let before = self.markets.len();
        self.markets
            .retain(|_, state| state.closes_at.map_or(true, |close| now - close < grace));
        let pruned = before.saturating_sub(self.markets.len());
        if pruned > 0 {
            debug!(pruned, "dropped strategy state for closed markets");
        }
        pruned
    }
}
