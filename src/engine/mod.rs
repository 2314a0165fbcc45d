//! Decision engine: regime + ledger + time-to-close → one action per tick.
//!
//! - [`action`]: actions and decisions
//! - [`decision`]: per-market cooldown / spend-cap state machine

pub mod action;
pub mod decision;

pub use action::{Action, ActionKind, Decision};
pub use decision::{
    DecisionEngine, EngineConfig, MarketStrategies, StrategySpend, StrategyState, MIN_MERGE_PAIRS,
};
