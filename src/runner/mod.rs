//! The tick loop and the status it publishes.

pub mod bot;
pub mod status;

pub use bot::{Bot, BotTiming, Subscriptions};
pub use status::{BotStatus, MarketView};
