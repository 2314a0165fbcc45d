//! Polymarket Up/Down trading bot.
//!
//! Each tick, every tracked Up/Down market is priced, classified into a
//! regime, and handed to a decision engine that emits exactly one action.
//! The execution coordinator turns that action into orders or an on-chain
//! merge and books the outcome in a durable position ledger.
//!
//! # Strategies
//!
//! ```text
//! ARBITRAGE  UP 0.50 + DOWN 0.45 = 0.95 < 0.97  -> buy both legs
//! MOMENTUM   UP 0.88 > 0.85 trigger             -> buy UP, small DOWN hedge
//! RESOLVED   max leg >= 0.99, or < 1m to close  -> merge matched pairs
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`pricing`]: Regime classifier, price feeds and cache
//! - [`ledger`]: Position ledger and reconciliation
//! - [`engine`]: Decision engine
//! - [`execution`]: Order placement, fills and coordination
//! - [`settlement`]: On-chain merges through a Gnosis Safe
//! - [`market`]: Market discovery and Polymarket client
//! - [`feeds`]: Market and user WebSocket listeners
//! - [`runner`]: The polling loop
//! - [`api`]: HTTP API for health and status
//! - [`signing`]: Wallet signers, order signatures, API auth
//! - [`metrics`]: Prometheus metrics
//! - [`utils`]: Utility functions

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod feeds;
pub mod ledger;
pub mod market;
pub mod metrics;
pub mod pricing;
pub mod runner;
pub mod settlement;
pub mod signing;
pub mod utils;

pub use config::Config;
pub use error::{BotError, Result};
