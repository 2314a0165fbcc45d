//! Order execution.
//!
//! - [`traits`]: collaborator seams (placer, settlement, trade history)
//! - [`order`]: order types and results
//! - [`coordinator`]: action → orders / merge → ledger
//! - [`clob`]: live CLOB order placement
//! - [`simulated`]: dry-run stand-ins
//! - [`fills`]: fill notifications without double counting

pub mod clob;
pub mod coordinator;
pub mod fills;
pub mod order;
pub mod simulated;
pub mod traits;

pub use clob::ClobOrderPlacer;
pub use coordinator::{Execution, ExecutionCoordinator};
pub use fills::{FillEvent, FillRegistry};
pub use order::{OrderParams, OrderResult, OrderState, OrderStatus, PlacedOrder, Side, TimeInForce};
pub use simulated::{SimulatedOrderPlacer, SimulatedSettlement, SimulatedTradeHistory};
pub use traits::{MergeTarget, OrderPlacer, Settlement, TradeHistorySource, TradeRecord};
