//! Position ledger (inventory).
//!
//! - [`entry`]: per-market balances and collateral totals
//! - [`store`]: JSON file persistence
//! - [`book`]: the shared, lock-serialized ledger
//! - [`reconcile`]: rebuild from trade history

pub mod book;
pub mod entry;
pub mod reconcile;
pub mod store;

pub use book::{Ledger, DEFAULT_RECONCILE_INTERVAL};
pub use entry::LedgerEntry;
pub use reconcile::{rebuild_from_trades, ReconcileOutcome};
