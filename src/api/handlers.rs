//! HTTP API handlers.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

use crate::engine::{DecisionEngine, StrategySpend};
use crate::ledger::{Ledger, LedgerEntry};
use crate::runner::{BotStatus, MarketView};

/// Application state shared with handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Tick loop status.
    pub status: Arc<BotStatus>,
    /// Position ledger.
    pub ledger: Arc<Ledger>,
    /// Decision engine, for spend reporting.
    pub engine: Arc<DecisionEngine>,
    /// Whether orders and merges are simulated.
    pub dry_run: bool,
}

impl AppState {
    /// Create app state.
    pub fn new(
        status: Arc<BotStatus>,
        ledger: Arc<Ledger>,
        engine: Arc<DecisionEngine>,
        dry_run: bool,
    ) -> Self {
        Self {
            status,
            ledger,
            engine,
            dry_run,
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Whether markets are loaded.
    pub ready: bool,
    /// Number of tracked markets.
    pub markets: usize,
}

/// Status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// "running" or "starting".
    pub status: &'static str,
    /// "simulation" or "live".
    pub mode: &'static str,
    /// Market ticks so far.
    pub ticks: u64,
    /// Actionable decisions so far.
    pub actions: u64,
    /// Failed orders so far.
    pub failed_orders: u64,
    /// Tracked markets.
    pub markets: Vec<MarketView>,
    /// Strategy spend per market.
    pub spend: Vec<StrategySpend>,
}

/// One ledger row with derived figures.
#[derive(Debug, Serialize)]
pub struct LedgerRow {
    /// Stored entry.
    #[serde(flatten)]
    pub entry: LedgerEntry,
    /// `min(up, down)`.
    pub redeemable_pairs: Decimal,
    /// Leg holding the surplus.
    pub excess_leg: String,
    /// Size of the surplus.
    pub excess: Decimal,
}

/// Ledger response.
#[derive(Debug, Serialize)]
pub struct LedgerResponse {
    /// Collateral spent across markets.
    pub total_invested: Decimal,
    /// Collateral recovered across markets.
    pub total_redeemed: Decimal,
    /// Entries by market.
    pub entries: Vec<LedgerRow>,
}

impl LedgerResponse {
    /// Build from ledger entries.
    pub fn from_entries(entries: Vec<LedgerEntry>) -> Self {
        let total_invested = entries.iter().map(|e| e.total_invested).sum();
        let total_redeemed = entries.iter().map(|e| e.total_redeemed).sum();
        let entries = entries
            .into_iter()
            .map(|entry| {
                let (leg, excess) = entry.imbalance();
                LedgerRow {
                    redeemable_pairs: entry.redeemable_pairs(),
                    excess_leg: leg.to_string(),
                    excess,
                    entry,
                }
            })
            .collect();
        Self {
            total_invested,
            total_redeemed,
            entries,
        }
    }
}

/// Health check handler - always returns 200.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Readiness check handler - 200 once markets are loaded, 503 otherwise.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let is_ready = state.status.is_ready();
    let response = ReadyResponse {
        ready: is_ready,
        markets: state.status.markets().len(),
    };

    if is_ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Status handler - counters, tracked markets and strategy spend.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatusResponse {
        status: if state.status.is_ready() { "running" } else { "starting" },
        mode: if state.dry_run { "simulation" } else { "live" },
        ticks: state.status.ticks(),
        actions: state.status.actions(),
        failed_orders: state.status.failed_orders(),
        markets: state.status.markets(),
        spend: state.engine.spend_summary(),
    })
}

/// Ledger handler - every entry with redeemable pairs and imbalance.
pub async fn ledger(State(state): State<AppState>) -> impl IntoResponse {
    Json(LedgerResponse::from_entries(state.ledger.entries()))
}
