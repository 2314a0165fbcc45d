//! Unified error types for the trading bot.

use std::path::PathBuf;

use rust_decimal::Decimal;
use thiserror::Error;

/// Unified error type for the trading bot.
#[derive(Error, Debug)]
pub enum BotError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Market-related error.
    #[error("market error: {0}")]
    Market(#[from] MarketError),

    /// Trading/order error.
    #[error("trading error: {0}")]
    Trading(#[from] TradingError),

    /// Ledger persistence or reconciliation error.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// On-chain settlement error.
    #[error("settlement error: {0}")]
    Settlement(#[from] SettlementError),

    /// WebSocket error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] WsError),

    /// HTTP request error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Market discovery and price feed errors.
#[derive(Error, Debug)]
pub enum MarketError {
    /// No tradeable market could be found.
    #[error("no active up/down market found")]
    NoActiveMarketFound,

    /// Failed to fetch market or price information.
    #[error("failed to fetch {resource}: {reason}")]
    FetchFailed {
        /// The slug or token that failed.
        resource: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to parse market data.
    #[error("failed to parse market data: {0}")]
    ParseError(String),

    /// HTTP request failed.
    #[error("http request failed: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Trading and order execution errors.
#[derive(Error, Debug)]
pub enum TradingError {
    /// Order submission failed.
    #[error("order submission failed: {0}")]
    SubmissionFailed(String),

    /// Order did not reach a terminal state before the deadline.
    #[error("order timed out after {timeout_ms}ms")]
    Timeout {
        /// Deadline that elapsed.
        timeout_ms: u64,
    },

    /// Order was not filled.
    #[error("order {order_id} not filled")]
    NotFilled {
        /// The order ID that did not fill.
        order_id: String,
    },

    /// Failed to cancel order.
    #[error("failed to cancel order {order_id}: {reason}")]
    CancelFailed {
        /// Order ID that failed to cancel.
        order_id: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to get order status.
    #[error("failed to get order status for {order_id}: {reason}")]
    StatusFailed {
        /// Order ID.
        order_id: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to fetch trade history.
    #[error("failed to fetch trade history: {0}")]
    HistoryFailed(String),

    /// Invalid order parameters.
    #[error("invalid order parameters: {0}")]
    InvalidParams(String),

    /// Signing error.
    #[error("signing error: {0}")]
    SigningError(String),

    /// Order rejected by the exchange.
    #[error("order rejected: {reason}")]
    OrderRejected {
        /// Rejection reason from the exchange.
        reason: String,
    },
}

/// Ledger persistence and reconciliation errors.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Writing the ledger file failed.
    #[error("failed to persist ledger to {path}: {source}")]
    Persist {
        /// Ledger file path.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// Ledger could not be serialized.
    #[error("failed to serialize ledger: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Trade history could not be fetched for reconciliation.
    #[error("reconciliation failed: {0}")]
    Reconcile(#[from] TradingError),
}

/// On-chain settlement (merge) errors.
#[derive(Error, Debug)]
pub enum SettlementError {
    /// Settlement is not configured (missing key, Safe address or RPC).
    #[error("settlement unavailable: {0}")]
    NotReady(String),

    /// Condition or token identifier could not be parsed.
    #[error("invalid identifier {value}: {reason}")]
    InvalidId {
        /// Offending identifier.
        value: String,
        /// Parse failure.
        reason: String,
    },

    /// Requested amount is below what can be merged.
    #[error("merge amount {0} too small")]
    AmountTooSmall(Decimal),

    /// RPC call failed.
    #[error("rpc error: {0}")]
    Rpc(String),

    /// Transaction was mined but reverted.
    #[error("transaction {tx_hash} reverted")]
    Reverted {
        /// Transaction hash.
        tx_hash: String,
    },

    /// Confirmation wait expired.
    #[error("settlement timed out after {timeout_secs}s")]
    Timeout {
        /// Deadline that elapsed.
        timeout_secs: u64,
    },

    /// Signing the Safe transaction failed.
    #[error("signing error: {0}")]
    Signing(String),
}

/// WebSocket connection and message errors.
#[derive(Error, Debug)]
pub enum WsError {
    /// Connection failed.
    #[error("websocket connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection closed unexpectedly.
    #[error("websocket connection closed: code={code:?}, reason={reason}")]
    ConnectionClosed {
        /// Close code.
        code: Option<u16>,
        /// Close reason.
        reason: String,
    },

    /// Message parsing failed.
    #[error("failed to parse websocket message: {0}")]
    ParseError(String),

    /// Send failed.
    #[error("failed to send websocket message: {0}")]
    SendFailed(String),

    /// Tungstenite error.
    #[error("tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, BotError>;
