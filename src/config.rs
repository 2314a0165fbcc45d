//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Polymarket Credentials ===
    /// Wallet private key (hex, starts with 0x). Required for live trading.
    #[serde(default)]
    pub polymarket_private_key: String,

    /// Optional pre-generated API key.
    #[serde(default)]
    pub polymarket_api_key: Option<String>,

    /// Optional API secret.
    #[serde(default)]
    pub polymarket_api_secret: Option<String>,

    /// Optional API passphrase.
    #[serde(default)]
    pub polymarket_api_passphrase: Option<String>,

    // === Wallet Configuration ===
    /// Signature type: 0=EOA, 1=Proxy, 2=Gnosis Safe.
    #[serde(default)]
    pub polymarket_signature_type: u8,

    /// Proxy / Safe address that holds the outcome tokens.
    #[serde(default)]
    pub polymarket_funder: Option<String>,

    // === Settlement ===
    /// Safe owner key used to sign merges (defaults to the wallet key).
    #[serde(default)]
    pub merge_private_key: Option<String>,

    /// Polygon JSON-RPC endpoint.
    #[serde(default = "default_polygon_rpc")]
    pub polygon_rpc_url: String,

    // === Markets ===
    /// Comma-separated asset slug prefixes (e.g. "bitcoin,ethereum").
    #[serde(default = "default_assets")]
    pub assets: String,

    /// Force a specific market slug (bypasses discovery filtering).
    #[serde(default)]
    pub polymarket_market_slug: Option<String>,

    /// Only trade markets closing within this many hours.
    #[serde(default = "default_max_market_age_h")]
    pub max_market_age_h: u64,

    // === Classifier Thresholds ===
    /// Combined price below which both legs are bought (e.g., 0.97).
    #[serde(default = "default_arb_threshold")]
    pub arb_threshold: Decimal,

    /// Winner price above which the momentum strategy engages.
    #[serde(default = "default_momentum_trigger")]
    pub momentum_trigger: Decimal,

    /// Winner price above which momentum entries are skipped.
    #[serde(default = "default_momentum_max_entry")]
    pub momentum_max_entry: Decimal,

    /// Minutes-to-close below which the resolution branch wins.
    #[serde(default = "default_resolution_minutes")]
    pub resolution_minutes: Decimal,

    // === Order Sizing (USDC) ===
    /// Per-leg collateral for each arbitrage buy.
    #[serde(default = "default_arb_order_usdc")]
    pub arb_order_usdc: Decimal,

    /// Arbitrage spend cap per market.
    #[serde(default = "default_arb_max_usdc")]
    pub arb_max_usdc: Decimal,

    /// Collateral for the winning leg of a momentum buy.
    #[serde(default = "default_momentum_main_usdc")]
    pub momentum_main_usdc: Decimal,

    /// Collateral for the losing-leg hedge of a momentum buy.
    #[serde(default = "default_momentum_hedge_usdc")]
    pub momentum_hedge_usdc: Decimal,

    /// Momentum spend cap per market.
    #[serde(default = "default_momentum_max_usdc")]
    pub momentum_max_usdc: Decimal,

    // === Timing ===
    /// Minimum seconds between arbitrage buys on one market.
    #[serde(default = "default_arb_cooldown")]
    pub arb_cooldown_secs: u64,

    /// Minimum seconds between momentum buys on one market.
    #[serde(default = "default_momentum_cooldown")]
    pub momentum_cooldown_secs: u64,

    /// Tick cadence in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Market discovery cadence in minutes.
    #[serde(default = "default_market_refresh_min")]
    pub market_refresh_min: u64,

    /// Maximum age of a cached price before falling back to REST.
    #[serde(default = "default_price_max_age_ms")]
    pub price_max_age_ms: u64,

    /// Minimum seconds between unforced ledger reconciliations.
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,

    // === Ledger ===
    /// Ledger (inventory) file path.
    #[serde(default = "default_inventory_file")]
    pub inventory_file: PathBuf,

    // === Operation Modes ===
    /// Simulation mode (no real orders or merges).
    #[serde(default = "default_true")]
    pub dry_run: bool,

    /// Enable the market WebSocket price cache.
    #[serde(default = "default_true")]
    pub use_wss: bool,

    // === Endpoints ===
    /// WebSocket base URL.
    #[serde(default = "default_ws_url")]
    pub polymarket_ws_url: String,

    /// CLOB API base URL.
    #[serde(default = "default_clob_url")]
    pub polymarket_clob_url: String,

    /// Gamma API base URL.
    #[serde(default = "default_gamma_url")]
    pub polymarket_gamma_url: String,

    // === Network Timeouts ===
    /// HTTP request timeout in milliseconds.
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    /// Idle connections kept per host.
    #[serde(default = "default_http_pool_size")]
    pub http_pool_size: usize,

    /// Order placement deadline in milliseconds.
    #[serde(default = "default_order_timeout_ms")]
    pub order_timeout_ms: u64,

    /// Order status poll interval in milliseconds.
    #[serde(default = "default_order_poll_interval_ms")]
    pub order_poll_interval_ms: u64,

    /// Merge confirmation deadline in seconds.
    #[serde(default = "default_merge_timeout_secs")]
    pub merge_timeout_secs: u64,

    /// Maximum WebSocket reconnect backoff in seconds.
    #[serde(default = "default_ws_reconnect_max_delay")]
    pub ws_reconnect_max_delay_s: u64,

    /// WebSocket heartbeat interval in seconds.
    #[serde(default = "default_ws_heartbeat_interval")]
    pub ws_heartbeat_interval_s: u64,

    // === Server Configuration ===
    /// HTTP server port for health/status endpoints.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Install the Prometheus exporter.
    #[serde(default)]
    pub metrics_enabled: bool,

    /// Prometheus exporter port.
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,

    /// Emit JSON log lines.
    #[serde(default)]
    pub log_json: bool,

    /// Enable verbose logging.
    #[serde(default)]
    pub verbose: bool,
}

fn default_polygon_rpc() -> String {
    "https://polygon-bor-rpc.publicnode.com".to_string()
}

fn default_assets() -> String {
    "bitcoin".to_string()
}

fn default_max_market_age_h() -> u64 {
    4
}

fn default_arb_threshold() -> Decimal {
    Decimal::new(97, 2) // 0.97
}

fn default_momentum_trigger() -> Decimal {
    Decimal::new(85, 2) // 0.85
}

fn default_momentum_max_entry() -> Decimal {
    Decimal::new(92, 2) // 0.92
}

fn default_resolution_minutes() -> Decimal {
    Decimal::ONE
}

fn default_arb_order_usdc() -> Decimal {
    Decimal::new(5, 0)
}

fn default_arb_max_usdc() -> Decimal {
    Decimal::new(20, 0)
}

fn default_momentum_main_usdc() -> Decimal {
    Decimal::new(10, 0)
}

fn default_momentum_hedge_usdc() -> Decimal {
    Decimal::ONE
}

fn default_momentum_max_usdc() -> Decimal {
    Decimal::new(30, 0)
}

fn default_arb_cooldown() -> u64 {
    5
}

fn default_momentum_cooldown() -> u64 {
    120
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_market_refresh_min() -> u64 {
    10
}

fn default_price_max_age_ms() -> u64 {
    3000
}

fn default_reconcile_interval() -> u64 {
    120
}

fn default_inventory_file() -> PathBuf {
    PathBuf::from("inventory_state.json")
}

fn default_true() -> bool {
    true
}

fn default_ws_url() -> String {
    "wss://ws-subscriptions-clob.polymarket.com".to_string()
}

fn default_clob_url() -> String {
    "https://clob.polymarket.com".to_string()
}

fn default_gamma_url() -> String {
    "https://gamma-api.polymarket.com".to_string()
}

fn default_http_timeout_ms() -> u64 {
    6000
}

fn default_http_pool_size() -> usize {
    10
}

fn default_order_timeout_ms() -> u64 {
    5000
}

fn default_order_poll_interval_ms() -> u64 {
    250
}

fn default_merge_timeout_secs() -> u64 {
    60
}

fn default_ws_reconnect_max_delay() -> u64 {
    30
}

fn default_ws_heartbeat_interval() -> u64 {
    10
}

fn default_port() -> u16 {
    8080
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            polymarket_private_key: String::new(),
            polymarket_api_key: None,
            polymarket_api_secret: None,
            polymarket_api_passphrase: None,
            polymarket_signature_type: 0,
            polymarket_funder: None,
            merge_private_key: None,
            polygon_rpc_url: default_polygon_rpc(),
            assets: default_assets(),
            polymarket_market_slug: None,
            max_market_age_h: default_max_market_age_h(),
            arb_threshold: default_arb_threshold(),
            momentum_trigger: default_momentum_trigger(),
            momentum_max_entry: default_momentum_max_entry(),
            resolution_minutes: default_resolution_minutes(),
            arb_order_usdc: default_arb_order_usdc(),
            arb_max_usdc: default_arb_max_usdc(),
            momentum_main_usdc: default_momentum_main_usdc(),
            momentum_hedge_usdc: default_momentum_hedge_usdc(),
            momentum_max_usdc: default_momentum_max_usdc(),
            arb_cooldown_secs: default_arb_cooldown(),
            momentum_cooldown_secs: default_momentum_cooldown(),
            poll_interval_ms: default_poll_interval_ms(),
            market_refresh_min: default_market_refresh_min(),
            price_max_age_ms: default_price_max_age_ms(),
            reconcile_interval_secs: default_reconcile_interval(),
            inventory_file: default_inventory_file(),
            dry_run: true,
            use_wss: true,
            polymarket_ws_url: default_ws_url(),
            polymarket_clob_url: default_clob_url(),
            polymarket_gamma_url: default_gamma_url(),
            http_timeout_ms: default_http_timeout_ms(),
            http_pool_size: default_http_pool_size(),
            order_timeout_ms: default_order_timeout_ms(),
            order_poll_interval_ms: default_order_poll_interval_ms(),
            merge_timeout_secs: default_merge_timeout_secs(),
            ws_reconnect_max_delay_s: default_ws_reconnect_max_delay(),
            ws_heartbeat_interval_s: default_ws_heartbeat_interval(),
            port: default_port(),
            metrics_enabled: false,
            metrics_port: default_metrics_port(),
            rust_log: default_log_level(),
            log_json: false,
            verbose: false,
        }
    }
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        if !self.dry_run {
            if self.polymarket_private_key.is_empty() {
                return Err("POLYMARKET_PRIVATE_KEY is required for live trading".to_string());
            }

            if !self.polymarket_private_key.starts_with("0x") {
                return Err("POLYMARKET_PRIVATE_KEY must start with 0x".to_string());
            }
        }

        let unit = |value: Decimal| value > Decimal::ZERO && value < Decimal::ONE;

        if !unit(self.arb_threshold) {
            return Err("ARB_THRESHOLD must be between 0 and 1".to_string());
        }

        if !unit(self.momentum_trigger) || !unit(self.momentum_max_entry) {
            return Err("MOMENTUM_TRIGGER and MOMENTUM_MAX_ENTRY must be between 0 and 1".to_string());
        }

        if self.momentum_max_entry < self.momentum_trigger {
            return Err("MOMENTUM_MAX_ENTRY must be at least MOMENTUM_TRIGGER".to_string());
        }

        let sizes = [
            self.arb_order_usdc,
            self.momentum_main_usdc,
            self.momentum_hedge_usdc,
        ];
        if sizes.iter().any(|size| *size <= Decimal::ZERO) {
            return Err("order sizes must be positive".to_string());
        }

        if self.arb_max_usdc < self.arb_order_usdc * Decimal::TWO {
            return Err("ARB_MAX_USDC must cover at least one two-leg buy".to_string());
        }

        if self.momentum_max_usdc < self.momentum_main_usdc {
            return Err("MOMENTUM_MAX_USDC must be at least MOMENTUM_MAIN_USDC".to_string());
        }

        if self.assets().is_empty() && self.polymarket_market_slug.is_none() {
            return Err("ASSETS must name at least one asset".to_string());
        }

        Ok(())
    }

    /// Configured asset slug prefixes.
    pub fn assets(&self) -> Vec<String> {
        self.assets
            .split(',')
            .map(|a| a.trim().to_lowercase())
            .filter(|a| !a.is_empty())
            .collect()
    }

    /// Key used to sign Safe merge transactions.
    pub fn merge_key(&self) -> Option<&str> {
        self.merge_private_key
            .as_deref()
            .or(Some(self.polymarket_private_key.as_str()))
            .filter(|k| !k.is_empty())
    }

    /// Whether L2 API credentials are fully configured.
    pub fn has_api_credentials(&self) -> bool {
        self.polymarket_api_key.is_some()
            && self.polymarket_api_secret.is_some()
            && self.polymarket_api_passphrase.is_some()
    }

    /// Tick cadence.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Market discovery cadence.
    pub fn market_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.market_refresh_min * 60)
    }

    /// Price cache freshness window.
    pub fn price_max_age(&self) -> Duration {
        Duration::from_millis(self.price_max_age_ms)
    }

    /// Order placement deadline.
    pub fn order_timeout(&self) -> Duration {
        Duration::from_millis(self.order_timeout_ms)
    }

    /// Merge confirmation deadline.
    pub fn merge_timeout(&self) -> Duration {
        Duration::from_secs(self.merge_timeout_secs)
    }
}
