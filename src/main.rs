//! Polymarket Up/Down trading bot entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use updown_bot::api::{create_router, AppState};
use updown_bot::config::Config;
use updown_bot::engine::{DecisionEngine, EngineConfig};
use updown_bot::execution::{
    ClobOrderPlacer, ExecutionCoordinator, FillRegistry, OrderPlacer, Settlement,
    SimulatedOrderPlacer, SimulatedSettlement, SimulatedTradeHistory, TradeHistorySource,
};
use updown_bot::feeds::{MarketSocket, ReconnectConfig, UserSocket};
use updown_bot::ledger::Ledger;
use updown_bot::market::{GammaMarketFinder, MarketFeed, PolymarketClient};
use updown_bot::metrics;
use updown_bot::pricing::{CachedPriceFeed, PriceCache, PriceFeed, RestPriceFeed};
use updown_bot::runner::{Bot, BotStatus, BotTiming, Subscriptions};
use updown_bot::settlement::SafeMerger;
use updown_bot::signing::{
    address_from_private_key, get_or_create_signer, ApiCredentials, OrderSigner, WalletIdentity,
};
use updown_bot::utils::shutdown_signal;

/// Polymarket Up/Down trading bot.
#[derive(Parser, Debug)]
#[command(name = "updown-bot")]
#[command(about = "Arbitrage and momentum trading on Polymarket Up/Down markets")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the trading loop (default).
    Run {
        /// Override DRY_RUN.
        #[arg(long)]
        dry_run: Option<bool>,

        /// Override PORT for the status API.
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Check configuration validity.
    CheckConfig,

    /// List the markets the bot would trade right now.
    Discover,

    /// Print the persisted ledger.
    Ledger,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load();

    let defaults = Config::default();
    let settings = config.as_ref().unwrap_or(&defaults);
    init_tracing(args.verbose || settings.verbose, settings.log_json, &settings.rust_log);

    match args.command {
        Some(Command::CheckConfig) => cmd_check_config(config),
        Some(Command::Discover) => cmd_discover(config?).await,
        Some(Command::Ledger) => cmd_ledger(config?),
        Some(Command::Run { dry_run, port }) => cmd_run(config?, dry_run, port).await,
        None => cmd_run(config?, None, None).await,
    }
}

fn init_tracing(verbose: bool, json: bool, default_level: &str) {
    let filter = if verbose {
        EnvFilter::new("updown_bot=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}

/// Check configuration validity.
fn cmd_check_config(config: Result<Config, envy::Error>) -> anyhow::Result<()> {
    println!("======================================================================");
    println!("UP/DOWN BOT - CONFIGURATION CHECK");
    println!("======================================================================");

    print!("Loading configuration... ");
    let config = match config {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration load failed"));
        }
    };

    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    if !config.polymarket_private_key.is_empty() {
        print!("Checking private key... ");
        match address_from_private_key(&config.polymarket_private_key) {
            Ok(addr) => {
                println!("OK");
                println!("  Wallet address: {}", addr);
            }
            Err(e) => {
                println!("FAILED");
                println!("  Error: {}", e);
                return Err(anyhow::anyhow!("Private key invalid"));
            }
        }
    }

    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  Mode: {}", if config.dry_run { "SIMULATION" } else { "LIVE TRADING" });
    println!("  Assets: {}", config.assets().join(", "));
    if let Some(slug) = &config.polymarket_market_slug {
        println!("  Forced market: {}", slug);
    }
    println!("  Arb threshold: {}  order ${}  cap ${}  cooldown {}s",
        config.arb_threshold, config.arb_order_usdc, config.arb_max_usdc, config.arb_cooldown_secs);
    println!("  Momentum trigger: {}  max entry {}  main ${}  hedge ${}  cap ${}  cooldown {}s",
        config.momentum_trigger, config.momentum_max_entry, config.momentum_main_usdc,
        config.momentum_hedge_usdc, config.momentum_max_usdc, config.momentum_cooldown_secs);
    println!("  Ledger file: {}", config.inventory_file.display());
    println!("  User fill feed: {}", if config.has_api_credentials() { "Enabled" } else { "Disabled" });
    println!("  Merges: {}", if config.merge_key().is_some() { "Enabled" } else { "Disabled" });
    println!("  WebSocket prices: {}", if config.use_wss { "Enabled" } else { "Disabled" });
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// List the markets discovery currently returns.
async fn cmd_discover(config: Config) -> anyhow::Result<()> {
    let client = PolymarketClient::new(&config)?;
    let finder = GammaMarketFinder::new(client.http().clone(), &config);

    println!("Searching for {} up/down markets...\n", config.assets().join(", "));
    let markets = finder.active_markets().await?;
    if markets.is_empty() {
        println!("NO ACTIVE MARKET FOUND");
        return Ok(());
    }

    for market in markets {
        let prices = RestPriceFeed::new(client.clone())
            .current_prices(&market.up_token_id, &market.down_token_id)
            .await;
        println!("  {}", market.slug);
        println!("    Condition: {}", market.condition_id);
        println!("    UP {}  DOWN {}  (sum {})", prices.up, prices.down, prices.spread());
        println!("    Time remaining: {}", market.time_remaining_str());
    }
    Ok(())
}

/// Print the ledger file.
fn cmd_ledger(config: Config) -> anyhow::Result<()> {
    let ledger = Ledger::open(&config.inventory_file);
    println!("Ledger: {} ({} markets)", ledger.path().display(), ledger.len());

    for entry in ledger.entries() {
        let (leg, excess) = entry.imbalance();
        println!("  {}", entry.condition_id);
        println!("    UP {}  DOWN {}  pairs {}  excess {} {}",
            entry.up_balance, entry.down_balance, entry.redeemable_pairs(), excess, leg);
        println!("    invested ${}  redeemed ${}", entry.total_invested, entry.total_redeemed);
    }
    Ok(())
}

/// Run the trading loop until shutdown.
async fn cmd_run(
    mut config: Config,
    dry_run_override: Option<bool>,
    port_override: Option<u16>,
) -> anyhow::Result<()> {
    if let Some(dry_run) = dry_run_override {
        config.dry_run = dry_run;
    }
    if let Some(port) = port_override {
        config.port = port;
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(anyhow::anyhow!("Configuration validation failed: {}", e));
    }

    info!(
        mode = if config.dry_run { "SIMULATION" } else { "LIVE TRADING" },
        assets = %config.assets().join(","),
        ledger = %config.inventory_file.display(),
        "Configuration loaded"
    );

    if config.metrics_enabled {
        metrics::install_exporter(config.metrics_port)?;
    } else {
        metrics::init_metrics();
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let ledger = Arc::new(
        Ledger::open(&config.inventory_file)
            .with_reconcile_interval(Duration::from_secs(config.reconcile_interval_secs)),
    );
    info!(markets = ledger.len(), "Ledger loaded");

    let engine = Arc::new(DecisionEngine::new(EngineConfig::from(&config)));
    let client = PolymarketClient::new(&config)?;
    let market_feed: Arc<dyn MarketFeed> =
        Arc::new(GammaMarketFinder::new(client.http().clone(), &config));

    let reconnect =
        ReconnectConfig::from_config(config.ws_reconnect_max_delay_s, config.ws_heartbeat_interval_s);
    let (subscriptions, tokens_rx, markets_rx) = Subscriptions::channel();

    let rest_feed: Arc<dyn PriceFeed> = Arc::new(RestPriceFeed::new(client.clone()));
    let price_feed: Arc<dyn PriceFeed> = if config.use_wss {
        let cache = Arc::new(PriceCache::new());
        let socket = Arc::new(MarketSocket::new(
            config.polymarket_ws_url.clone(),
            reconnect.clone(),
            cache.clone(),
        ));
        tokio::spawn(socket.run(tokens_rx, shutdown_rx.clone()));
        Arc::new(CachedPriceFeed::new(cache, rest_feed, config.price_max_age()))
    } else {
        rest_feed
    };

    let (placer, settlement, history): (
        Arc<dyn OrderPlacer>,
        Arc<dyn Settlement>,
        Arc<dyn TradeHistorySource>,
    ) = if config.dry_run {
        info!("Simulation mode: orders and merges are simulated");
        (
            Arc::new(SimulatedOrderPlacer::new()),
            Arc::new(SimulatedSettlement::new(ledger.clone())),
            Arc::new(SimulatedTradeHistory),
        )
    } else {
        let signer = get_or_create_signer(&config.polymarket_private_key)?;
        let identity = WalletIdentity::from_config(&config)?;
        info!(signer = %identity.signer, funder = %identity.funder, kind = %identity.kind, "Wallet loaded");
        let placer = ClobOrderPlacer::new(client.clone(), OrderSigner::new(signer, identity, false))
            .with_timing(
                config.order_timeout(),
                Duration::from_millis(config.order_poll_interval_ms),
            );
        let merger = SafeMerger::from_config(&config);
        if !merger.is_ready() {
            warn!("Merge signer or Safe address missing, pairs must be redeemed manually");
        }
        (Arc::new(placer), Arc::new(merger), Arc::new(client.clone()))
    };

    let mut coordinator = ExecutionCoordinator::new(ledger.clone(), placer, settlement, history)
        .with_timeouts(config.order_timeout(), config.merge_timeout());

    if !config.dry_run {
        if let Some(credentials) = ApiCredentials::from_config(&config) {
            let registry = Arc::new(FillRegistry::new(ledger.clone()));
            let (fills_tx, fills_rx) = mpsc::channel(256);
            tokio::spawn(registry.clone().consume(fills_rx));
            let socket = UserSocket::new(
                config.polymarket_ws_url.clone(),
                reconnect.clone(),
                credentials,
                fills_tx,
            );
            tokio::spawn(socket.run(markets_rx, shutdown_rx.clone()));
            coordinator = coordinator.with_fill_registry(registry);
            info!("User fill feed enabled");
        }
    }

    let status = Arc::new(BotStatus::new());
    let app_state = AppState::new(status.clone(), ledger.clone(), engine.clone(), config.dry_run);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);
    let router = create_router(app_state);
    let mut server_shutdown = shutdown_rx.clone();
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            })
            .await
    });

    let bot = Bot::new(engine, Arc::new(coordinator), price_feed, market_feed, status)
        .with_timing(BotTiming {
            poll_interval: config.poll_interval(),
            market_refresh: config.market_refresh_interval(),
        })
        .with_subscriptions(subscriptions);

    bot.run(shutdown_rx).await;

    match server_handle.await {
        Ok(Err(e)) => warn!(error = %e, "HTTP server error"),
        Err(e) => warn!(error = %e, "HTTP server task failed"),
        Ok(Ok(())) => {}
    }

    info!(markets = ledger.len(), "Shutdown complete");
    Ok(())
}
