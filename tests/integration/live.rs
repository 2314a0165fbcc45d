//! Tests against the real Polymarket APIs.
//!
//! These need network access; the authenticated ones also need
//! POLYMARKET_PRIVATE_KEY and L2 API credentials in the environment.

use updown_bot::config::Config;
use updown_bot::market::{GammaMarketFinder, MarketFeed, PolymarketClient};
use updown_bot::pricing::{PriceFeed, RestPriceFeed};
use updown_bot::signing::address_from_private_key;

const TEST_KEY: &str = "0x0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

/// Config from the environment, or defaults in dry-run mode.
fn test_config() -> Config {
    Config::load().unwrap_or_default()
}

/// Config with a real key and API credentials, if present.
fn authenticated_config() -> Option<Config> {
    let config = Config::load().ok()?;

    // Skip if using placeholder key
    if config.polymarket_private_key.starts_with("0x1234")
        || config.polymarket_private_key.len() < 64
        || !config.has_api_credentials()
    {
        return None;
    }
    Some(config)
}

/// Test market discovery.
#[tokio::test]
#[ignore = "requires network access"]
async fn test_market_discovery() {
    let config = test_config();
    let client = PolymarketClient::new(&config).expect("client");
    let finder = GammaMarketFinder::new(client.http().clone(), &config);

    match finder.active_markets().await {
        Ok(markets) => {
            println!("Found {} markets", markets.len());
            for market in &markets {
                assert_ne!(market.up_token_id, market.down_token_id);
                println!("  {} closes in {}", market.slug, market.time_remaining_str());
            }
        }
        Err(e) => println!("Discovery failed: {}", e),
    }
}

/// Test that prices for a discovered market land in [0, 1].
#[tokio::test]
#[ignore = "requires network access"]
async fn test_rest_prices() {
    let config = test_config();
    let client = PolymarketClient::new(&config).expect("client");
    let finder = GammaMarketFinder::new(client.http().clone(), &config);

    let Some(market) = finder.active_markets().await.ok().and_then(|m| m.into_iter().next()) else {
        println!("Skipping: no active market");
        return;
    };

    let prices = RestPriceFeed::new(client)
        .current_prices(&market.up_token_id, &market.down_token_id)
        .await;
    println!("{}: UP {} DOWN {}", market.slug, prices.up, prices.down);
    assert!(prices.up >= rust_decimal::Decimal::ZERO && prices.up <= rust_decimal::Decimal::ONE);
    assert!(prices.down >= rust_decimal::Decimal::ZERO && prices.down <= rust_decimal::Decimal::ONE);
}

/// Test that the trade history can be fetched with L2 credentials.
#[tokio::test]
#[ignore = "requires POLYMARKET_PRIVATE_KEY and API credentials"]
async fn test_trade_history() {
    let Some(config) = authenticated_config() else {
        println!("Skipping: credentials not set");
        return;
    };

    let client = PolymarketClient::new(&config).expect("client");
    let result = client.get_trades().await;
    assert!(result.is_ok(), "Failed to fetch trades: {:?}", result.err());
    println!("Fetched {} trades", result.unwrap().len());
}

/// Test signing utilities.
#[test]
fn test_address_derivation() {
    let address = address_from_private_key(TEST_KEY).unwrap();
    let text = address.to_string();
    assert!(text.starts_with("0x"));
    assert_eq!(text.len(), 42);
}
