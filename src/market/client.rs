//! Polymarket CLOB REST client.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::config::Config;
use crate::error::{MarketError, TradingError};
use crate::execution::{Side, TradeHistorySource, TradeRecord};
use crate::signing::{self, ApiCredentials};

use super::types::Leg;

/// Cursor the CLOB returns after the last page.
const END_CURSOR: &str = "LTE=";

/// Cursor meaning "first page"; never sent explicitly.
const START_CURSOR: &str = "MA==";

/// Upper bound on pages fetched in one history walk.
const MAX_TRADE_PAGES: usize = 50;

/// Polymarket CLOB API client.
#[derive(Debug, Clone)]
pub struct PolymarketClient {
    /// Pooled HTTP client.
    http: reqwest::Client,
    /// Base URL for the CLOB API.
    clob_url: String,
    /// L2 credentials, when configured.
    credentials: Option<ApiCredentials>,
    /// Address the API key was derived for.
    address: Option<String>,
}

/// One page of `/data/trades`.
#[derive(Debug, Clone, Deserialize)]
struct TradesPage {
    #[serde(default)]
    data: Vec<RawTrade>,
    #[serde(default)]
    next_cursor: Option<String>,
}

/// Either a bare array or a paginated envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum TradesResponse {
    Page(TradesPage),
    Bare(Vec<RawTrade>),
}

/// A trade as the CLOB reports it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTrade {
    /// Condition ID.
    #[serde(default)]
    pub market: String,
    /// Token traded.
    #[serde(default)]
    pub asset_id: String,
    /// BUY / SELL.
    #[serde(default)]
    pub side: String,
    /// Outcome label (Up/Down, Yes/No).
    #[serde(default)]
    pub outcome: String,
    /// Tokens, as a decimal string.
    #[serde(default)]
    pub size: String,
    /// Price, as a decimal string.
    #[serde(default)]
    pub price: String,
    /// MATCHED, MINED, CONFIRMED, RETRYING, FAILED.
    #[serde(default)]
    pub status: String,
}

impl RawTrade {
    /// Typed record, or `None` if a field does not parse.
    pub fn to_record(&self) -> Option<TradeRecord> {
        let leg = self.outcome.parse::<Leg>().ok()?;
        let side = self.side.parse::<Side>().ok()?;
        let size = self.size.parse::<Decimal>().ok()?;
        let price = self.price.parse::<Decimal>().unwrap_or(Decimal::ZERO);
        if self.market.is_empty() {
            return None;
        }
        Some(TradeRecord {
            market_id: self.market.clone(),
            asset_id: self.asset_id.clone(),
            leg,
            side,
            size,
            price,
            status: self.status.clone(),
        })
    }
}

impl PolymarketClient {
    /// Create a client with pooled, low-latency HTTP settings.
    pub fn new(config: &Config) -> Result<Self, MarketError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.http_timeout_ms))
            .connect_timeout(Duration::from_millis(1_000))
            .tcp_nodelay(true)
            .tcp_keepalive(Duration::from_secs(30))
            .pool_max_idle_per_host(config.http_pool_size)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        let address = if config.polymarket_private_key.is_empty() {
            None
        } else {
            signing::address_from_private_key(&config.polymarket_private_key)
                .ok()
                .map(|a| format!("{:#x}", a))
        };

        Ok(Self {
            http,
            clob_url: config.polymarket_clob_url.trim_end_matches('/').to_string(),
            credentials: ApiCredentials::from_config(config),
            address,
        })
    }

    /// Shared HTTP client.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// CLOB base URL.
    pub fn clob_url(&self) -> &str {
        &self.clob_url
    }

    /// L2 credentials.
    pub fn credentials(&self) -> Option<&ApiCredentials> {
        self.credentials.as_ref()
    }

    /// Signer address, lowercase hex.
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    /// L2 headers for `method path body`.
    pub fn auth_headers(
        &self,
        method: &str,
        path: &str,
        body: &str,
    ) -> Result<Vec<(&'static str, String)>, TradingError> {
        let creds = self.credentials.as_ref().ok_or_else(|| {
            TradingError::SigningError("API credentials not configured".to_string())
        })?;
        let address = self.address.as_deref().ok_or_else(|| {
            TradingError::SigningError("wallet key not configured".to_string())
        })?;
        signing::l2_headers(creds, address, method, path, body)
    }

    /// Best ask for `token_id` (`/price?side=BUY`).
    #[instrument(skip(self), fields(token = %crate::utils::short_id(token_id)))]
    pub async fn get_price(&self, token_id: &str) -> Result<Decimal, MarketError> {
        let url = format!("{}/price", self.clob_url);
        let json = self
            .get_json(&url, &[("token_id", token_id), ("side", "BUY")], token_id)
            .await?;
        parse_decimal_field(&json, &["price"])
            .or_else(|| parse_decimal_value(&json))
            .ok_or_else(|| MarketError::ParseError(format!("no price in {}", json)))
    }

    /// Midpoint for `token_id` (`/midpoint`).
    #[instrument(skip(self), fields(token = %crate::utils::short_id(token_id)))]
    pub async fn get_midpoint(&self, token_id: &str) -> Result<Decimal, MarketError> {
        let url = format!("{}/midpoint", self.clob_url);
        let json = self.get_json(&url, &[("token_id", token_id)], token_id).await?;
        parse_decimal_field(&json, &["mid", "midpoint"])
            .ok_or_else(|| MarketError::ParseError(format!("no midpoint in {}", json)))
    }

    async fn get_json(
        &self,
        url: &str,
        query: &[(&str, &str)],
        resource: &str,
    ) -> Result<serde_json::Value, MarketError> {
        let response = self.http.get(url).query(query).send().await?;
        if !response.status().is_success() {
            return Err(MarketError::FetchFailed {
                resource: resource.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }
        response
            .json()
            .await
            .map_err(|e| MarketError::ParseError(format!("{}: {}", resource, e)))
    }

    /// Every trade of the account, following the cursor to the end.
    #[instrument(skip(self))]
    pub async fn get_trades(&self) -> Result<Vec<RawTrade>, TradingError> {
        let path = "/data/trades";
        let url = format!("{}{}", self.clob_url, path);
        let mut cursor: Option<String> = None;
        let mut trades = Vec::new();

        for fetched in 1.. {
            let headers = self.auth_headers("GET", path, "")?;
            let mut request = self.http.get(&url);
            if let Some(c) = cursor.as_deref().filter(|c| *c != START_CURSOR) {
                request = request.query(&[("next_cursor", c)]);
            }
            for (key, value) in headers {
                request = request.header(key, value);
            }

            let response = request
                .send()
                .await
                .map_err(|e| TradingError::HistoryFailed(e.to_string()))?;
            if !response.status().is_success() {
                return Err(TradingError::HistoryFailed(format!("HTTP {}", response.status())));
            }
            let page: TradesResponse = response
                .json()
                .await
                .map_err(|e| TradingError::HistoryFailed(format!("parse: {}", e)))?;

            let next = match page {
                TradesResponse::Bare(batch) => {
                    trades.extend(batch);
                    None
                }
                TradesResponse::Page(page) => {
                    trades.extend(page.data);
                    page.next_cursor
                }
            };
            match next_page(fetched, next)? {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        debug!(count = trades.len(), "Fetched trade history");
        Ok(trades)
    }
}

#[async_trait]
impl TradeHistorySource for PolymarketClient {
    async fn trades(&self) -> Result<Vec<TradeRecord>, TradingError> {
        let raw = self.get_trades().await?;
        let total = raw.len();
        let records: Vec<_> = raw.iter().filter_map(RawTrade::to_record).collect();
        if records.len() < total {
            warn!(skipped = total - records.len(), "Skipped unparseable trades");
        }
        Ok(records)
    }
}

/// Cursor of the page to fetch after `fetched` pages, or `None` at the end.
///
/// A partial history would under-count positions on rebuild, so running
/// out of pages with a cursor still pending is an error.
fn next_page(fetched: usize, next_cursor: Option<String>) -> Result<Option<String>, TradingError> {
    let next = next_cursor.filter(|c| !c.is_empty() && c != END_CURSOR);
    match next {
        Some(_) if fetched >= MAX_TRADE_PAGES => Err(TradingError::HistoryFailed(format!(
            "trade history truncated after {} pages",
            MAX_TRADE_PAGES
        ))),
        next => Ok(next),
    }
}

fn parse_decimal_value(value: &serde_json::Value) -> Option<Decimal> {
    if let Some(s) = value.as_str() {
        return s.parse().ok();
    }
    value.as_f64().and_then(|n| Decimal::try_from(n).ok())
}

/// First of `keys` present in `json` as a decimal string or number.
pub(crate) fn parse_decimal_field(json: &serde_json::Value, keys: &[&str]) -> Option<Decimal> {
    keys.iter()
        .filter_map(|key| json.get(*key))
        .find_map(parse_decimal_value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn client_creation_works() {
        let config = Config {
            polymarket_private_key:
                "0x0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef".to_string(),
            polymarket_clob_url: "https://clob.polymarket.com/".to_string(),
            ..Config::default()
        };
        let client = PolymarketClient::new(&config).unwrap();
        assert_eq!(client.clob_url(), "https://clob.polymarket.com");
        let address = client.address().unwrap();
        assert!(address.starts_with("0x"));
        assert_eq!(address.len(), 42);
        assert!(client.auth_headers("GET", "/data/trades", "").is_err());
    }

    #[test]
    fn parse_decimal_field_works() {
        let json = serde_json::json!({"price": "0.52", "mid": 0.5});
        assert_eq!(parse_decimal_field(&json, &["price"]), Some(dec!(0.52)));
        assert_eq!(parse_decimal_field(&json, &["missing", "mid"]), Some(dec!(0.5)));
        assert_eq!(parse_decimal_field(&json, &["missing"]), None);
        assert_eq!(parse_decimal_value(&serde_json::json!(0.25)), Some(dec!(0.25)));
    }

    #[test]
    fn trades_response_shapes() {
        let page: TradesResponse = serde_json::from_str(
            r#"{"data":[{"market":"0xabc","asset_id":"1","side":"BUY","outcome":"Up","size":"10","price":"0.5","status":"MATCHED"}],"next_cursor":"LTE="}"#,
        )
        .unwrap();
        assert!(matches!(page, TradesResponse::Page(ref p) if p.data.len() == 1));

        let bare: TradesResponse = serde_json::from_str(r#"[{"market":"0xabc"}]"#).unwrap();
        assert!(matches!(bare, TradesResponse::Bare(ref v) if v.len() == 1));
    }

    #[test]
    fn paging_stops_at_end_cursor() {
        assert_eq!(next_page(1, Some("abc".to_string())).unwrap(), Some("abc".to_string()));
        assert_eq!(next_page(1, Some(END_CURSOR.to_string())).unwrap(), None);
        assert_eq!(next_page(1, Some(String::new())).unwrap(), None);
        assert_eq!(next_page(1, None).unwrap(), None);
    }

    #[test]
    fn paging_past_limit_is_an_error() {
        assert_eq!(next_page(MAX_TRADE_PAGES, None).unwrap(), None);
        assert_eq!(next_page(MAX_TRADE_PAGES, Some(END_CURSOR.to_string())).unwrap(), None);
        let err = next_page(MAX_TRADE_PAGES, Some("more".to_string())).unwrap_err();
        assert!(matches!(err, TradingError::HistoryFailed(ref msg) if msg.contains("truncated")));
    }

    #[test]
    fn raw_trade_mapping() {
        let raw = RawTrade {
            market: "0xabc".to_string(),
            asset_id: "111".to_string(),
            side: "BUY".to_string(),
            outcome: "Down".to_string(),
            size: "7.5".to_string(),
            price: "0.4".to_string(),
            status: "CONFIRMED".to_string(),
        };
        let record = raw.to_record().unwrap();
        assert_eq!(record.leg, Leg::Down);
        assert_eq!(record.side, Side::Buy);
        assert_eq!(record.size, dec!(7.5));
        assert!(record.is_settled_buy());

        let unknown = RawTrade {
            outcome: "Maybe".to_string(),
            ..raw
        };
        assert!(unknown.to_record().is_none());
    }
}
