//! Market discovery for Up/Down markets via the Gamma API.

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};
use tracing::{debug, info, instrument, warn};

use super::types::{Leg, Market};
use crate::config::Config;
use crate::error::MarketError;

/// Source of tradeable markets.
#[async_trait]
pub trait MarketFeed: Send + Sync {
    /// Open markets worth trading, soonest close first.
    async fn active_markets(&self) -> Result<Vec<Market>, MarketError>;
}

/// Market as returned by Gamma `/markets`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GammaMarket {
    /// Condition ID.
    pub condition_id: Option<String>,
    /// Market slug.
    pub slug: Option<String>,
    /// Question text.
    pub question: Option<String>,
    /// Close time (RFC 3339).
    pub end_date: Option<String>,
    /// Close time (ISO, sometimes date only).
    pub end_date_iso: Option<String>,
    /// Token IDs, either an array or a JSON-encoded string.
    pub clob_token_ids: Option<Value>,
    /// Structured outcome tokens.
    pub tokens: Option<Vec<GammaToken>>,
    /// Whether the market is closed.
    pub closed: Option<bool>,
}

/// Outcome token inside a Gamma market.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GammaToken {
    /// Outcome label ("Up" / "Down").
    #[serde(default)]
    pub outcome: String,
    /// Token ID.
    #[serde(default, alias = "tokenId", alias = "clobTokenId")]
    pub token_id: String,
}

/// Slug prefix regex for the configured assets.
pub fn slug_pattern(assets: &[String]) -> Result<Regex, MarketError> {
    let alternatives = assets
        .iter()
        .map(|a| regex::escape(a))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"^({})-up-or-down-", alternatives))
        .map_err(|e| MarketError::ParseError(format!("invalid asset pattern: {}", e)))
}

fn parse_close_time(raw: &str) -> Option<OffsetDateTime> {
    if let Ok(t) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(t);
    }
    let naive = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    PrimitiveDateTime::parse(raw, naive)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

fn clob_token_ids(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Value::String(encoded) => serde_json::from_str(encoded).unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Token IDs as `(up, down)`: structured tokens first, then `clobTokenIds[0..2]`.
fn extract_token_ids(raw: &GammaMarket) -> (Option<String>, Option<String>) {
    let mut up = None;
    let mut down = None;

    for token in raw.tokens.iter().flatten() {
        if token.token_id.is_empty() {
            continue;
        }
        match token.outcome.parse::<Leg>() {
            Ok(Leg::Up) => up = Some(token.token_id.clone()),
            Ok(Leg::Down) => down = Some(token.token_id.clone()),
            Err(_) => {}
        }
    }

    if up.is_none() || down.is_none() {
        let ids = raw.clob_token_ids.as_ref().map(clob_token_ids).unwrap_or_default();
        if up.is_none() {
            up = ids.first().cloned();
        }
        if down.is_none() {
            down = ids.get(1).cloned();
        }
    }

    (up, down)
}

/// Convert a Gamma market, or `None` if it lacks an ID, tokens or close time.
pub fn parse_market(raw: &GammaMarket) -> Option<Market> {
    let condition_id = raw.condition_id.clone().filter(|c| !c.is_empty())?;
    let close_time = raw
        .end_date
        .as_deref()
        .or(raw.end_date_iso.as_deref())
        .and_then(parse_close_time)?;
    let (up_token_id, down_token_id) = match extract_token_ids(raw) {
        (Some(up), Some(down)) => (up, down),
        _ => return None,
    };

    Some(Market {
        condition_id,
        slug: raw.slug.clone().unwrap_or_default(),
        up_token_id,
        down_token_id,
        close_time,
        question: raw.question.clone(),
    })
}

/// Keep markets closing within `max_age` of `now`, soonest first.
pub fn select_markets(markets: Vec<Market>, now: OffsetDateTime, max_age: Duration) -> Vec<Market> {
    let horizon = max_age.as_secs_f64() / 60.0;
    let mut open: Vec<Market> = markets
        .into_iter()
        .filter(|m| {
            let minutes = m.minutes_to_close_at(now);
            minutes > 0.0 && minutes <= horizon
        })
        .collect();
    open.sort_by_key(|m| m.close_time);
    open.dedup_by(|a, b| a.condition_id == b.condition_id);
    open
}

/// Finds Up/Down markets for the configured assets through Gamma.
#[derive(Debug, Clone)]
pub struct GammaMarketFinder {
    http: reqwest::Client,
    gamma_url: String,
    assets: Vec<String>,
    forced_slug: Option<String>,
    max_age: Duration,
}

impl GammaMarketFinder {
    /// Create a finder from config.
    pub fn new(http: reqwest::Client, config: &Config) -> Self {
        Self {
            http,
            gamma_url: config.polymarket_gamma_url.trim_end_matches('/').to_string(),
            assets: config.assets(),
            forced_slug: config.polymarket_market_slug.clone(),
            max_age: Duration::from_secs(config.max_market_age_h * 3600),
        }
    }

    async fn fetch(&self, query: &[(&str, String)]) -> Result<Vec<GammaMarket>, MarketError> {
        let url = format!("{}/markets", self.gamma_url);
        let response = self.http.get(&url).query(query).send().await?;

        if !response.status().is_success() {
            return Err(MarketError::FetchFailed {
                resource: url,
                reason: format!("HTTP {}", response.status()),
            });
        }

        // Either a bare array or `{ "data": [...] }`.
        let body: Value = response
            .json()
            .await
            .map_err(|e| MarketError::ParseError(format!("Failed to parse Gamma response: {}", e)))?;
        let items = match body {
            Value::Object(mut map) => map.remove("data").unwrap_or(Value::Array(Vec::new())),
            other => other,
        };
        serde_json::from_value(items)
            .map_err(|e| MarketError::ParseError(format!("Unexpected Gamma market shape: {}", e)))
    }

    /// Fetch one market by slug.
    #[instrument(skip(self))]
    pub async fn fetch_by_slug(&self, slug: &str) -> Result<Market, MarketError> {
        let raw = self.fetch(&[("slug", slug.to_string())]).await?;
        raw.iter()
            .find_map(parse_market)
            .ok_or_else(|| MarketError::FetchFailed {
                resource: slug.to_string(),
                reason: "market missing token IDs or close time".to_string(),
            })
    }

    /// Open markets matching the asset slug convention.
    #[instrument(skip(self))]
    async fn search(&self) -> Result<Vec<Market>, MarketError> {
        let pattern = slug_pattern(&self.assets)?;
        let now = OffsetDateTime::now_utc();
        let horizon = now + self.max_age;
        let fmt = |t: OffsetDateTime| t.format(&Rfc3339).unwrap_or_default();

        let raw = self
            .fetch(&[
                ("closed", "false".to_string()),
                ("limit", "500".to_string()),
                ("end_date_min", fmt(now)),
                ("end_date_max", fmt(horizon)),
            ])
            .await?;

        let total = raw.len();
        let parsed: Vec<Market> = raw
            .iter()
            .filter(|m| m.closed != Some(true))
            .filter(|m| m.slug.as_deref().is_some_and(|s| pattern.is_match(s)))
            .filter_map(parse_market)
            .collect();
        debug!(total, matching = parsed.len(), "Gamma markets scanned");

        Ok(parsed)
    }
}

#[async_trait]
impl MarketFeed for GammaMarketFinder {
    async fn active_markets(&self) -> Result<Vec<Market>, MarketError> {
        let markets = match &self.forced_slug {
            Some(slug) => vec![self.fetch_by_slug(slug).await?],
            None => self.search().await?,
        };

        let selected = select_markets(markets, OffsetDateTime::now_utc(), self.max_age);
        if selected.is_empty() {
            warn!(assets = ?self.assets, "no open up/down markets within the age window");
        } else {
            info!(count = selected.len(), "active markets discovered");
        }
        Ok(selected)
    }
}
