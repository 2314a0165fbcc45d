//! Market channel: keeps the best ask of every watched token in the price cache.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::{backoff, ReconnectConfig};
use crate::error::WsError;
use crate::pricing::PriceCache;

/// Price level as sent on the wire.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WsLevel {
    /// Price.
    pub price: String,
    /// Size.
    pub size: String,
}

/// One entry of a `price_change` event.
#[derive(Debug, Clone, Deserialize)]
pub struct WsPriceChange {
    /// Token.
    pub asset_id: Option<String>,
    /// Level price.
    pub price: String,
    /// New size at the level; zero removes it.
    pub size: String,
    /// BUY (bid) or SELL (ask).
    pub side: String,
    /// Best ask after the change, when the server includes it.
    pub best_ask: Option<String>,
}

/// Market channel event.
#[derive(Debug, Clone, Deserialize)]
pub struct WsEvent {
    /// `book`, `price_change`, `tick_size_change`, `last_trade_price`.
    pub event_type: Option<String>,
    /// Token (book events).
    pub asset_id: Option<String>,
    /// Asks (book events).
    pub asks: Option<Vec<WsLevel>>,
    /// Level changes (price_change events).
    pub price_changes: Option<Vec<WsPriceChange>>,
}

#[derive(Debug, Serialize)]
struct SubscribeMessage<'a> {
    #[serde(rename = "type")]
    msg_type: &'static str,
    assets_ids: &'a [String],
}

/// Ask side of one token's book.
#[derive(Debug, Clone, Default)]
struct AskBook {
    levels: BTreeMap<Decimal, Decimal>,
}

impl AskBook {
    fn replace(&mut self, asks: &[WsLevel]) {
        self.levels = asks
            .iter()
            .filter_map(|l| Some((l.price.parse().ok()?, l.size.parse().ok()?)))
            .filter(|(_, size): &(Decimal, Decimal)| *size > Decimal::ZERO)
            .collect();
    }

    fn set(&mut self, price: Decimal, size: Decimal) {
        if size <= Decimal::ZERO {
            self.levels.remove(&price);
        } else {
            self.levels.insert(price, size);
        }
    }

    fn best(&self) -> Option<Decimal> {
        self.levels.keys().next().copied()
    }
}

/// Streams market data for the watched tokens into a [`PriceCache`].
pub struct MarketSocket {
    ws_url: String,
    reconnect: ReconnectConfig,
    cache: Arc<PriceCache>,
    books: DashMap<String, AskBook>,
}

impl MarketSocket {
    /// Socket writing into `cache`.
    pub fn new(ws_url: impl Into<String>, reconnect: ReconnectConfig, cache: Arc<PriceCache>) -> Self {
        Self {
            ws_url: ws_url.into(),
            reconnect,
            cache,
            books: DashMap::new(),
        }
    }

    /// Apply one text frame. Returns the number of cache updates.
    pub fn process_message(&self, text: &str) -> usize {
        let events: Vec<WsEvent> = if text.trim_start().starts_with('[') {
            match serde_json::from_str(text) {
                Ok(events) => events,
                Err(_) => return 0,
            }
        } else {
            match serde_json::from_str(text) {
                Ok(event) => vec![event],
                Err(_) => return 0,
            }
        };

        let mut updates = 0;
        for event in events {
            match event.event_type.as_deref() {
                Some("book") => {
                    let Some(asset_id) = event.asset_id else { continue };
                    let mut book = self.books.entry(asset_id.clone()).or_default();
                    book.replace(event.asks.as_deref().unwrap_or_default());
                    if let Some(best) = book.best() {
                        self.cache.update(&asset_id, best);
                        updates += 1;
                    }
                }
                Some("price_change") => {
                    for change in event.price_changes.unwrap_or_default() {
                        let Some(asset_id) = change.asset_id else { continue };
                        let mut book = self.books.entry(asset_id.clone()).or_default();
                        if change.side.eq_ignore_ascii_case("SELL") {
                            if let (Ok(price), Ok(size)) =
                                (change.price.parse::<Decimal>(), change.size.parse::<Decimal>())
                            {
                                book.set(price, size);
                            }
                        }
                        let best = change
                            .best_ask
                            .as_deref()
                            .and_then(|b| b.parse::<Decimal>().ok())
                            .filter(|b| *b > Decimal::ZERO)
                            .or_else(|| book.best());
                        if let Some(best) = best {
                            self.cache.update(&asset_id, best);
                            updates += 1;
                        }
                    }
                }
                _ => {}
            }
        }
        updates
    }

    /// One connection: subscribe and pump frames until it drops, the
    /// watched set changes, or shutdown fires.
    async fn session(
        &self,
        assets: &[String],
        assets_rx: &mut watch::Receiver<Vec<String>>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), WsError> {
        let url = format!("{}/ws/market", self.ws_url.trim_end_matches('/'));
        info!(url = %url, assets = assets.len(), "Connecting market WebSocket");

        let (ws_stream, _) = connect_async(&url)
            .await
            .map_err(|e| WsError::ConnectionFailed(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let subscribe = serde_json::to_string(&SubscribeMessage {
            msg_type: "MARKET",
            assets_ids: assets,
        })
        .map_err(|e| WsError::SendFailed(e.to_string()))?;
        write
            .send(Message::Text(subscribe))
            .await
            .map_err(|e| WsError::SendFailed(e.to_string()))?;

        let mut heartbeat = tokio::time::interval(self.reconnect.heartbeat());
        heartbeat.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => return Ok(()),
                _ = assets_rx.changed() => {
                    debug!("Watched tokens changed, resubscribing");
                    return Ok(());
                }
                _ = heartbeat.tick() => {
                    write
                        .send(Message::Ping(Vec::new()))
                        .await
                        .map_err(|e| WsError::SendFailed(e.to_string()))?;
                }
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        let start = Instant::now();
                        metrics::counter!(crate::metrics::WS_MESSAGES_RECEIVED).increment(1);
                        let updates = self.process_message(&text);
                        debug!(updates, elapsed_us = start.elapsed().as_micros() as u64, "market frame");
                    }
                    Some(Ok(Message::Close(frame))) => {
                        warn!(frame = ?frame, "Market WebSocket closed");
                        return Err(WsError::ConnectionClosed {
                            code: frame.as_ref().map(|f| u16::from(f.code)),
                            reason: frame.map(|f| f.reason.to_string()).unwrap_or_default(),
                        });
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => {
                        return Err(WsError::ConnectionClosed {
                            code: None,
                            reason: "stream ended".to_string(),
                        })
                    }
                },
            }
        }
    }

    /// Run until shutdown, following changes to the watched token set.
    pub async fn run(
        self: Arc<Self>,
        mut assets_rx: watch::Receiver<Vec<String>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut attempt = 0u32;

        while !*shutdown.borrow() {
            let assets = assets_rx.borrow_and_update().clone();
            if assets.is_empty() {
                tokio::select! {
                    _ = assets_rx.changed() => continue,
                    _ = shutdown.changed() => break,
                }
            }

            match self.session(&assets, &mut assets_rx, &mut shutdown).await {
                Ok(()) => attempt = 0,
                Err(e) => {
                    error!(error = %e, attempt, "Market WebSocket failed");
                    if !backoff(&self.reconnect, attempt, &mut shutdown).await {
                        break;
                    }
                    attempt = attempt.saturating_add(1);
                }
            }
        }
        info!("Market WebSocket stopped");
    }
}
