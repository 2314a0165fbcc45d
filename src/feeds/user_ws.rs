//! User channel: fill notifications for our own orders.

use futures::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::{backoff, ReconnectConfig};
use crate::error::WsError;
use crate::execution::FillEvent;
use crate::market::Leg;
use crate::signing::ApiCredentials;

#[derive(Debug, Deserialize)]
struct MakerOrder {
    order_id: String,
    #[serde(default)]
    owner: Option<String>,
    matched_amount: String,
    price: String,
    #[serde(default)]
    outcome: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TradeMessage {
    event_type: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    trader_side: Option<String>,
    #[serde(default)]
    taker_order_id: Option<String>,
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    price: Option<String>,
    #[serde(default)]
    outcome: Option<String>,
    #[serde(default)]
    maker_orders: Vec<MakerOrder>,
}

#[derive(Serialize)]
struct Auth<'a> {
    #[serde(rename = "apiKey")]
    api_key: &'a str,
    secret: &'a str,
    passphrase: &'a str,
}

#[derive(Serialize)]
struct Subscribe<'a> {
    auth: Auth<'a>,
    markets: &'a [String],
    #[serde(rename = "type")]
    channel: &'static str,
}

fn leg_of(outcome: Option<&str>) -> Option<Leg> {
    outcome.and_then(|o| o.parse().ok())
}

/// Extract our fills from one user-channel frame.
///
/// Only `MATCHED` trades count; later status updates for the same trade
/// would otherwise be applied again. The taker side is ours unless the
/// event says we were the maker, in which case the maker entries owned by
/// `api_key` are reported instead.
pub fn parse_fill_events(text: &str, api_key: Option<&str>) -> Vec<FillEvent> {
    let messages: Vec<TradeMessage> = if text.trim_start().starts_with('[') {
        serde_json::from_str(text).unwrap_or_default()
    } else {
        serde_json::from_str(text).map(|m| vec![m]).unwrap_or_default()
    };

    let mut fills = Vec::new();
    for msg in messages {
        if msg.event_type.as_deref() != Some("trade")
            || !msg.status.as_deref().is_some_and(|s| s.eq_ignore_ascii_case("MATCHED"))
        {
            continue;
        }

        let maker = msg
            .trader_side
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("MAKER"));

        if maker {
            for order in &msg.maker_orders {
                if api_key.is_some() && order.owner.as_deref() != api_key {
                    continue;
                }
                let (Ok(size), Ok(price)) = (order.matched_amount.parse(), order.price.parse())
                else {
                    continue;
                };
                fills.push(FillEvent {
                    order_id: order.order_id.clone(),
                    leg: leg_of(order.outcome.as_deref()),
                    size,
                    price,
                });
            }
            continue;
        }

        let (Some(order_id), Some(size), Some(price)) = (
            msg.taker_order_id,
            msg.size.as_deref().and_then(|s| s.parse::<Decimal>().ok()),
            msg.price.as_deref().and_then(|p| p.parse::<Decimal>().ok()),
        ) else {
            continue;
        };
        fills.push(FillEvent {
            order_id,
            leg: leg_of(msg.outcome.as_deref()),
            size,
            price,
        });
    }
    fills
}

/// Authenticated user-channel listener.
pub struct UserSocket {
    ws_url: String,
    reconnect: ReconnectConfig,
    credentials: ApiCredentials,
    fills: mpsc::Sender<FillEvent>,
}

impl UserSocket {
    /// Socket forwarding fills into `fills`.
    pub fn new(
        ws_url: impl Into<String>,
        reconnect: ReconnectConfig,
        credentials: ApiCredentials,
        fills: mpsc::Sender<FillEvent>,
    ) -> Self {
        Self {
            ws_url: ws_url.into(),
            reconnect,
            credentials,
            fills,
        }
    }

    async fn session(
        &self,
        markets: &[String],
        markets_rx: &mut watch::Receiver<Vec<String>>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), WsError> {
        let url = format!("{}/ws/user", self.ws_url.trim_end_matches('/'));
        info!(url = %url, markets = markets.len(), "Connecting user WebSocket");

        let (ws_stream, _) = connect_async(&url)
            .await
            .map_err(|e| WsError::ConnectionFailed(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let subscribe = serde_json::to_string(&Subscribe {
            auth: Auth {
                api_key: &self.credentials.key,
                secret: &self.credentials.secret,
                passphrase: &self.credentials.passphrase,
            },
            markets,
            channel: "user",
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
                _ = markets_rx.changed() => return Ok(()),
                _ = heartbeat.tick() => {
                    write
                        .send(Message::Ping(Vec::new()))
                        .await
                        .map_err(|e| WsError::SendFailed(e.to_string()))?;
                }
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        metrics::counter!(crate::metrics::WS_MESSAGES_RECEIVED).increment(1);
                        for fill in parse_fill_events(&text, Some(&self.credentials.key)) {
                            debug!(order_id = %crate::utils::short_id(&fill.order_id), size = %fill.size, "fill");
                            if self.fills.send(fill).await.is_err() {
                                warn!("Fill receiver dropped");
                                return Ok(());
                            }
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
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

    /// Run until shutdown, following changes to the watched market set.
    pub async fn run(
        self,
        mut markets_rx: watch::Receiver<Vec<String>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut attempt = 0u32;

        while !*shutdown.borrow() && !self.fills.is_closed() {
            let markets = markets_rx.borrow_and_update().clone();
            if markets.is_empty() {
                tokio::select! {
                    _ = markets_rx.changed() => continue,
                    _ = shutdown.changed() => break,
                }
            }

            match self.session(&markets, &mut markets_rx, &mut shutdown).await {
                Ok(()) => attempt = 0,
                Err(e) => {
                    error!(error = %e, attempt, "User WebSocket failed");
                    if !backoff(&self.reconnect, attempt, &mut shutdown).await {
                        break;
                    }
                    attempt = attempt.saturating_add(1);
                }
            }
        }
        info!("User WebSocket stopped");
    }
}
