//! Live order placement on the Polymarket CLOB.
//!
//! A buy is a signed FOK order at the price hint. If the exchange does not
//! report it matched in the submit response, its status is polled until a
//! terminal state or the order timeout, and cancelled on timeout.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use super::order::{OrderParams, OrderState, OrderStatus, PlacedOrder, TimeInForce};
use super::traits::OrderPlacer;
use crate::error::TradingError;
use crate::market::client::parse_decimal_field;
use crate::market::PolymarketClient;
use crate::signing::OrderSigner;

/// Default timeout for order operations.
pub const DEFAULT_ORDER_TIMEOUT: Duration = Duration::from_secs(5);

/// Default poll interval for order status.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Places signed orders through the CLOB REST API.
#[derive(Debug, Clone)]
pub struct ClobOrderPlacer {
    client: PolymarketClient,
    signer: OrderSigner,
    tif: TimeInForce,
    timeout: Duration,
    poll_interval: Duration,
}

impl ClobOrderPlacer {
    /// Placer submitting FOK orders with default timing.
    pub fn new(client: PolymarketClient, signer: OrderSigner) -> Self {
        Self {
            client,
            signer,
            tif: TimeInForce::FOK,
            timeout: DEFAULT_ORDER_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the status polling deadline and interval.
    pub fn with_timing(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.timeout = timeout;
        self.poll_interval = poll_interval;
        self
    }

    /// Submit a signed order. Returns the order ID and the raw response.
    #[instrument(skip(self, params), fields(token = %crate::utils::short_id(&params.token_id)))]
    pub async fn submit_order(
        &self,
        params: &OrderParams,
    ) -> Result<(String, serde_json::Value), TradingError> {
        params.validate().map_err(TradingError::InvalidParams)?;

        let owner = self
            .client
            .credentials()
            .map(|c| c.key.clone())
            .ok_or_else(|| TradingError::SigningError("API credentials not configured".to_string()))?;
        let signed = self
            .signer
            .market_buy(&params.token_id, params.usdc, params.price, params.tif, &owner)?;
        let body = serde_json::to_string(&signed)
            .map_err(|e| TradingError::SubmissionFailed(format!("encode order: {}", e)))?;

        let path = "/order";
        let mut request = self
            .client
            .http()
            .post(format!("{}{}", self.client.clob_url(), path))
            .header("Content-Type", "application/json")
            .body(body.clone());
        for (key, value) in self.client.auth_headers("POST", path, &body)? {
            request = request.header(key, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TradingError::SubmissionFailed(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let json: serde_json::Value = response.json().await.unwrap_or_default();
        if !status.is_success() {
            return Err(TradingError::OrderRejected {
                reason: format!("HTTP {}: {}", status, error_message(&json).unwrap_or_default()),
            });
        }
        if json.get("success").and_then(|v| v.as_bool()) == Some(false) {
            return Err(TradingError::OrderRejected {
                reason: error_message(&json).unwrap_or_else(|| "success=false".to_string()),
            });
        }
        if let Some(message) = error_message(&json) {
            return Err(TradingError::OrderRejected { reason: message });
        }

        let order_id = extract_order_id(&json)
            .ok_or_else(|| TradingError::SubmissionFailed("no order ID in response".to_string()))?;

        info!(
            order_id = %order_id,
            usdc = %params.usdc,
            price = %params.price,
            tif = %params.tif,
            "Order submitted"
        );
        Ok((order_id, json))
    }

    /// Poll until terminal or the deadline passes.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn wait_for_terminal_order(&self, order_id: &str) -> OrderState {
        let start = Instant::now();

        loop {
            if start.elapsed() >= self.timeout {
                warn!("Order status polling timed out");
                return OrderState {
                    order_id: order_id.to_string(),
                    ..Default::default()
                };
            }

            match self.get_order_status(order_id).await {
                Ok(state) if state.is_terminal => return state,
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Error getting order status"),
            }

            sleep(self.poll_interval).await;
        }
    }

    /// Current status of `order_id`.
    pub async fn get_order_status(&self, order_id: &str) -> Result<OrderState, TradingError> {
        let path = format!("/data/order/{}", order_id);
        let status_failed = |reason: String| TradingError::StatusFailed {
            order_id: order_id.to_string(),
            reason,
        };

        let mut request = self
            .client
            .http()
            .get(format!("{}{}", self.client.clob_url(), path));
        for (key, value) in self.client.auth_headers("GET", &path, "")? {
            request = request.header(key, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| status_failed(format!("HTTP request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(status_failed(format!("HTTP {}", response.status())));
        }
        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| status_failed(format!("parse: {}", e)))?;

        Ok(order_state(order_id, &json))
    }

    /// Cancel one order.
    #[instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: &str) -> Result<(), TradingError> {
        let path = "/order";
        let body = serde_json::json!({ "orderID": order_id }).to_string();

        let mut request = self
            .client
            .http()
            .delete(format!("{}{}", self.client.clob_url(), path))
            .header("Content-Type", "application/json")
            .body(body.clone());
        for (key, value) in self.client.auth_headers("DELETE", path, &body)? {
            request = request.header(key, value);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                info!(order_id = %order_id, "Order cancelled");
                Ok(())
            }
            Ok(response) => {
                error!(order_id = %order_id, status = %response.status(), "Failed to cancel order");
                Err(TradingError::CancelFailed {
                    order_id: order_id.to_string(),
                    reason: format!("HTTP {}", response.status()),
                })
            }
            Err(e) => {
                error!(order_id = %order_id, error = %e, "Failed to cancel order");
                Err(TradingError::CancelFailed {
                    order_id: order_id.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[async_trait]
impl OrderPlacer for ClobOrderPlacer {
    async fn buy(
        &self,
        token_id: &str,
        usdc: Decimal,
        price_hint: Decimal,
    ) -> Result<PlacedOrder, TradingError> {
        let params = OrderParams::buy(token_id, usdc, price_hint).with_tif(self.tif);
        let (order_id, response) = self.submit_order(&params).await?;

        let submitted = order_state(&order_id, &response);
        let state = if submitted.is_terminal {
            submitted
        } else {
            debug!(order_id = %order_id, "Order not terminal on submit, polling");
            self.wait_for_terminal_order(&order_id).await
        };

        if !state.is_terminal {
            // Timed out: make sure nothing rests on the book.
            if let Err(e) = self.cancel_order(&order_id).await {
                warn!(order_id = %order_id, error = %e, "Cancel after timeout failed");
            }
            return Err(TradingError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            });
        }
        if !state.is_filled {
            return Err(TradingError::NotFilled { order_id });
        }

        // For a buy the taking side is tokens, the making side collateral.
        let tokens_received = state
            .filled_size
            .or_else(|| parse_decimal_field(&response, &["takingAmount"]))
            .filter(|t| *t > Decimal::ZERO);
        let usdc_spent = parse_decimal_field(&response, &["makingAmount"]).filter(|u| *u > Decimal::ZERO);

        Ok(PlacedOrder {
            order_id,
            tokens_received,
            usdc_spent,
        })
    }
}

/// Order state from a submit or status response.
fn order_state(order_id: &str, json: &serde_json::Value) -> OrderState {
    let status = ["status", "orderStatus", "order_status"]
        .iter()
        .find_map(|key| json.get(*key).and_then(|v| v.as_str()))
        .and_then(|s| s.parse::<OrderStatus>().ok());
    let filled_size = parse_decimal_field(json, &["size_matched", "sizeMatched", "filled_size", "filled"])
        .filter(|s| *s > Decimal::ZERO);

    OrderState {
        order_id: order_id.to_string(),
        status,
        filled_size,
        is_terminal: status.map(|s| s.is_terminal()).unwrap_or(false),
        is_filled: status.map(|s| s.is_filled()).unwrap_or(false),
    }
}

fn error_message(json: &serde_json::Value) -> Option<String> {
    ["errorMsg", "error", "message"]
        .iter()
        .find_map(|key| json.get(*key).and_then(|v| v.as_str()))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Extract an order ID from an API response.
pub fn extract_order_id(result: &serde_json::Value) -> Option<String> {
    for key in ["orderID", "orderId", "order_id", "id"] {
        if let Some(id) = result.get(key).and_then(|v| v.as_str()) {
            if !id.is_empty() {
                return Some(id.to_string());
            }
        }
    }

    for key in ["order", "data", "result"] {
        if let Some(id) = result.get(key).and_then(extract_order_id) {
            return Some(id);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn extract_order_id_various_formats() {
        let json1 = serde_json::json!({"orderID": "abc123"});
        assert_eq!(extract_order_id(&json1), Some("abc123".to_string()));

        let json2 = serde_json::json!({"order": {"id": "ghi789"}});
        assert_eq!(extract_order_id(&json2), Some("ghi789".to_string()));

        let json3 = serde_json::json!({"orderID": "", "error": "something"});
        assert_eq!(extract_order_id(&json3), None);
    }

    #[test]
    fn submit_response_states() {
        let matched = serde_json::json!({
            "success": true,
            "orderID": "0x1",
            "status": "matched",
            "takingAmount": "9.8",
            "makingAmount": "4.9"
        });
        let state = order_state("0x1", &matched);
        assert!(state.is_terminal);
        assert!(state.is_filled);
        assert_eq!(state.filled_size, None);

        let live = serde_json::json!({"orderID": "0x2", "status": "LIVE"});
        assert!(!order_state("0x2", &live).is_terminal);

        let polled = serde_json::json!({"status": "MATCHED", "size_matched": "10"});
        assert_eq!(order_state("0x3", &polled).filled_size, Some(dec!(10)));

        let killed = serde_json::json!({"status": "unmatched"});
        let state = order_state("0x4", &killed);
        assert!(state.is_terminal && !state.is_filled);
    }

    #[test]
    fn error_messages() {
        assert_eq!(
            error_message(&serde_json::json!({"errorMsg": "not enough balance"})),
            Some("not enough balance".to_string())
        );
        assert_eq!(error_message(&serde_json::json!({"errorMsg": ""})), None);
    }
}
