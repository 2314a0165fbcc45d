//! Background WebSocket listeners.
//!
//! - [`market_ws`]: best asks into the shared [`PriceCache`](crate::pricing::PriceCache)
//! - [`user_ws`]: our fills, forwarded to the fill registry
//!
//! Both reconnect with exponential backoff and stop on the shutdown signal.

pub mod market_ws;
pub mod user_ws;

use std::time::Duration;

use tokio::sync::watch;

pub use market_ws::MarketSocket;
pub use user_ws::{parse_fill_events, UserSocket};

/// Reconnection and heartbeat settings.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Initial backoff delay in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum backoff delay in seconds.
    pub max_delay_s: u64,
    /// Backoff multiplier.
    pub backoff_multiplier: f64,
    /// Ping interval in seconds.
    pub heartbeat_interval_s: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            max_delay_s: 30,
            backoff_multiplier: 2.0,
            heartbeat_interval_s: 30,
        }
    }
}

impl ReconnectConfig {
    /// From the configured maximum delay and heartbeat interval.
    pub fn from_config(max_delay_s: u64, heartbeat_interval_s: u64) -> Self {
        Self {
            max_delay_s,
            heartbeat_interval_s,
            ..Default::default()
        }
    }

    /// Delay before reconnect attempt `attempt` (0-based).
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let delay_ms = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        let max_delay_ms = self.max_delay_s * 1000;
        Duration::from_millis(delay_ms.min(max_delay_ms as f64) as u64)
    }

    /// Ping cadence.
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_s.max(1))
    }
}

/// Sleep for the backoff delay. Returns `false` if shutdown fired first.
pub(crate) async fn backoff(
    config: &ReconnectConfig,
    attempt: u32,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    let delay = config.next_delay(attempt);
    metrics::counter!(crate::metrics::WS_RECONNECTS).increment(1);
    tracing::info!(delay_ms = delay.as_millis() as u64, attempt, "Reconnecting after delay");
    tokio::select! {
        _ = tokio::time::sleep(delay) => !*shutdown.borrow(),
        _ = shutdown.changed() => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_clamps() {
        let config = ReconnectConfig::from_config(5, 10);
        assert_eq!(config.next_delay(0), Duration::from_secs(1));
        assert_eq!(config.next_delay(1), Duration::from_secs(2));
        assert_eq!(config.next_delay(2), Duration::from_secs(4));
        assert_eq!(config.next_delay(10), Duration::from_secs(5));
        assert_eq!(config.heartbeat(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn backoff_stops_on_shutdown() {
        let config = ReconnectConfig {
            initial_delay_ms: 60_000,
            ..Default::default()
        };
        let (tx, mut rx) = watch::channel(false);
        let wait = tokio::spawn(async move { backoff(&config, 0, &mut rx).await });
        tx.send(true).unwrap();
        assert!(!wait.await.unwrap());
    }
}
