//! Prometheus metrics.
//!
//! Names are exported as constants so call sites can use the `metrics`
//! macros directly; helpers cover the common cases.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{debug, info};

// === Metric Name Constants ===

/// Ticks evaluated, labelled by regime.
pub const TICKS: &str = "ticks_total";
/// Actions chosen, labelled by kind.
pub const ACTIONS: &str = "actions_total";
/// Orders submitted.
pub const ORDERS_SUBMITTED: &str = "orders_submitted_total";
/// Orders filled.
pub const ORDERS_FILLED: &str = "orders_filled_total";
/// Orders failed or timed out.
pub const ORDERS_FAILED: &str = "orders_failed_total";
/// Order round-trip latency.
pub const ORDER_LATENCY: &str = "order_latency_ms";
/// Merges executed.
pub const MERGES: &str = "merges_total";
/// Collateral recovered by merges, in cents.
pub const COLLATERAL_RECOVERED_CENTS: &str = "collateral_recovered_cents_total";
/// Ledger reconciliations performed.
pub const RECONCILIATIONS: &str = "ledger_reconciliations_total";
/// Ledger writes that failed.
pub const LEDGER_WRITE_FAILURES: &str = "ledger_write_failures_total";
/// Ticks served from the price cache.
pub const PRICE_CACHE_HITS: &str = "price_cache_hits_total";
/// Ticks that fell back to REST prices.
pub const PRICE_CACHE_MISSES: &str = "price_cache_misses_total";
/// WebSocket messages received.
pub const WS_MESSAGES_RECEIVED: &str = "ws_messages_received_total";
/// WebSocket reconnects.
pub const WS_RECONNECTS: &str = "ws_reconnects_total";
/// Fill notifications applied to the ledger.
pub const FILL_EVENTS: &str = "fill_events_total";
/// REST price fetch latency for both legs.
pub const PRICE_FETCH_LATENCY: &str = "price_fetch_latency_ms";

/// Register metric descriptions.
pub fn init_metrics() {
    describe_counter!(TICKS, "Market ticks evaluated");
    describe_counter!(ACTIONS, "Actions chosen by the decision engine");
    describe_counter!(ORDERS_SUBMITTED, "Orders submitted");
    describe_counter!(ORDERS_FILLED, "Orders filled");
    describe_counter!(ORDERS_FAILED, "Orders that failed or timed out");
    describe_histogram!(ORDER_LATENCY, "Order round-trip latency in milliseconds");
    describe_counter!(MERGES, "Merges executed");
    describe_counter!(COLLATERAL_RECOVERED_CENTS, "Collateral recovered by merges, in cents");
    describe_counter!(RECONCILIATIONS, "Ledger reconciliations against trade history");
    describe_counter!(LEDGER_WRITE_FAILURES, "Ledger writes that failed");
    describe_counter!(PRICE_CACHE_HITS, "Ticks priced from the WebSocket cache");
    describe_counter!(PRICE_CACHE_MISSES, "Ticks priced over REST");
    describe_counter!(WS_MESSAGES_RECEIVED, "WebSocket messages received");
    describe_counter!(WS_RECONNECTS, "WebSocket reconnections");
    describe_counter!(FILL_EVENTS, "Fill notifications applied to the ledger");
    describe_histogram!(PRICE_FETCH_LATENCY, "REST price fetch latency in milliseconds");

    debug!("Metrics initialized");
}

/// Install the Prometheus exporter on `0.0.0.0:port`.
pub fn install_exporter(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    init_metrics();
    info!(%addr, "Prometheus exporter listening");
    Ok(())
}

/// Record a tick.
pub fn inc_ticks(regime: &str) {
    counter!(TICKS, "regime" => regime.to_string()).increment(1);
}

/// Record a chosen action.
pub fn inc_actions(kind: &str) {
    counter!(ACTIONS, "kind" => kind.to_string()).increment(1);
}

/// Record order round-trip latency.
pub fn record_order_latency(start: Instant) {
    histogram!(ORDER_LATENCY).record(start.elapsed().as_secs_f64() * 1000.0);
}

/// Record a merge and the collateral it recovered.
pub fn record_merge(recovered: rust_decimal::Decimal) {
    use rust_decimal::prelude::ToPrimitive;

    counter!(MERGES).increment(1);
    let cents = (recovered * rust_decimal::Decimal::ONE_HUNDRED)
        .trunc()
        .to_u64()
        .unwrap_or(0);
    counter!(COLLATERAL_RECOVERED_CENTS).increment(cents);
}

/// RAII timer recording into a histogram on drop.
pub struct LatencyTimer {
    start: Instant,
    metric_name: &'static str,
}

impl LatencyTimer {
    /// Start timing `metric_name`.
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
        }
    }

    /// Elapsed milliseconds so far.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        histogram!(self.metric_name).record(self.elapsed_ms());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn latency_timer_measures_time() {
        let timer = LatencyTimer::new("test_metric");
        sleep(Duration::from_millis(10));
        assert!(timer.elapsed_ms() >= 9.0);
    }

    #[test]
    fn recording_without_recorder_is_a_noop() {
        inc_ticks("GREY");
        inc_actions("WAIT");
        record_merge(rust_decimal_macros::dec!(4.99));
        record_order_latency(Instant::now());
    }
}
