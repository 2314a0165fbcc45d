//! Fill notifications applied to the ledger outside the tick loop.
//!
//! The coordinator records a buy as soon as the placer returns, often with
//! an estimated token amount. The user channel later reports the real
//! fills. The registry remembers what was recorded per order and applies
//! only the surplus, so a fill is never counted twice.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::ledger::Ledger;
use crate::market::{Leg, Market};

/// How long a registered order keeps accepting fill events.
pub const ORDER_TTL: Duration = Duration::from_secs(3600);

/// How long a fill for an unknown order waits for its registration.
pub const EARLY_FILL_TTL: Duration = Duration::from_secs(300);

/// A fill reported by the exchange for one of our orders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillEvent {
    /// Exchange order ID.
    pub order_id: String,
    /// Leg filled, when the event says.
    pub leg: Option<Leg>,
    /// Tokens filled by this event.
    pub size: Decimal,
    /// Fill price.
    pub price: Decimal,
}

#[derive(Debug, Clone)]
struct TrackedOrder {
    market_id: String,
    up_token_id: String,
    down_token_id: String,
    leg: Leg,
    /// Tokens already in the ledger for this order.
    recorded: Decimal,
    /// Tokens reported filled so far.
    filled: Decimal,
    registered_at: Instant,
}

#[derive(Debug, Clone, Copy)]
struct EarlyFill {
    size: Decimal,
    first_seen: Instant,
}

#[derive(Debug, Default)]
struct Registry {
    orders: HashMap<String, TrackedOrder>,
    /// Fills that arrived before the order was registered. Fills for
    /// orders placed outside the bot stay here until they expire.
    early: HashMap<String, EarlyFill>,
}

impl Registry {
    fn sweep(&mut self, now: Instant) {
        let (orders, early) = (self.orders.len(), self.early.len());
        self.orders
            .retain(|_, o| now.saturating_duration_since(o.registered_at) < ORDER_TTL);
        self.early
            .retain(|_, f| now.saturating_duration_since(f.first_seen) < EARLY_FILL_TTL);
        let evicted = (orders - self.orders.len()) + (early - self.early.len());
        if evicted > 0 {
            debug!(evicted, "expired fill registry entries");
        }
    }
}

/// Maps our order IDs to markets and reconciles fill events with the ledger.
#[derive(Debug)]
pub struct FillRegistry {
    ledger: Arc<Ledger>,
    inner: Mutex<Registry>,
}

impl FillRegistry {
    /// Registry writing into `ledger`.
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self {
            ledger,
            inner: Mutex::new(Registry::default()),
        }
    }

    /// Track an order whose buy was recorded with `recorded_tokens`.
    pub fn register(&self, order_id: &str, market: &Market, leg: Leg, recorded_tokens: Decimal) {
        self.register_at(order_id, market, leg, recorded_tokens, Instant::now());
    }

    /// [`register`](Self::register) as of `now`.
    pub fn register_at(
        &self,
        order_id: &str,
        market: &Market,
        leg: Leg,
        recorded_tokens: Decimal,
        now: Instant,
    ) {
        let surplus = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.sweep(now);
            let filled = inner
                .early
                .remove(order_id)
                .map_or(Decimal::ZERO, |f| f.size);
            let order = TrackedOrder {
                market_id: market.condition_id.clone(),
                up_token_id: market.up_token_id.clone(),
                down_token_id: market.down_token_id.clone(),
                leg,
                recorded: recorded_tokens.max(filled),
                filled,
                registered_at: now,
            };
            let surplus = (filled - recorded_tokens).max(Decimal::ZERO);
            inner.orders.insert(order_id.to_string(), order.clone());
            (surplus > Decimal::ZERO).then_some((order, surplus))
        };

        if let Some((order, surplus)) = surplus {
            self.apply(&order, surplus);
        }
    }

    /// Apply a fill event. Returns the tokens added to the ledger.
    pub fn on_fill(&self, event: &FillEvent) -> Decimal {
        self.on_fill_at(event, Instant::now())
    }

    /// [`on_fill`](Self::on_fill) as of `now`.
    pub fn on_fill_at(&self, event: &FillEvent, now: Instant) -> Decimal {
        if event.size <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        let pending = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.sweep(now);
            match inner.orders.get_mut(&event.order_id) {
                Some(order) => {
                    order.filled += event.size;
                    let surplus = (order.filled - order.recorded).max(Decimal::ZERO);
                    order.recorded += surplus;
                    (surplus > Decimal::ZERO).then(|| (order.clone(), surplus))
                }
                None => {
                    inner
                        .early
                        .entry(event.order_id.clone())
                        .or_insert(EarlyFill {
                            size: Decimal::ZERO,
                            first_seen: now,
                        })
                        .size += event.size;
                    debug!(order_id = %event.order_id, size = %event.size, "fill for unregistered order held");
                    None
                }
            }
        };

        match pending {
            Some((order, surplus)) => {
                self.apply(&order, surplus);
                surplus
            }
            None => Decimal::ZERO,
        }
    }

    fn apply(&self, order: &TrackedOrder, tokens: Decimal) {
        info!(
            market = %crate::utils::short_id(&order.market_id),
            leg = %order.leg,
            tokens = %tokens,
            "fill surplus applied"
        );
        metrics::counter!(crate::metrics::FILL_EVENTS).increment(1);
        // Collateral was counted when the order was recorded.
        self.ledger.record_buy(
            &order.market_id,
            &order.up_token_id,
            &order.down_token_id,
            order.leg,
            tokens,
            Decimal::ZERO,
        );
    }

    /// Number of tracked orders.
    pub fn tracked(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .orders
            .len()
    }

    /// Number of held fills for unregistered orders.
    pub fn held(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .early
            .len()
    }

    /// Drain `events` until the sender side closes.
    pub async fn consume(self: Arc<Self>, mut events: mpsc::Receiver<FillEvent>) {
        while let Some(event) = events.recv().await {
            self.on_fill(&event);
        }
        debug!("fill channel closed");
    }
}
