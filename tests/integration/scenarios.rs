//! End-to-end ticks: prices -> engine -> coordinator -> ledger.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use time::OffsetDateTime;

use updown_bot::engine::{Action, DecisionEngine, EngineConfig};
use updown_bot::execution::{Execution, ExecutionCoordinator, Side, TradeRecord};
use updown_bot::ledger::{Ledger, ReconcileOutcome};
use updown_bot::market::mock::{
    MockMarketFeed, MockOrderPlacer, MockPriceFeed, MockSettlement, MockTradeHistory,
};
use updown_bot::market::{Leg, Market};
use updown_bot::pricing::Regime;
use updown_bot::runner::{Bot, BotStatus};

struct World {
    _dir: tempfile::TempDir,
    ledger: Arc<Ledger>,
    engine: Arc<DecisionEngine>,
    placer: Arc<MockOrderPlacer>,
    settlement: Arc<MockSettlement>,
    history: Arc<MockTradeHistory>,
    prices: Arc<MockPriceFeed>,
    bot: Bot,
}

fn market(minutes_to_close: i64) -> Market {
    Market {
        condition_id: "0xmarket".to_string(),
        slug: "bitcoin-up-or-down-test".to_string(),
        up_token_id: "tok-up".to_string(),
        down_token_id: "tok-down".to_string(),
        close_time: OffsetDateTime::now_utc() + time::Duration::minutes(minutes_to_close),
        question: Some("Bitcoin Up or Down?".to_string()),
    }
}

fn world(up: Decimal, down: Decimal, settlement: MockSettlement, trades: Vec<TradeRecord>) -> World {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(Ledger::open(dir.path().join("inventory_state.json")));
    let engine = Arc::new(DecisionEngine::new(EngineConfig::default()));
    let placer = Arc::new(MockOrderPlacer::new());
    let settlement = Arc::new(settlement);
    let history = Arc::new(MockTradeHistory::new(trades));
    let prices = Arc::new(MockPriceFeed::new(up, down));

    let coordinator = Arc::new(ExecutionCoordinator::new(
        ledger.clone(),
        placer.clone(),
        settlement.clone(),
        history.clone(),
    ));
    let bot = Bot::new(
        engine.clone(),
        coordinator,
        prices.clone(),
        Arc::new(MockMarketFeed::new(vec![market(60)])),
        Arc::new(BotStatus::new()),
    );

    World {
        _dir: dir,
        ledger,
        engine,
        placer,
        settlement,
        history,
        prices,
        bot,
    }
}

fn buy(leg: Leg, size: Decimal) -> TradeRecord {
    TradeRecord {
        market_id: "0xmarket".to_string(),
        asset_id: match leg {
            Leg::Up => "tok-up".to_string(),
            Leg::Down => "tok-down".to_string(),
        },
        leg,
        side: Side::Buy,
        size,
        price: dec!(0.5),
        status: "CONFIRMED".to_string(),
    }
}

#[tokio::test]
async fn arbitrage_buys_both_legs_and_books_them() {
    let w = world(dec!(0.50), dec!(0.45), MockSettlement::ready(dec!(0)), Vec::new());
    let order_usdc = w.engine.config().arb_order_usdc;

    let (decision, execution) = w.bot.tick_market(&market(60)).await;

    assert_eq!(decision.regime, Regime::Arbitrage);
    assert_eq!(
        decision.action.clone(),
        Action::BuyBoth {
            up_usdc: order_usdc,
            down_usdc: order_usdc,
            reason: decision.action.reason().to_string(),
        }
    );
    assert!(matches!(&execution, Execution::Orders(r) if r.iter().all(|o| o.success)));

    let entry = w.ledger.snapshot("0xmarket").unwrap();
    assert_eq!(entry.up_balance, order_usdc / dec!(0.50));
    assert_eq!(entry.down_balance, order_usdc / dec!(0.45));
    assert_eq!(entry.total_invested, order_usdc * dec!(2));
    assert_eq!(w.placer.buys().len(), 2);
}

#[tokio::test]
async fn resolved_market_merges_pairs() {
    let w = world(dec!(0.995), dec!(0.01), MockSettlement::ready(dec!(5)), Vec::new());
    w.ledger
        .record_buy("0xmarket", "tok-up", "tok-down", Leg::Up, dec!(5), dec!(2.5));
    w.ledger
        .record_buy("0xmarket", "tok-up", "tok-down", Leg::Down, dec!(5), dec!(2.5));

    let (decision, execution) = w.bot.tick_market(&market(60)).await;

    assert_eq!(decision.regime, Regime::Resolved);
    assert!(matches!(decision.action, Action::Merge { .. }));
    assert_eq!(execution, Execution::Merged(dec!(5)));

    let entry = w.ledger.snapshot("0xmarket").unwrap();
    assert_eq!(entry.up_balance, dec!(0));
    assert_eq!(entry.down_balance, dec!(0));
    assert_eq!(entry.total_redeemed, dec!(5));
    assert_eq!(w.settlement.merges(), vec![("0xmarket".to_string(), dec!(5))]);
}

#[tokio::test]
async fn merge_is_capped_by_on_chain_balance() {
    let w = world(dec!(0.995), dec!(0.01), MockSettlement::ready(dec!(2)), Vec::new());
    w.ledger
        .record_buy("0xmarket", "tok-up", "tok-down", Leg::Up, dec!(5), dec!(2.5));
    w.ledger
        .record_buy("0xmarket", "tok-up", "tok-down", Leg::Down, dec!(5), dec!(2.5));

    let (_, execution) = w.bot.tick_market(&market(60)).await;

    assert_eq!(execution, Execution::Merged(dec!(2)));
    assert_eq!(w.ledger.redeemable_pairs("0xmarket"), dec!(3));
}

#[tokio::test]
async fn merge_reconciles_against_history_first() {
    let w = world(
        dec!(0.995),
        dec!(0.01),
        MockSettlement::ready(dec!(100)),
        vec![buy(Leg::Up, dec!(4)), buy(Leg::Down, dec!(3))],
    );
    // Local estimate disagrees with what actually filled.
    w.ledger
        .record_buy("0xmarket", "tok-up", "tok-down", Leg::Up, dec!(10), dec!(5));
    w.ledger
        .record_buy("0xmarket", "tok-up", "tok-down", Leg::Down, dec!(10), dec!(5));

    let (_, execution) = w.bot.tick_market(&market(60)).await;

    assert_eq!(execution, Execution::Merged(dec!(3)));
    assert_eq!(w.history.calls(), 1);
    let entry = w.ledger.snapshot("0xmarket").unwrap();
    assert_eq!(entry.up_balance, dec!(1));
    assert_eq!(entry.down_balance, dec!(0));
}

#[tokio::test]
async fn unavailable_settlement_leaves_ledger_alone() {
    let w = world(dec!(0.995), dec!(0.01), MockSettlement::unavailable(), Vec::new());
    w.ledger
        .record_buy("0xmarket", "tok-up", "tok-down", Leg::Up, dec!(5), dec!(2.5));
    w.ledger
        .record_buy("0xmarket", "tok-up", "tok-down", Leg::Down, dec!(5), dec!(2.5));

    let (_, execution) = w.bot.tick_market(&market(60)).await;

    assert_eq!(execution, Execution::Merged(dec!(0)));
    assert_eq!(w.ledger.redeemable_pairs("0xmarket"), dec!(5));
}

#[tokio::test]
async fn momentum_waits_out_cooldown() {
    let w = world(dec!(0.88), dec!(0.11), MockSettlement::ready(dec!(0)), Vec::new());
    let cfg = w.engine.config().clone();

    let (first, _) = w.bot.tick_market(&market(60)).await;
    assert_eq!(first.regime, Regime::MomentumUp);
    assert!(matches!(
        first.action,
        Action::BuyMomentum { main_leg: Leg::Up, hedge_leg: Leg::Down, .. }
    ));

    let (second, execution) = w.bot.tick_market(&market(60)).await;
    assert!(matches!(second.action, Action::Wait { cooldown_remaining: Some(_), .. }));
    assert_eq!(execution, Execution::Idle);
    assert_eq!(w.placer.buys().len(), 2);

    let spent = w.engine.strategies("0xmarket").unwrap().momentum.spent;
    assert_eq!(spent, cfg.momentum_main_usdc + cfg.momentum_hedge_usdc);
}

#[tokio::test]
async fn arbitrage_stops_at_spend_cap() {
    let w = world(dec!(0.50), dec!(0.45), MockSettlement::ready(dec!(0)), Vec::new());
    let cfg = w.engine.config().clone();
    let fills_to_cap = (cfg.arb_max_usdc / (cfg.arb_order_usdc * dec!(2)))
        .ceil()
        .to_u32()
        .unwrap_or(1);

    let mut now = std::time::Instant::now();
    for _ in 0..fills_to_cap {
        let entry = w.ledger.snapshot("0xmarket");
        let decision = w.engine.decide_at(
            "0xmarket",
            &updown_bot::pricing::Prices::new(dec!(0.50), dec!(0.45)),
            entry.as_ref(),
            60.0,
            now,
        );
        assert!(matches!(decision.action, Action::BuyBoth { .. }));
        now += cfg.arb_cooldown + Duration::from_millis(1);
    }

    let decision = w.engine.decide_at(
        "0xmarket",
        &updown_bot::pricing::Prices::new(dec!(0.50), dec!(0.45)),
        None,
        60.0,
        now,
    );
    assert!(matches!(decision.action, Action::Skip { .. }));
}

#[tokio::test]
async fn reconcile_twice_rebuilds_once() {
    let w = world(
        dec!(0.5),
        dec!(0.5),
        MockSettlement::ready(dec!(0)),
        vec![buy(Leg::Up, dec!(4)), buy(Leg::Down, dec!(2))],
    );

    let first = w.ledger.reconcile(w.history.as_ref(), false).await.unwrap();
    assert_eq!(first.markets_updated(), 1);
    let after_first = w.ledger.snapshot("0xmarket");

    w.history.set_trades(vec![buy(Leg::Up, dec!(40))]);
    let second = w.ledger.reconcile(w.history.as_ref(), false).await.unwrap();

    assert_eq!(second, ReconcileOutcome::RateLimited);
    assert_eq!(w.ledger.snapshot("0xmarket"), after_first);
    assert_eq!(w.history.calls(), 1);
}

#[tokio::test]
async fn ledger_survives_restart() {
    let w = world(dec!(0.50), dec!(0.45), MockSettlement::ready(dec!(0)), Vec::new());
    w.bot.tick_market(&market(60)).await;
    let before = w.ledger.snapshot("0xmarket").unwrap();

    let reopened = Ledger::open(w.ledger.path());
    assert_eq!(reopened.snapshot("0xmarket"), Some(before));
}

#[tokio::test]
async fn bot_refresh_and_tick_with_moving_prices() {
    let w = world(dec!(0.50), dec!(0.49), MockSettlement::ready(dec!(0)), Vec::new());
    assert_eq!(w.bot.refresh_markets().await, 1);

    w.bot.tick().await;
    assert!(w.placer.buys().is_empty());

    w.prices.set(dec!(0.48), dec!(0.47));
    w.bot.tick().await;
    assert_eq!(w.placer.buys().len(), 2);
}
