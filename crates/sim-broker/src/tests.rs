use chrono::{DateTime, TimeZone, Utc};

use replay_core::{SlippageConfig, SlippageModel};
use sim_clock::{SharedClock, SimClock};

use crate::broker::SimulatedBroker;
use crate::order::{OrderSide, OrderStatus, OrderType};

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 9, 30, 0).unwrap()
}

fn clock() -> SharedClock {
    SimClock::new(base(), None, 0.0).unwrap().shared()
}

fn no_slippage() -> SlippageConfig {
    SlippageConfig {
        model: SlippageModel::None,
        ..SlippageConfig::default()
    }
}

/// Helper: broker with $10k, zero slippage, no binding volume cap, and a
/// seeded AAPL quote at $150.
fn broker_at_150() -> SimulatedBroker {
    let mut broker = SimulatedBroker::new(clock(), 10_000.0, no_slippage(), 0.05);
    broker.update_price("AAPL", 150.0, 1_000_000);
    broker
}

#[test]
fn market_buy_fills_and_debits_cash() {
    let mut broker = broker_at_150();
    let order = broker.submit_order("AAPL", OrderSide::Buy, 10, OrderType::Market, None);

    assert_eq!(order.status, OrderStatus::Filled);
    assert_eq!(order.filled_quantity, 10);
    assert_eq!(order.filled_price, Some(150.0));
    assert!(order.filled_at.is_some());

    assert!((broker.cash() - 8_500.0).abs() < 1e-9);
    let position = &broker.positions()["AAPL"];
    assert_eq!(position.quantity, 10);
    assert!((position.avg_cost - 150.0).abs() < 1e-9);
}

#[test]
fn round_trip_realizes_pnl() {
    let mut broker = broker_at_150();
    broker.submit_order("AAPL", OrderSide::Buy, 10, OrderType::Market, None);

    broker.update_price("AAPL", 160.0, 10_000);
    let sell = broker.submit_order("AAPL", OrderSide::Sell, 10, OrderType::Market, None);

    assert_eq!(sell.status, OrderStatus::Filled);
    assert!((broker.cash() - 10_100.0).abs() < 1e-9);
    assert!(broker.positions().is_empty(), "position removed at zero");

    let stats = broker.get_portfolio_stats();
    assert!((stats.realized_pnl - 100.0).abs() < 1e-9);
    assert_eq!(stats.winning_trades, 1);
    assert_eq!(stats.losing_trades, 0);
    assert_eq!(stats.win_rate, 100.0);
}

#[test]
fn buy_beyond_cash_is_rejected_without_side_effects() {
    let mut broker = broker_at_150();
    let order = broker.submit_order("AAPL", OrderSide::Buy, 100, OrderType::Market, None);

    assert_eq!(order.status, OrderStatus::Rejected);
    let reason = order.rejection_reason.unwrap();
    assert!(reason.contains("Insufficient funds"), "got: {reason}");

    assert_eq!(broker.cash(), 10_000.0);
    assert!(broker.positions().is_empty());
}

#[test]
fn sell_without_shares_is_rejected() {
    let mut broker = broker_at_150();
    let order = broker.submit_order("AAPL", OrderSide::Sell, 5, OrderType::Market, None);

    assert_eq!(order.status, OrderStatus::Rejected);
    assert!(order
        .rejection_reason
        .unwrap()
        .contains("Insufficient shares"));
}

#[test]
fn unknown_ticker_is_rejected() {
    let mut broker = broker_at_150();
    let order = broker.submit_order("GHOST", OrderSide::Buy, 1, OrderType::Market, None);

    assert_eq!(order.status, OrderStatus::Rejected);
    assert!(order.rejection_reason.unwrap().contains("No price data"));
}

#[test]
fn oversized_order_hits_volume_cap() {
    let mut broker = SimulatedBroker::new(clock(), 1_000_000.0, no_slippage(), 0.05);
    broker.update_price("PENNY", 2.0, 0);
    broker.seed_daily_volume("PENNY", 10_000);

    // 5% of 10,000 = 500 shares max
    let order = broker.submit_order("PENNY", OrderSide::Buy, 501, OrderType::Market, None);
    assert_eq!(order.status, OrderStatus::Rejected);
    assert!(order.rejection_reason.unwrap().contains("daily volume"));

    let order = broker.submit_order("PENNY", OrderSide::Buy, 500, OrderType::Market, None);
    assert_eq!(order.status, OrderStatus::Filled);
}

#[test]
fn fixed_slippage_is_directional() {
    let mut broker = SimulatedBroker::new(
        clock(),
        100_000.0,
        SlippageConfig {
            model: SlippageModel::Fixed,
            slippage_pct: 0.01,
            ..SlippageConfig::default()
        },
        1.0,
    );
    broker.update_price("AAPL", 100.0, 1_000_000);

    let buy = broker.submit_order("AAPL", OrderSide::Buy, 10, OrderType::Market, None);
    assert!((buy.filled_price.unwrap() - 101.0).abs() < 1e-9, "buys fill above market");

    let sell = broker.submit_order("AAPL", OrderSide::Sell, 10, OrderType::Market, None);
    assert!((sell.filled_price.unwrap() - 99.0).abs() < 1e-9, "sells fill below market");
}

#[test]
fn limit_buy_waits_for_price_to_cross() {
    let mut broker = broker_at_150();
    let order = broker.submit_order("AAPL", OrderSide::Buy, 10, OrderType::Limit, Some(145.0));
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(broker.open_orders().len(), 1);
    assert_eq!(broker.cash(), 10_000.0, "no cash moves while pending");

    // Price above the limit: still pending
    broker.update_price("AAPL", 148.0, 1_000);
    assert_eq!(
        broker.get_order(&order.id).unwrap().status,
        OrderStatus::Pending
    );

    // Price touches the limit: fills for the entire quantity
    broker.update_price("AAPL", 144.0, 1_000);
    let filled = broker.get_order(&order.id).unwrap();
    assert_eq!(filled.status, OrderStatus::Filled);
    assert_eq!(filled.filled_quantity, 10);
    assert_eq!(filled.filled_price, Some(144.0));
    assert!(broker.open_orders().is_empty());
}

#[test]
fn limit_sell_fills_at_or_above_limit() {
    let mut broker = broker_at_150();
    broker.submit_order("AAPL", OrderSide::Buy, 10, OrderType::Market, None);

    let order = broker.submit_order("AAPL", OrderSide::Sell, 10, OrderType::Limit, Some(155.0));
    assert_eq!(order.status, OrderStatus::Pending);

    broker.update_price("AAPL", 156.0, 1_000);
    let filled = broker.get_order(&order.id).unwrap();
    assert_eq!(filled.status, OrderStatus::Filled);
    assert!(broker.positions().is_empty());
}

#[test]
fn limit_order_without_price_is_rejected() {
    let mut broker = broker_at_150();
    let order = broker.submit_order("AAPL", OrderSide::Buy, 10, OrderType::Limit, None);
    assert_eq!(order.status, OrderStatus::Rejected);
}

#[test]
fn cancel_pending_limit_order() {
    let mut broker = broker_at_150();
    let order = broker.submit_order("AAPL", OrderSide::Buy, 10, OrderType::Limit, Some(140.0));

    let cancelled = broker.cancel_order(&order.id).unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert!(broker.open_orders().is_empty());

    // Price crossing the limit later must not resurrect it
    broker.update_price("AAPL", 139.0, 1_000);
    assert_eq!(
        broker.get_order(&order.id).unwrap().status,
        OrderStatus::Cancelled
    );
}

#[test]
fn cancel_is_a_no_op_on_terminal_orders() {
    let mut broker = broker_at_150();
    let order = broker.submit_order("AAPL", OrderSide::Buy, 10, OrderType::Market, None);
    let after = broker.cancel_order(&order.id).unwrap();
    assert_eq!(after.status, OrderStatus::Filled);
}

#[test]
fn zero_quantity_is_rejected() {
    let mut broker = broker_at_150();
    let order = broker.submit_order("AAPL", OrderSide::Buy, 0, OrderType::Market, None);
    assert_eq!(order.status, OrderStatus::Rejected);
}

#[test]
fn weighted_average_cost_across_multiple_buys() {
    let mut broker = SimulatedBroker::new(clock(), 100_000.0, no_slippage(), 1.0);
    broker.update_price("AAPL", 100.0, 1_000_000);
    broker.submit_order("AAPL", OrderSide::Buy, 10, OrderType::Market, None);

    broker.update_price("AAPL", 120.0, 1_000);
    broker.submit_order("AAPL", OrderSide::Buy, 10, OrderType::Market, None);

    let position = &broker.positions()["AAPL"];
    assert_eq!(position.quantity, 20);
    assert!((position.avg_cost - 110.0).abs() < 1e-9);
}

#[test]
fn drawdown_tracks_peak_to_trough() {
    let mut broker = SimulatedBroker::new(clock(), 10_000.0, no_slippage(), 1.0);
    broker.update_price("AAPL", 100.0, 1_000_000);
    broker.submit_order("AAPL", OrderSide::Buy, 100, OrderType::Market, None);

    // Run up to $120 (portfolio 12k), then down to $90 (portfolio 9k):
    // drawdown = 3000 / 12000 = 25%
    broker.update_price("AAPL", 120.0, 1_000);
    broker.update_price("AAPL", 90.0, 1_000);

    let stats = broker.get_portfolio_stats();
    assert!((stats.max_drawdown_pct - 25.0).abs() < 1e-9);
    assert!((stats.positions_value - 9_000.0).abs() < 1e-9);
    assert!((stats.total_return + 1_000.0).abs() < 1e-9);
}

#[test]
fn stats_reflect_partial_day() {
    let mut broker = broker_at_150();
    broker.submit_order("AAPL", OrderSide::Buy, 10, OrderType::Market, None);
    broker.update_price("AAPL", 140.0, 1_000);
    broker.submit_order("AAPL", OrderSide::Sell, 10, OrderType::Market, None);

    let stats = broker.get_portfolio_stats();
    assert!((stats.realized_pnl + 100.0).abs() < 1e-9);
    assert_eq!(stats.losing_trades, 1);
    assert_eq!(stats.win_rate, 0.0);
    assert_eq!(stats.total_trades, 2);
    assert!((stats.total_value - 9_900.0).abs() < 1e-9);
}
