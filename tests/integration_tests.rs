//! Integration tests for the forecast-trader engine
//!
//! These exercise the full path from forecast to signal to persisted
//! position transitions against a real on-disk SQLite store.

use std::sync::Arc;

use approx::assert_relative_eq;
use chrono::Utc;
use tempfile::TempDir;

use forecast_trader::config::EngineConfig;
use forecast_trader::engine::PositionManager;
use forecast_trader::store::PositionStore;
use forecast_trader::{
    CloseReason, MarketPrice, PositionStatus, Prediction, Side, SignalAction, Symbol,
};

// =============================================================================
// Test Utilities
// =============================================================================

fn test_engine(configure: impl FnOnce(&mut EngineConfig)) -> (PositionManager, TempDir) {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("engine.db");
    let json_path = dir.path().join("engine.json");
    let store = Arc::new(PositionStore::new(db_path, json_path, false).unwrap());

    let mut config = EngineConfig::default();
    configure(&mut config);

    (PositionManager::new(config, store), dir)
}

fn prediction(symbol: &str, confidence: f64, ret: f64, predicted_price: f64) -> Prediction {
    Prediction {
        symbol: Symbol::new(symbol),
        predicted_price,
        predicted_return: ret,
        confidence_score: confidence,
        horizon_hours: 24.0,
        timestamp: Utc::now(),
    }
}

fn market_price(symbol: &str, price: f64) -> MarketPrice {
    MarketPrice::new(Symbol::new(symbol), price, Utc::now()).unwrap()
}

/// Seed the engine with a forecast and price, then open via the
/// normal signal path. Panics if no position opens.
fn open_position(
    engine: &PositionManager,
    symbol: &str,
    pred: Prediction,
    price: f64,
) -> forecast_trader::Position {
    engine.update_prediction(pred).unwrap();
    engine.update_market_price(market_price(symbol, price)).unwrap();
    let signal = engine
        .generate_signal(&Symbol::new(symbol), Some(price))
        .unwrap();
    engine
        .execute_signal(&signal)
        .unwrap()
        .expect("signal should open a position")
}

// =============================================================================
// Signal Scenarios
// =============================================================================

#[test]
fn test_buy_signal_from_confident_divergent_forecast() {
    let (engine, _dir) = test_engine(|_| {});
    engine
        .update_prediction(prediction("BTCUSDT", 0.65, 0.02, 103.0))
        .unwrap();

    let signal = engine
        .generate_signal(&Symbol::new("BTCUSDT"), Some(100.0))
        .unwrap();

    // diff 3% >= 1.2%, conf >= 0.6, ret > 1.2%
    assert_eq!(signal.action, SignalAction::Buy);
    assert_relative_eq!(signal.price_difference_pct, 0.03);
}

#[test]
fn test_hold_when_confidence_below_gate() {
    let (engine, _dir) = test_engine(|_| {});
    engine
        .update_prediction(prediction("BTCUSDT", 0.55, 0.02, 103.0))
        .unwrap();

    let signal = engine
        .generate_signal(&Symbol::new("BTCUSDT"), Some(100.0))
        .unwrap();

    assert_eq!(signal.action, SignalAction::Hold);
}

#[test]
fn test_no_prediction_degrades_to_neutral_hold() {
    let (engine, _dir) = test_engine(|_| {});
    let signal = engine
        .generate_signal(&Symbol::new("BTCUSDT"), Some(100.0))
        .unwrap();
    assert_eq!(signal.action, SignalAction::Hold);
    assert_eq!(signal.confidence, 0.0);
}

// =============================================================================
// Position Lifecycle
// =============================================================================

#[test]
fn test_open_and_close_pnl_accounting() {
    // Sized so the position is exactly 10 units: 10_000 * 0.1 / 100
    let (engine, _dir) = test_engine(|c| {
        c.trading.initial_balance = 10_000.0;
        c.trading.max_position_fraction = 0.10;
        c.trading.fee_bps = 8.0;
    });

    let pos = open_position(&engine, "BTCUSDT", prediction("BTCUSDT", 0.65, 0.02, 103.0), 100.0);
    assert_eq!(pos.side, Side::Long);
    assert_relative_eq!(pos.quantity, 10.0);
    assert_relative_eq!(pos.fees, 0.8); // 1000 notional * 8 bps

    let closed = engine
        .close_position(pos.id, 110.0, CloseReason::Manual.as_str())
        .unwrap()
        .unwrap();

    // gross = (110 - 100) * 10; exit fee = 1100 * 8 bps = 0.88
    assert_relative_eq!(closed.gross_pnl.unwrap(), 100.0);
    assert_relative_eq!(closed.fees, 1.68);
    assert_relative_eq!(closed.net_pnl.unwrap(), 98.32);
    assert_eq!(closed.status, PositionStatus::Closed);
    assert!(closed.closed_at.is_some());
}

#[test]
fn test_net_pnl_equals_gross_minus_fees_for_every_closed_trade() {
    let (engine, _dir) = test_engine(|_| {});

    let pos = open_position(&engine, "BTCUSDT", prediction("BTCUSDT", 0.7, 0.02, 103.0), 100.0);
    engine.close_position(pos.id, 104.0, "manual").unwrap();

    let pos = open_position(&engine, "BTCUSDT", prediction("BTCUSDT", 0.7, 0.02, 103.0), 100.0);
    engine.close_position(pos.id, 92.0, "manual").unwrap();

    for trade in engine.get_recent_trades(10, None).unwrap() {
        let gross = trade.gross_pnl.unwrap();
        let net = trade.net_pnl.unwrap();
        assert_relative_eq!(net, gross - trade.fees, epsilon = 1e-9);
    }
}

#[test]
fn test_close_is_idempotent() {
    let (engine, _dir) = test_engine(|_| {});
    let pos = open_position(&engine, "BTCUSDT", prediction("BTCUSDT", 0.7, 0.02, 103.0), 100.0);

    let first = engine
        .close_position(pos.id, 110.0, "manual")
        .unwrap()
        .unwrap();

    // Second close with a different price is absorbed; the terminal
    // state from the first call stands.
    let second = engine
        .close_position(pos.id, 150.0, "manual")
        .unwrap()
        .unwrap();

    assert_eq!(second.exit_price, first.exit_price);
    assert_eq!(second.net_pnl, first.net_pnl);
    assert_eq!(second.closed_at, first.closed_at);
}

#[test]
fn test_backup_failure_does_not_unwind_committed_transition() {
    // Auto-backup writes into a directory that does not exist, so the
    // JSON export fails on every commit. Transitions must still
    // succeed and report the committed state.
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("engine.db");
    let json_path = dir.path().join("missing").join("engine.json");
    let store = Arc::new(PositionStore::new(db_path, json_path, true).unwrap());
    let engine = PositionManager::new(EngineConfig::default(), store);

    engine
        .update_prediction(prediction("BTCUSDT", 0.65, 0.02, 103.0))
        .unwrap();
    let signal = engine
        .generate_signal(&Symbol::new("BTCUSDT"), Some(100.0))
        .unwrap();

    let opened = engine
        .execute_signal(&signal)
        .unwrap()
        .expect("open must succeed despite failing backup");
    assert_eq!(
        engine
            .get_active_positions(Some(&Symbol::new("BTCUSDT")))
            .unwrap()
            .len(),
        1
    );

    let closed = engine
        .close_position(opened.id, 110.0, "manual")
        .unwrap()
        .expect("close must succeed despite failing backup");
    assert_eq!(closed.status, PositionStatus::Closed);
}

#[test]
fn test_second_open_in_same_direction_is_rejected() {
    let (engine, _dir) = test_engine(|_| {});
    engine
        .update_prediction(prediction("BTCUSDT", 0.65, 0.02, 103.0))
        .unwrap();
    let signal = engine
        .generate_signal(&Symbol::new("BTCUSDT"), Some(100.0))
        .unwrap();

    let first = engine.execute_signal(&signal).unwrap();
    assert!(first.is_some());

    // Overlapping trigger replays the same signal
    let second = engine.execute_signal(&signal).unwrap();
    assert!(second.is_none());

    let open = engine
        .get_active_positions(Some(&Symbol::new("BTCUSDT")))
        .unwrap();
    assert_eq!(open.len(), 1);
}

#[test]
fn test_signal_reversal_closes_then_reopens() {
    let (engine, _dir) = test_engine(|_| {});
    let long = open_position(&engine, "BTCUSDT", prediction("BTCUSDT", 0.7, 0.02, 103.0), 100.0);

    // Opposing forecast arrives
    engine
        .update_prediction(prediction("BTCUSDT", 0.7, -0.03, 97.0))
        .unwrap();
    let signal = engine
        .generate_signal(&Symbol::new("BTCUSDT"), Some(100.0))
        .unwrap();
    assert_eq!(signal.action, SignalAction::Sell);

    let short = engine.execute_signal(&signal).unwrap().unwrap();
    assert_eq!(short.side, Side::Short);

    // The long is closed with reason signal_change before the short opened
    let old = engine.close_position(long.id, 100.0, "manual").unwrap().unwrap();
    assert_eq!(old.status, PositionStatus::Closed);
    assert_eq!(old.exit_reason.as_deref(), Some("signal_change"));

    // Never more than one open position per symbol
    let open = engine
        .get_active_positions(Some(&Symbol::new("BTCUSDT")))
        .unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, short.id);
}

// =============================================================================
// Exit Monitoring
// =============================================================================

#[test]
fn test_take_profit_exit() {
    let (engine, _dir) = test_engine(|_| {});
    // Default take-profit is 15% above entry: 115
    let pos = open_position(&engine, "BTCUSDT", prediction("BTCUSDT", 0.7, 0.02, 103.0), 100.0);
    assert_relative_eq!(pos.take_profit.unwrap(), 115.0);

    let closed = engine
        .check_exits_and_close(&market_price("BTCUSDT", 116.0))
        .unwrap();

    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].exit_reason.as_deref(), Some("take_profit"));
    assert!(engine
        .get_active_positions(Some(&Symbol::new("BTCUSDT")))
        .unwrap()
        .is_empty());
}

#[test]
fn test_stop_loss_exit() {
    let (engine, _dir) = test_engine(|_| {});
    // Default stop is 5% below entry: 95
    open_position(&engine, "BTCUSDT", prediction("BTCUSDT", 0.7, 0.02, 103.0), 100.0);

    let closed = engine
        .check_exits_and_close(&market_price("BTCUSDT", 94.0))
        .unwrap();

    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].exit_reason.as_deref(), Some("stop_loss"));
}

#[test]
fn test_exit_sweep_leaves_unbreached_positions_open() {
    let (engine, _dir) = test_engine(|_| {});
    open_position(&engine, "BTCUSDT", prediction("BTCUSDT", 0.7, 0.02, 103.0), 100.0);

    let closed = engine
        .check_exits_and_close(&market_price("BTCUSDT", 101.0))
        .unwrap();
    assert!(closed.is_empty());
    assert_eq!(engine.get_active_positions(None).unwrap().len(), 1);
}

// =============================================================================
// Intelligent Closure
// =============================================================================

#[test]
fn test_low_confidence_intelligent_closure() {
    let (engine, _dir) = test_engine(|_| {});
    open_position(&engine, "BTCUSDT", prediction("BTCUSDT", 0.7, 0.02, 103.0), 100.0);

    // New forecast with collapsed confidence
    let weak = prediction("BTCUSDT", 0.25, 0.01, 101.0);
    let report = engine.check_intelligent_closures(&weak, 101.0).unwrap();

    assert_eq!(report.checked, 1);
    assert_eq!(report.closed_count, 1);
    let outcome = &report.closures[0];
    assert!(outcome.reasons.contains(&CloseReason::LowConfidence));
    assert!(outcome
        .position
        .exit_reason
        .as_deref()
        .unwrap()
        .contains("low_confidence"));
}

#[test]
fn test_intelligent_closure_spares_healthy_position() {
    let (engine, _dir) = test_engine(|_| {});
    open_position(&engine, "BTCUSDT", prediction("BTCUSDT", 0.7, 0.02, 103.0), 100.0);

    let strong = prediction("BTCUSDT", 0.85, 0.05, 107.0);
    let report = engine.check_intelligent_closures(&strong, 102.0).unwrap();

    assert_eq!(report.checked, 1);
    assert_eq!(report.closed_count, 0);
    assert_eq!(engine.get_active_positions(None).unwrap().len(), 1);
}

#[test]
fn test_negative_outlook_closure_records_all_reasons() {
    let (engine, _dir) = test_engine(|_| {});
    open_position(&engine, "BTCUSDT", prediction("BTCUSDT", 0.7, 0.02, 103.0), 100.0);

    // Confident bearish forecast against the long: negative outlook
    // and opposite signal accumulate together.
    let bearish = prediction("BTCUSDT", 0.8, -0.03, 97.0);
    let report = engine.check_intelligent_closures(&bearish, 100.0).unwrap();

    assert_eq!(report.closed_count, 1);
    let reasons = &report.closures[0].reasons;
    assert!(reasons.contains(&CloseReason::NegativeOutlook));
    assert!(reasons.contains(&CloseReason::OppositeSignal));
}

// =============================================================================
// Ledger & Performance
// =============================================================================

#[test]
fn test_balance_is_initial_plus_realized_net_pnl() {
    let (engine, _dir) = test_engine(|c| {
        c.trading.initial_balance = 10_000.0;
    });

    assert_relative_eq!(engine.get_balance(None).unwrap(), 10_000.0);

    let pos = open_position(&engine, "BTCUSDT", prediction("BTCUSDT", 0.7, 0.02, 103.0), 100.0);
    // Open positions do not affect balance
    assert_relative_eq!(engine.get_balance(None).unwrap(), 10_000.0);

    let closed = engine
        .close_position(pos.id, 110.0, "manual")
        .unwrap()
        .unwrap();

    assert_relative_eq!(
        engine.get_balance(None).unwrap(),
        10_000.0 + closed.net_pnl.unwrap()
    );
}

#[test]
fn test_balance_scoped_by_symbol() {
    let (engine, _dir) = test_engine(|_| {});

    let btc = open_position(&engine, "BTCUSDT", prediction("BTCUSDT", 0.7, 0.02, 103.0), 100.0);
    let btc = engine.close_position(btc.id, 110.0, "manual").unwrap().unwrap();

    let eth = open_position(&engine, "ETHUSDT", prediction("ETHUSDT", 0.7, 0.02, 2060.0), 2000.0);
    engine.close_position(eth.id, 1900.0, "manual").unwrap();

    let initial = 10_000.0;
    assert_relative_eq!(
        engine.get_balance(Some(&Symbol::new("BTCUSDT"))).unwrap(),
        initial + btc.net_pnl.unwrap()
    );
}

#[test]
fn test_performance_snapshot_over_window() {
    let (engine, _dir) = test_engine(|_| {});

    let pos = open_position(&engine, "BTCUSDT", prediction("BTCUSDT", 0.7, 0.02, 103.0), 100.0);
    engine.close_position(pos.id, 110.0, "manual").unwrap();

    let pos = open_position(&engine, "BTCUSDT", prediction("BTCUSDT", 0.7, 0.02, 103.0), 100.0);
    engine.close_position(pos.id, 96.0, "manual").unwrap();

    let snap = engine.get_performance(30, None).unwrap();
    assert_eq!(snap.total_trades, 2);
    assert_eq!(snap.winning_trades, 1);
    assert_eq!(snap.losing_trades, 1);
    assert_relative_eq!(snap.win_rate, 0.5);
    assert!(snap.avg_win > 0.0);
    assert!(snap.avg_loss > 0.0);
    assert!(snap.profit_factor > 0.0);
    assert!(snap.max_drawdown >= 0.0);
}

#[test]
fn test_performance_empty_window() {
    let (engine, _dir) = test_engine(|_| {});
    let snap = engine.get_performance(30, None).unwrap();
    assert_eq!(snap.total_trades, 0);
    assert_eq!(snap.win_rate, 0.0);
    assert_eq!(snap.profit_factor, 0.0);
    assert_eq!(snap.max_drawdown, 0.0);
}
