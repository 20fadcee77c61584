//! Position manager
//!
//! Orchestrator owning the position state machine: opens positions
//! from signals, applies closure verdicts, enforces the
//! one-open-position-per-symbol invariant, persists transitions, and
//! reports closure outcomes. All mutations of the position table flow
//! through this type; nothing touches the store's rows directly.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::closure::ClosureEvaluator;
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::performance::{Ledger, PerformanceCalculator};
use crate::signal::SignalGenerator;
use crate::store::{NewPosition, PositionStore};
use crate::types::{
    CloseReason, MarketPrice, PerformanceSnapshot, Position, Prediction, Side, Symbol,
    TradingSignal,
};

/// Outcome of one intelligent-closure review pass
#[derive(Debug, Clone, serde::Serialize)]
pub struct ClosureReport {
    pub checked: usize,
    pub closed_count: usize,
    pub closures: Vec<ClosureOutcome>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ClosureOutcome {
    pub position: Position,
    pub reasons: Vec<CloseReason>,
    pub profit_probability: f64,
}

pub struct PositionManager {
    config: EngineConfig,
    store: Arc<PositionStore>,
    signal_generator: SignalGenerator,
    closure_evaluator: ClosureEvaluator,
    calculator: PerformanceCalculator,
    ledger: Ledger,
    prices: Mutex<HashMap<Symbol, MarketPrice>>,
    predictions: Mutex<HashMap<Symbol, Prediction>>,
}

impl PositionManager {
    pub fn new(config: EngineConfig, store: Arc<PositionStore>) -> Self {
        let signal_generator = SignalGenerator::new(config.signal.clone());
        let closure_evaluator =
            ClosureEvaluator::new(config.closure.clone(), config.signal.clone());
        let ledger = Ledger::new(&config.trading);
        let calculator = PerformanceCalculator::new(ledger.clone());

        PositionManager {
            config,
            store,
            signal_generator,
            closure_evaluator,
            calculator,
            ledger,
            prices: Mutex::new(HashMap::new()),
            predictions: Mutex::new(HashMap::new()),
        }
    }

    /// Record the latest market price for a symbol
    pub fn update_market_price(&self, price: MarketPrice) -> EngineResult<()> {
        price.validate()?;
        self.prices
            .lock()
            .unwrap()
            .insert(price.symbol.clone(), price);
        Ok(())
    }

    /// Record the latest forecast for a symbol. Malformed forecasts
    /// are rejected here so downstream decisions only ever see
    /// well-formed numbers.
    pub fn update_prediction(&self, prediction: Prediction) -> EngineResult<()> {
        prediction.validate()?;
        self.predictions
            .lock()
            .unwrap()
            .insert(prediction.symbol.clone(), prediction);
        Ok(())
    }

    pub fn latest_prediction(&self, symbol: &Symbol) -> Option<Prediction> {
        self.predictions.lock().unwrap().get(symbol).cloned()
    }

    /// Generate a trading signal from the most recent forecast.
    ///
    /// With no forecast on record this returns a neutral hold with
    /// confidence 0 and logs the condition, rather than failing the
    /// cycle. Price resolution order: the supplied price, then the
    /// cached market price, then the predicted price itself as a
    /// documented degraded mode.
    pub fn generate_signal(
        &self,
        symbol: &Symbol,
        current_price: Option<f64>,
    ) -> EngineResult<TradingSignal> {
        let prediction = match self.latest_prediction(symbol) {
            Some(p) => p,
            None => {
                warn!("No prediction available for {symbol}, holding");
                self.audit(
                    "signal_generator",
                    "warn",
                    Some(symbol),
                    "no prediction available, returning neutral hold",
                    serde_json::json!({}),
                );
                let fallback = self.cached_price(symbol).unwrap_or(0.0);
                return Ok(TradingSignal::neutral_hold(symbol.clone(), fallback));
            }
        };

        let price = match current_price.or_else(|| self.cached_price(symbol)) {
            Some(p) => p,
            None => {
                debug!(
                    "No market price for {symbol}, using predicted price as reference (degraded)"
                );
                prediction.predicted_price
            }
        };

        Ok(self.signal_generator.generate(&prediction, price))
    }

    /// Open (or reverse into) a position from a non-hold signal.
    ///
    /// Returns None when the action is hold, when a same-direction
    /// position is already open, or when sizing produces nothing to
    /// trade. An opposing open position is closed with reason
    /// `signal_change` before the new one opens.
    pub fn execute_signal(&self, signal: &TradingSignal) -> EngineResult<Option<Position>> {
        let side = match signal.action.side() {
            Some(side) => side,
            None => return Ok(None),
        };

        if let Some(existing) = self
            .store
            .open_positions(Some(&signal.symbol))?
            .into_iter()
            .next()
        {
            if existing.side == side {
                debug!(
                    "Signal {} {}: position #{} already open in same direction",
                    signal.action, signal.symbol, existing.id
                );
                self.audit(
                    "position_manager",
                    "info",
                    Some(&signal.symbol),
                    "open rejected: already open in same direction",
                    serde_json::json!({ "position_id": existing.id, "action": signal.action }),
                );
                return Ok(None);
            }

            // Signal reversal: flatten before opening the other way
            info!(
                "Signal reversal on {}: closing #{} before opening {}",
                signal.symbol, existing.id, side
            );
            self.close_open_position(&existing, signal.price, CloseReason::SignalChange.as_str())?;
        }

        self.open_position(signal, side)
    }

    fn open_position(
        &self,
        signal: &TradingSignal,
        side: Side,
    ) -> EngineResult<Option<Position>> {
        let balance = self.get_balance(None)?;
        let quantity =
            (balance * self.config.trading.max_position_fraction) / signal.price;
        if !quantity.is_finite() || quantity <= 0.0 {
            warn!(
                "Sizing produced no position for {} (balance={:.2})",
                signal.symbol, balance
            );
            return Ok(None);
        }

        let notional = quantity * signal.price;
        let entry_fees = notional * self.config.trading.fee_bps / 10_000.0;

        let new = NewPosition {
            symbol: signal.symbol.clone(),
            side,
            entry_price: signal.price,
            quantity,
            stop_loss: signal
                .stop_loss
                .unwrap_or_else(|| self.default_stop(side, signal.price)),
            take_profit: signal.take_profit,
            entry_fees,
            signal_confidence: signal.confidence,
            predicted_price: signal.predicted_price,
            opened_at: Utc::now(),
        };

        let opened = match self.store.open_position(&new) {
            Ok(opened) => opened,
            Err(e) => {
                self.audit(
                    "position_manager",
                    "error",
                    Some(&signal.symbol),
                    "open transition aborted by persistence failure",
                    serde_json::json!({ "action": signal.action, "error": e.to_string() }),
                );
                return Err(e);
            }
        };

        match opened {
            Some(position) => {
                info!(
                    "Opened #{} {} {} qty={:.6} @ {:.2} stop={:.2} target={:?}",
                    position.id,
                    position.side,
                    position.symbol,
                    position.quantity,
                    position.entry_price,
                    position.stop_loss,
                    position.take_profit,
                );
                self.audit(
                    "position_manager",
                    "info",
                    Some(&position.symbol),
                    "position opened",
                    serde_json::json!({
                        "position_id": position.id,
                        "side": position.side,
                        "quantity": position.quantity,
                        "entry_price": position.entry_price,
                    }),
                );
                Ok(Some(position))
            }
            None => {
                // Lost the race to a concurrent open; the invariant held
                self.audit(
                    "position_manager",
                    "info",
                    Some(&signal.symbol),
                    "open rejected: already open in same direction",
                    serde_json::json!({ "action": signal.action }),
                );
                Ok(None)
            }
        }
    }

    fn default_stop(&self, side: Side, price: f64) -> f64 {
        match side {
            Side::Long => price * (1.0 - self.config.signal.stop_loss_pct),
            Side::Short => price * (1.0 + self.config.signal.stop_loss_pct),
        }
    }

    /// Close a position by id. Idempotent: closing an already-closed
    /// position is a no-op that returns the terminal state, so
    /// duplicate monitoring triggers are absorbed safely.
    pub fn close_position(
        &self,
        id: i64,
        exit_price: f64,
        reason: &str,
    ) -> EngineResult<Option<Position>> {
        let position = match self.store.get_position(id)? {
            Some(p) => p,
            None => return Ok(None),
        };

        if !position.is_open() {
            debug!("Close #{id}: already closed, no-op");
            return Ok(Some(position));
        }

        self.close_open_position(&position, exit_price, reason)
    }

    fn close_open_position(
        &self,
        position: &Position,
        exit_price: f64,
        reason: &str,
    ) -> EngineResult<Option<Position>> {
        let gross_pnl = position.gross_pnl_at(exit_price);
        let exit_fees = position.quantity * exit_price * self.config.trading.fee_bps / 10_000.0;
        let total_fees = position.fees + exit_fees;
        let net_pnl = gross_pnl - total_fees;

        let closed = match self.store.close_position(
            position.id,
            exit_price,
            total_fees,
            gross_pnl,
            net_pnl,
            reason,
            Utc::now(),
        ) {
            Ok(closed) => closed,
            Err(e) => {
                self.audit(
                    "position_manager",
                    "error",
                    Some(&position.symbol),
                    "close transition aborted by persistence failure",
                    serde_json::json!({
                        "position_id": position.id,
                        "reason": reason,
                        "error": e.to_string(),
                    }),
                );
                return Err(e);
            }
        };

        match closed {
            Some(closed) => {
                let result = if net_pnl > 0.0 { "WIN" } else { "LOSS" };
                info!(
                    "Closed #{} {} {} @ {:.2} -> {:.2} | net={:.2} | {} | {}",
                    closed.id,
                    closed.side,
                    closed.symbol,
                    closed.entry_price,
                    exit_price,
                    net_pnl,
                    reason,
                    result
                );
                self.audit(
                    "position_manager",
                    "info",
                    Some(&closed.symbol),
                    "position closed",
                    serde_json::json!({
                        "position_id": closed.id,
                        "exit_price": exit_price,
                        "net_pnl": net_pnl,
                        "reason": reason,
                    }),
                );
                Ok(Some(closed))
            }
            // A concurrent close won; return the terminal state
            None => self.store.get_position(position.id),
        }
    }

    /// Sweep all open positions for the priced symbol and close any
    /// whose stop-loss or take-profit is breached. Stop-loss is
    /// checked first; the first threshold hit fixes the exit reason.
    pub fn check_exits_and_close(&self, price: &MarketPrice) -> EngineResult<Vec<Position>> {
        let mut closed = Vec::new();

        for position in self.store.open_positions(Some(&price.symbol))? {
            let reason = if position.stop_hit(price.price) {
                Some(CloseReason::StopLoss)
            } else if position.target_hit(price.price) {
                Some(CloseReason::TakeProfit)
            } else {
                None
            };

            if let Some(reason) = reason {
                if let Some(done) =
                    self.close_open_position(&position, price.price, reason.as_str())?
                {
                    closed.push(done);
                }
            }
        }

        Ok(closed)
    }

    /// Review open positions for the forecast symbol against the
    /// intelligent-closure rules and close the ones flagged. The full
    /// reason set is persisted, comma-joined, as the exit reason.
    pub fn check_intelligent_closures(
        &self,
        prediction: &Prediction,
        current_price: f64,
    ) -> EngineResult<ClosureReport> {
        prediction.validate()?;

        let open = self.store.open_positions(Some(&prediction.symbol))?;
        let checked = open.len();
        let mut closures = Vec::new();

        for position in open {
            let verdict = self
                .closure_evaluator
                .evaluate(&position, prediction, current_price);
            if !verdict.should_close {
                continue;
            }

            debug!(
                "Intelligent closure on #{} ({}): p={:.2} reasons={}",
                position.id,
                position.symbol,
                verdict.profit_probability,
                verdict.reason_tag()
            );

            if let Some(closed) =
                self.close_open_position(&position, current_price, &verdict.reason_tag())?
            {
                closures.push(ClosureOutcome {
                    position: closed,
                    reasons: verdict.reasons,
                    profit_probability: verdict.profit_probability,
                });
            }
        }

        Ok(ClosureReport {
            checked,
            closed_count: closures.len(),
            closures,
        })
    }

    /// Open positions, optionally scoped to one symbol
    pub fn get_active_positions(&self, symbol: Option<&Symbol>) -> EngineResult<Vec<Position>> {
        self.store.open_positions(symbol)
    }

    /// Realized balance for the scope: initial balance plus the net
    /// P&L of closed trades. Open positions are not marked to market.
    pub fn get_balance(&self, symbol: Option<&Symbol>) -> EngineResult<f64> {
        Ok(self.ledger.initial_balance() + self.store.realized_net_pnl(symbol)?)
    }

    /// Performance snapshot over a trailing window of closed trades
    pub fn get_performance(
        &self,
        window_days: i64,
        symbol: Option<&Symbol>,
    ) -> EngineResult<PerformanceSnapshot> {
        let cutoff = Utc::now() - chrono::Duration::days(window_days);
        let closed = self.store.closed_since(Some(cutoff), symbol)?;
        Ok(self.calculator.snapshot(&closed))
    }

    /// Most recently closed trades, newest first
    pub fn get_recent_trades(
        &self,
        limit: usize,
        symbol: Option<&Symbol>,
    ) -> EngineResult<Vec<Position>> {
        self.store.recent_trades(limit, symbol)
    }

    fn cached_price(&self, symbol: &Symbol) -> Option<f64> {
        self.prices.lock().unwrap().get(symbol).map(|p| p.price)
    }

    /// Best-effort audit append; an audit failure must not abort a
    /// transition that already committed.
    fn audit(
        &self,
        component: &str,
        level: &str,
        symbol: Option<&Symbol>,
        message: &str,
        context: serde_json::Value,
    ) {
        if let Err(e) = self.store.log_audit(component, level, symbol, message, context) {
            warn!("Audit log append failed: {e}");
        }
    }
}
