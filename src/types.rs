//! Core data types used across the trading engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for forecast and price records arriving from
/// external services. The engine's invariants depend on well-formed
/// numeric inputs, so payloads are rejected at the boundary.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("price ({0}) must be positive and finite")]
    InvalidPrice(f64),

    #[error("predicted_price ({0}) must be positive and finite")]
    InvalidPredictedPrice(f64),

    #[error("confidence_score ({0}) must be within [0, 1]")]
    ConfidenceOutOfRange(f64),

    #[error("predicted_return ({0}) must be finite")]
    NonFiniteReturn(f64),

    #[error("horizon_hours ({0}) must be positive")]
    NonPositiveHorizon(f64),
}

/// Trading pair symbol using Arc<str> for cheap cloning
///
/// Symbols are cloned on every signal, position, and audit entry.
/// Arc<str> keeps those clones allocation-free.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(#[serde(with = "arc_str_serde")] std::sync::Arc<str>);

/// Custom serde for Arc<str>
mod arc_str_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::sync::Arc;

    pub fn serialize<S>(value: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Arc::from(s.as_str()))
    }
}

impl Symbol {
    pub fn new(s: impl AsRef<str>) -> Self {
        Symbol(std::sync::Arc::from(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "long",
            Side::Short => "short",
        }
    }

    /// Sign applied to price moves when computing P&L
    pub fn direction(&self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

impl std::str::FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "long" => Ok(Side::Long),
            "short" => Ok(Side::Short),
            other => Err(format!("unknown side: {other}")),
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recommended action derived from a forecast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

impl SignalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalAction::Buy => "buy",
            SignalAction::Sell => "sell",
            SignalAction::Hold => "hold",
        }
    }

    /// Side a non-hold action would open
    pub fn side(&self) -> Option<Side> {
        match self {
            SignalAction::Buy => Some(Side::Long),
            SignalAction::Sell => Some(Side::Short),
            SignalAction::Hold => None,
        }
    }
}

impl std::fmt::Display for SignalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position lifecycle state. Closed is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Open,
    Closed,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Open => "open",
            PositionStatus::Closed => "closed",
        }
    }
}

impl std::str::FromStr for PositionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(PositionStatus::Open),
            "closed" => Ok(PositionStatus::Closed),
            other => Err(format!("unknown position status: {other}")),
        }
    }
}

/// Why a position was (or should be) closed. Reasons accumulate
/// independently during intelligent closure review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    StopLoss,
    TakeProfit,
    LowConfidence,
    LowProfitProbability,
    NegativeOutlook,
    OppositeSignal,
    SignalChange,
    Manual,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::StopLoss => "stop_loss",
            CloseReason::TakeProfit => "take_profit",
            CloseReason::LowConfidence => "low_confidence",
            CloseReason::LowProfitProbability => "low_profit_probability",
            CloseReason::NegativeOutlook => "negative_outlook",
            CloseReason::OppositeSignal => "opposite_signal",
            CloseReason::SignalChange => "signal_change",
            CloseReason::Manual => "manual",
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest traded price from the external price feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketPrice {
    pub symbol: Symbol,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

impl MarketPrice {
    pub fn new(
        symbol: Symbol,
        price: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let mp = Self {
            symbol,
            price,
            timestamp,
        };
        mp.validate()?;
        Ok(mp)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.price.is_finite() || self.price <= 0.0 {
            return Err(ValidationError::InvalidPrice(self.price));
        }
        Ok(())
    }
}

/// Forecast snapshot from the external prediction service.
/// Immutable once produced; the engine consumes but never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub symbol: Symbol,
    pub predicted_price: f64,
    /// Signed fractional return over the horizon (0.02 = +2%)
    pub predicted_return: f64,
    /// Model confidence in [0, 1]
    pub confidence_score: f64,
    pub horizon_hours: f64,
    pub timestamp: DateTime<Utc>,
}

impl Prediction {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.predicted_price.is_finite() || self.predicted_price <= 0.0 {
            return Err(ValidationError::InvalidPredictedPrice(self.predicted_price));
        }
        if !self.confidence_score.is_finite() || !(0.0..=1.0).contains(&self.confidence_score) {
            return Err(ValidationError::ConfidenceOutOfRange(self.confidence_score));
        }
        if !self.predicted_return.is_finite() {
            return Err(ValidationError::NonFiniteReturn(self.predicted_return));
        }
        if !self.horizon_hours.is_finite() || self.horizon_hours <= 0.0 {
            return Err(ValidationError::NonPositiveHorizon(self.horizon_hours));
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

/// Ephemeral buy/sell/hold recommendation derived from a forecast and
/// a reference price. Not persisted as its own entity; the relevant
/// fields are embedded into the position it opens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingSignal {
    pub symbol: Symbol,
    pub action: SignalAction,
    pub confidence: f64,
    /// Price the decision was made against
    pub price: f64,
    pub predicted_return: f64,
    pub predicted_price: f64,
    /// |predicted_price - price| / price
    pub price_difference_pct: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    /// Set when the forecast is weak enough that existing open
    /// positions deserve review, independent of the action. The cycle
    /// runs the closure review unconditionally; this flag marks the
    /// weak-forecast case for operators and serialized consumers.
    pub review_low_confidence: bool,
}

impl TradingSignal {
    /// Neutral hold used when no forecast is available
    pub fn neutral_hold(symbol: Symbol, price: f64) -> Self {
        TradingSignal {
            symbol,
            action: SignalAction::Hold,
            confidence: 0.0,
            price,
            predicted_return: 0.0,
            predicted_price: price,
            price_difference_pct: 0.0,
            stop_loss: None,
            take_profit: None,
            review_low_confidence: false,
        }
    }
}

/// A simulated trade tracked from open to close.
///
/// Positions are append-only: they are never deleted, only marked
/// closed, so the position table doubles as the trade ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: i64,
    pub symbol: Symbol,
    pub side: Side,
    pub entry_price: f64,
    pub quantity: f64,
    pub stop_loss: f64,
    pub take_profit: Option<f64>,
    pub status: PositionStatus,
    /// Accumulated entry + exit fees
    pub fees: f64,
    pub exit_price: Option<f64>,
    pub gross_pnl: Option<f64>,
    pub net_pnl: Option<f64>,
    /// Comma-joined reason set once closed
    pub exit_reason: Option<String>,
    /// Confidence of the signal that opened the position
    pub signal_confidence: f64,
    /// Forecast price at open, kept for audit
    pub predicted_price: f64,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// Stop-loss breached at the given price (mirrored for shorts)
    pub fn stop_hit(&self, price: f64) -> bool {
        match self.side {
            Side::Long => price <= self.stop_loss,
            Side::Short => price >= self.stop_loss,
        }
    }

    /// Take-profit reached at the given price (mirrored for shorts)
    pub fn target_hit(&self, price: f64) -> bool {
        match (self.take_profit, self.side) {
            (Some(tp), Side::Long) => price >= tp,
            (Some(tp), Side::Short) => price <= tp,
            (None, _) => false,
        }
    }

    /// Gross P&L if the position were exited at the given price
    pub fn gross_pnl_at(&self, exit_price: f64) -> f64 {
        (exit_price - self.entry_price) * self.quantity * self.side.direction()
    }
}

/// Derived read model over a window of closed trades.
/// Recomputed on demand; not authoritative state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    /// Sum of gross P&L over the window
    pub total_pnl: f64,
    /// Sum of net P&L over the window
    pub net_pnl: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub profit_factor: f64,
    pub max_drawdown: f64,
}
