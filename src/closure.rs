//! Intelligent closure evaluation
//!
//! Pure decision logic: given an open position, the latest forecast,
//! and the current price, decide whether the position should close and
//! for which reasons. The evaluator never mutates state; the position
//! manager applies the verdict.

use crate::config::{ClosureConfig, SignalConfig};
use crate::signal::SignalGenerator;
use crate::types::{CloseReason, Position, Prediction, Side, SignalAction};

/// Result of evaluating one open position against the latest forecast.
/// Reasons accumulate independently; `should_close` is true iff the
/// set is non-empty.
#[derive(Debug, Clone)]
pub struct ClosureVerdict {
    pub should_close: bool,
    pub reasons: Vec<CloseReason>,
    pub profit_probability: f64,
}

impl ClosureVerdict {
    /// Comma-joined reason tags, as persisted into `exit_reason`
    pub fn reason_tag(&self) -> String {
        self.reasons
            .iter()
            .map(|r| r.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[derive(Debug, Clone)]
pub struct ClosureEvaluator {
    config: ClosureConfig,
    signal_generator: SignalGenerator,
}

impl ClosureEvaluator {
    pub fn new(config: ClosureConfig, signal_config: SignalConfig) -> Self {
        ClosureEvaluator {
            config,
            signal_generator: SignalGenerator::new(signal_config),
        }
    }

    /// Evaluate an open position. Callers must not pass closed
    /// positions; the verdict would be meaningless.
    pub fn evaluate(
        &self,
        position: &Position,
        prediction: &Prediction,
        current_price: f64,
    ) -> ClosureVerdict {
        let mut reasons = Vec::new();

        // Hard price levels first, stop before target
        if position.stop_hit(current_price) {
            reasons.push(CloseReason::StopLoss);
        } else if position.target_hit(current_price) {
            reasons.push(CloseReason::TakeProfit);
        }

        if prediction.confidence_score < self.config.min_confidence {
            reasons.push(CloseReason::LowConfidence);
        }

        let profit_probability = self.profit_probability(position, prediction, current_price);
        if profit_probability < self.config.min_profit_probability {
            reasons.push(CloseReason::LowProfitProbability);
        }

        let aligned_return = prediction.predicted_return * position.side.direction();
        if aligned_return < self.config.negative_outlook_threshold {
            reasons.push(CloseReason::NegativeOutlook);
        }

        if self.is_opposite_signal(position, prediction, current_price) {
            reasons.push(CloseReason::OppositeSignal);
        }

        ClosureVerdict {
            should_close: !reasons.is_empty(),
            reasons,
            profit_probability,
        }
    }

    /// Probability in [0, 1] that the position still reaches profit:
    /// a weighted blend of forecast confidence, the direction-aligned
    /// return relative to the move still required to hit take-profit,
    /// and a fixed time-decay for horizon uncertainty.
    pub fn profit_probability(
        &self,
        position: &Position,
        prediction: &Prediction,
        current_price: f64,
    ) -> f64 {
        let confidence_term = self.config.confidence_weight * prediction.confidence_score;
        let return_term = self.config.return_weight
            * self.return_factor(position, prediction.predicted_return, current_price);
        let decay_term = self.config.time_decay_weight * self.config.time_decay;

        (confidence_term + return_term + decay_term).clamp(0.0, 1.0)
    }

    /// Predicted return aligned with the position's direction, scaled
    /// by the remaining distance to take-profit and capped. Zero when
    /// the forecast points against the position.
    fn return_factor(&self, position: &Position, predicted_return: f64, price: f64) -> f64 {
        let aligned = predicted_return * position.side.direction();
        if aligned <= 0.0 || price <= 0.0 {
            return 0.0;
        }

        let required_move = match (position.take_profit, position.side) {
            (Some(tp), Side::Long) => (tp - price) / price,
            (Some(tp), Side::Short) => (price - tp) / price,
            (None, _) => return self.config.return_factor_cap,
        };

        // Already at or past the target: no further move required
        if required_move <= 0.0 {
            return self.config.return_factor_cap;
        }

        (aligned / required_move).min(self.config.return_factor_cap)
    }

    /// Re-run the entry decision rule on the current forecast and
    /// check whether it now points against the open position.
    fn is_opposite_signal(
        &self,
        position: &Position,
        prediction: &Prediction,
        current_price: f64,
    ) -> bool {
        let action = self.signal_generator.decide_action(prediction, current_price);
        matches!(
            (position.side, action),
            (Side::Long, SignalAction::Sell) | (Side::Short, SignalAction::Buy)
        )
    }
}
