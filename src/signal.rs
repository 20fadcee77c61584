//! Signal generation
//!
//! Converts a forecast plus a reference price into a buy/sell/hold
//! recommendation. A trade requires the confidence gate AND the
//! divergence gate AND the return gate to pass together; any one of
//! them alone never opens a position.

use tracing::debug;

use crate::config::SignalConfig;
use crate::types::{Prediction, Side, SignalAction, TradingSignal};

/// Stateless signal generator. The same decision rule is re-run by the
/// closure evaluator to detect opposite signals against open positions.
#[derive(Debug, Clone)]
pub struct SignalGenerator {
    config: SignalConfig,
}

impl SignalGenerator {
    pub fn new(config: SignalConfig) -> Self {
        SignalGenerator { config }
    }

    /// Derive a signal from the forecast against the given reference
    /// price. The caller resolves which price to use (explicit, cached
    /// market, or the predicted price as a degraded last resort).
    pub fn generate(&self, prediction: &Prediction, price: f64) -> TradingSignal {
        let action = self.decide_action(prediction, price);
        let diff_pct = divergence_pct(prediction.predicted_price, price);
        let (stop_loss, take_profit) = self.protection_levels(action, price);

        let review_low_confidence = prediction.confidence_score
            < self.config.review_max_confidence
            && prediction.predicted_return.abs() < self.config.review_max_return;

        if review_low_confidence {
            debug!(
                symbol = %prediction.symbol,
                confidence = prediction.confidence_score,
                "Weak forecast: flagging open positions for low-confidence review"
            );
        }

        TradingSignal {
            symbol: prediction.symbol.clone(),
            action,
            confidence: prediction.confidence_score,
            price,
            predicted_return: prediction.predicted_return,
            predicted_price: prediction.predicted_price,
            price_difference_pct: diff_pct,
            stop_loss,
            take_profit,
            review_low_confidence,
        }
    }

    /// The core decision rule: both minimum confidence and minimum
    /// predicted divergence are required, plus a signed return beyond
    /// the threshold in either direction.
    pub fn decide_action(&self, prediction: &Prediction, price: f64) -> SignalAction {
        let conf = prediction.confidence_score;
        let ret = prediction.predicted_return;
        let diff_pct = divergence_pct(prediction.predicted_price, price);

        if conf < self.config.min_confidence || diff_pct < self.config.min_divergence_pct {
            return SignalAction::Hold;
        }

        if ret > self.config.min_return {
            SignalAction::Buy
        } else if ret < -self.config.min_return {
            SignalAction::Sell
        } else {
            SignalAction::Hold
        }
    }

    /// Stop-loss and take-profit offsets around the reference price,
    /// mirrored for short entries. Hold carries no levels.
    fn protection_levels(&self, action: SignalAction, price: f64) -> (Option<f64>, Option<f64>) {
        match action.side() {
            Some(Side::Long) => (
                Some(price * (1.0 - self.config.stop_loss_pct)),
                Some(price * (1.0 + self.config.take_profit_pct)),
            ),
            Some(Side::Short) => (
                Some(price * (1.0 + self.config.stop_loss_pct)),
                Some(price * (1.0 - self.config.take_profit_pct)),
            ),
            None => (None, None),
        }
    }
}

fn divergence_pct(predicted_price: f64, price: f64) -> f64 {
    if price <= 0.0 {
        return 0.0;
    }
    (predicted_price - price).abs() / price
}
