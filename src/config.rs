//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files with
//! environment variable support for service endpoints and credentials.
//!
//! Every threshold the engine uses lives here, including the closure
//! probability weights. Nothing in the decision logic assumes the
//! default numeric split; all of it is tunable per deployment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Main configuration structure, constructed once and passed by
/// reference into every component. No ambient globals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub signal: SignalConfig,
    #[serde(default)]
    pub closure: ClosureConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl EngineConfig {
    /// Load configuration from a JSON file. Service endpoints and the
    /// API key can be overridden via environment variables.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let mut config: EngineConfig =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        if let Ok(url) = std::env::var("PRICE_API_URL") {
            config.feed.price_url = url;
        }
        if let Ok(url) = std::env::var("FORECAST_API_URL") {
            config.feed.forecast_url = url;
        }
        if let Ok(key) = std::env::var("FORECAST_API_KEY") {
            config.feed.api_key = Some(key);
        }

        Ok(config)
    }
}

/// Balance and position sizing parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    pub symbols: Vec<String>,
    /// Starting paper balance, same currency as the price feed
    pub initial_balance: f64,
    /// Fraction of available balance committed per position
    pub max_position_fraction: f64,
    /// Fee charged per fill, in basis points of notional
    pub fee_bps: f64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        TradingConfig {
            symbols: vec![
                "BTCUSDT".to_string(),
                "ETHUSDT".to_string(),
                "SOLUSDT".to_string(),
            ],
            initial_balance: 10_000.0,
            max_position_fraction: 0.10,
            fee_bps: 10.0,
        }
    }
}

impl TradingConfig {
    pub fn symbols(&self) -> Vec<crate::Symbol> {
        self.symbols.iter().map(crate::Symbol::new).collect()
    }
}

/// Signal generation thresholds
///
/// A trade requires both a minimum confidence and a minimum magnitude
/// of predicted divergence; either alone is insufficient, which keeps
/// the engine out of small low-confidence wobbles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    /// Minimum confidence to act on a forecast
    pub min_confidence: f64,
    /// Minimum |predicted_price - price| / price to act
    pub min_divergence_pct: f64,
    /// Minimum |predicted_return| to act
    pub min_return: f64,
    /// Confidence below which open positions get a low-confidence review
    pub review_max_confidence: f64,
    /// |predicted_return| below which the review flag applies
    pub review_max_return: f64,
    /// Stop-loss offset from the reference price
    pub stop_loss_pct: f64,
    /// Take-profit offset from the reference price
    pub take_profit_pct: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        SignalConfig {
            min_confidence: 0.6,
            min_divergence_pct: 0.012,
            min_return: 0.012,
            review_max_confidence: 0.5,
            review_max_return: 0.005,
            stop_loss_pct: 0.05,
            take_profit_pct: 0.15,
        }
    }
}

/// Intelligent closure parameters
///
/// The probability weighting is a heuristic, not calibrated business
/// logic, so every weight is configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosureConfig {
    /// Weight of the forecast confidence term
    pub confidence_weight: f64,
    /// Weight of the direction-aligned return term
    pub return_weight: f64,
    /// Weight of the time-decay term
    pub time_decay_weight: f64,
    /// Fixed decay representing irreducible horizon uncertainty
    pub time_decay: f64,
    /// Cap on the return factor relative to the move still required
    pub return_factor_cap: f64,
    /// Confidence below which a position is flagged for closure
    pub min_confidence: f64,
    /// Profit probability below which a position is flagged
    pub min_profit_probability: f64,
    /// Direction-aligned expected return below which the outlook is
    /// considered negative (e.g. -0.015 = 1.5% against the position)
    pub negative_outlook_threshold: f64,
}

impl Default for ClosureConfig {
    fn default() -> Self {
        ClosureConfig {
            confidence_weight: 0.5,
            return_weight: 0.3,
            time_decay_weight: 0.2,
            time_decay: 0.8,
            return_factor_cap: 2.0,
            min_confidence: 0.3,
            min_profit_probability: 0.4,
            negative_outlook_threshold: -0.015,
        }
    }
}

/// External service endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub price_url: String,
    pub forecast_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        FeedConfig {
            price_url: "http://localhost:8000".to_string(),
            forecast_url: "http://localhost:8001".to_string(),
            api_key: None,
            timeout_secs: 10,
        }
    }
}

/// Persistence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub state_dir: String,
    /// Export a JSON snapshot of open positions after each commit
    pub auto_backup: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            state_dir: "state".to_string(),
            auto_backup: true,
        }
    }
}
