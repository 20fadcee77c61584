//! Market data and forecast service clients
//!
//! HTTP clients for the external price feed and forecasting service.
//! Both services are opaque collaborators; the engine only trusts
//! their payloads after schema validation at this boundary.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::FeedConfig;
use crate::types::{MarketPrice, Prediction, Symbol};

/// Raw price payload as the feed serves it, before validation
#[derive(Debug, Deserialize)]
struct RawPrice {
    symbol: String,
    price: f64,
    timestamp: DateTime<Utc>,
}

/// Raw forecast payload, before validation
#[derive(Debug, Deserialize)]
struct RawPrediction {
    symbol: String,
    predicted_price: f64,
    predicted_return: f64,
    confidence_score: f64,
    horizon_hours: f64,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct FeedClient {
    config: FeedConfig,
    client: reqwest::Client,
}

impl FeedClient {
    pub fn new(config: FeedConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(FeedClient { config, client })
    }

    /// Fetch the latest traded price for a symbol
    pub async fn get_price(&self, symbol: &Symbol) -> Result<MarketPrice> {
        let url = format!("{}/prices/{}", self.config.price_url, symbol);
        let raw: RawPrice = self
            .request(&url)
            .await
            .with_context(|| format!("Failed to fetch price for {symbol}"))?;

        let price = MarketPrice::new(Symbol::new(&raw.symbol), raw.price, raw.timestamp)
            .with_context(|| format!("Rejected malformed price record for {symbol}"))?;

        debug!("Price {}: {:.2}", price.symbol, price.price);
        Ok(price)
    }

    /// Fetch the most recent forecast for a symbol
    pub async fn get_prediction(&self, symbol: &Symbol) -> Result<Prediction> {
        let url = format!("{}/predictions/{}/latest", self.config.forecast_url, symbol);
        let raw: RawPrediction = self
            .request(&url)
            .await
            .with_context(|| format!("Failed to fetch prediction for {symbol}"))?;

        let prediction = Prediction {
            symbol: Symbol::new(&raw.symbol),
            predicted_price: raw.predicted_price,
            predicted_return: raw.predicted_return,
            confidence_score: raw.confidence_score,
            horizon_hours: raw.horizon_hours,
            timestamp: raw.timestamp,
        };
        prediction
            .validate()
            .with_context(|| format!("Rejected malformed prediction record for {symbol}"))?;

        debug!(
            "Prediction {}: price={:.2} return={:+.4} conf={:.2}",
            prediction.symbol,
            prediction.predicted_price,
            prediction.predicted_return,
            prediction.confidence_score
        );
        Ok(prediction)
    }

    async fn request<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let mut req = self.client.get(url);
        if let Some(key) = &self.config.api_key {
            req = req.header("X-API-KEY", key);
        }

        let response = req.send().await.context("Request failed")?;
        let response = response
            .error_for_status()
            .context("Service returned an error status")?;

        response.json().await.context("Failed to parse response")
    }
}
