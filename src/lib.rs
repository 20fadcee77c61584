//! Forecast Trader
//!
//! A paper trading engine for crypto assets driven by periodic
//! price-forecast signals: signal generation from forecasts, position
//! lifecycle management with stop-loss/take-profit and intelligent
//! closure, and performance analytics over the realized trade ledger.

pub mod closure;
pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod performance;
pub mod signal;
pub mod store;
pub mod types;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use types::*;
