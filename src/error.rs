//! Engine error kinds
//!
//! Failures that abort a cycle or transition are explicit variants;
//! legitimate "nothing to do" outcomes (no open position, duplicate
//! close) are expressed as `Option` returns instead, so callers can
//! pattern-match rather than catch.

use thiserror::Error;

use crate::types::{Symbol, ValidationError};

#[derive(Debug, Error)]
pub enum EngineError {
    /// No forecast exists for the symbol. The signal path degrades to
    /// a neutral hold; transition paths treat this as fatal.
    #[error("no prediction available for {0}")]
    NoPrediction(Symbol),

    /// No usable price for the current cycle. Fatal: no transition is
    /// attempted.
    #[error("price unavailable for {0}")]
    PriceUnavailable(Symbol),

    /// Persistence failure during a transition. The position remains
    /// in its prior recorded state; the cycle is retried at the next
    /// external trigger.
    #[error("persistence failure: {0}")]
    Persistence(#[from] rusqlite::Error),

    /// Malformed record rejected at the service boundary
    #[error("invalid upstream record: {0}")]
    InvalidRecord(#[from] ValidationError),

    #[error("state serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// JSON backup or state directory I/O failure
    #[error("state io failure: {0}")]
    Io(#[from] std::io::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
