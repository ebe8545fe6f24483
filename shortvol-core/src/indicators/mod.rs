//! Incremental indicators over a price or price-change series.
//!
//! The engine is stateless per call. Smoothed state (`WilderAverages`) is
//! returned to the caller and passed back in on the next call, so any
//! number of independent series can be evaluated concurrently. `RsiState`
//! wraps that threading for callers that want a push-style interface.

pub mod candle;
pub mod rsi;
pub mod sma;

pub use candle::{price_changes, Candle};
pub use rsi::{relative_strength_index, RsiReading, RsiState, RsiValue, WilderAverages};
pub use sma::{simple_moving_average, Sma};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IndicatorError {
    #[error("cannot average an empty series")]
    EmptyInput,

    #[error("mean {value} is negative; price levels are expected to be non-negative")]
    NegativeResult { value: f64 },

    #[error("need {required} observations, have {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("smoothing period must be at least 1")]
    InvalidPeriod,

    #[error("observation {index} is not finite")]
    NonFiniteInput { index: usize },
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
