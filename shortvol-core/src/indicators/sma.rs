//! Simple Moving Average (SMA).
//!
//! Arithmetic mean of a non-empty window. The strict variant also rejects a
//! negative mean, which never occurs for price levels and usually means the
//! caller passed price changes by mistake.

use super::IndicatorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sma {
    reject_negative: bool,
}

impl Sma {
    /// Rejects negative means.
    pub fn strict() -> Self {
        Self {
            reject_negative: true,
        }
    }

    /// Accepts any finite mean.
    pub fn permissive() -> Self {
        Self {
            reject_negative: false,
        }
    }

    pub fn rejects_negative(&self) -> bool {
        self.reject_negative
    }

    pub fn compute(&self, values: &[f64]) -> Result<f64, IndicatorError> {
        if values.is_empty() {
            return Err(IndicatorError::EmptyInput);
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(IndicatorError::NonFiniteInput { index });
        }

        let mean = values.iter().sum::<f64>() / values.len() as f64;
        if self.reject_negative && mean < 0.0 {
            return Err(IndicatorError::NegativeResult { value: mean });
        }
        Ok(mean)
    }
}

impl Default for Sma {
    fn default() -> Self {
        Self::strict()
    }
}

/// Strict SMA over the whole slice.
pub fn simple_moving_average(values: &[f64]) -> Result<f64, IndicatorError> {
    Sma::strict().compute(values)
}
