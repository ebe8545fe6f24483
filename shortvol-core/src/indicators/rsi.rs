//! Relative Strength Index (RSI) with Wilder smoothing.
//!
//! Input is a series of per-period price changes, not prices.
//!
//! Seed (exactly `period` changes): average gain is the sum of positive
//! changes divided by `period`; average loss is the sum of the magnitudes of
//! non-positive changes divided by `period`. Both divide by the full period,
//! not by the count of up or down days.
//!
//! Each later change folds in with Wilder's recurrence:
//! avg_gain' = (avg_gain * (N-1) + max(0, change)) / N
//! avg_loss' = (avg_loss * (N-1) + max(0, -change)) / N
//!
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss). With avg_loss == 0 the
//! ratio is undefined and the reading is `RsiValue::Undefined`.

use super::IndicatorError;
use serde::{Deserialize, Serialize};

/// Smoothed averages carried between evaluations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WilderAverages {
    pub avg_gain: f64,
    pub avg_loss: f64,
}

impl WilderAverages {
    /// Seed from exactly one window of changes.
    fn seed(window: &[f64]) -> Self {
        let n = window.len() as f64;
        let (gain, loss) = window.iter().fold((0.0, 0.0), |(g, l), &ch| {
            if ch > 0.0 {
                (g + ch.abs(), l)
            } else {
                (g, l + ch.abs())
            }
        });
        Self {
            avg_gain: gain / n,
            avg_loss: loss / n,
        }
    }

    /// Fold one change in with Wilder's recurrence.
    pub fn advance(self, change: f64, period: usize) -> Self {
        let n = period as f64;
        Self {
            avg_gain: (self.avg_gain * (n - 1.0) + change.max(0.0)) / n,
            avg_loss: (self.avg_loss * (n - 1.0) + (-change).max(0.0)) / n,
        }
    }

    pub fn rsi(&self) -> RsiValue {
        if self.avg_loss == 0.0 {
            RsiValue::Undefined
        } else {
            RsiValue::Defined(100.0 - 100.0 / (1.0 + self.avg_gain / self.avg_loss))
        }
    }
}

/// An RSI reading. `Undefined` when the average loss is exactly zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RsiValue {
    Defined(f64),
    Undefined,
}

impl RsiValue {
    pub fn value(&self) -> Option<f64> {
        match self {
            RsiValue::Defined(v) => Some(*v),
            RsiValue::Undefined => None,
        }
    }

    /// Map `Undefined` to the conventional maximum of 100.
    pub fn saturated(&self) -> f64 {
        self.value().unwrap_or(100.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RsiReading {
    pub rsi: RsiValue,
    pub averages: WilderAverages,
}

impl From<WilderAverages> for RsiReading {
    fn from(averages: WilderAverages) -> Self {
        Self {
            rsi: averages.rsi(),
            averages,
        }
    }
}

/// Compute RSI over `changes`.
///
/// - fewer than `period` changes: `InsufficientData`
/// - exactly `period`: seed from the window (`prior` is ignored)
/// - more than `period` with `prior`: fold only the most recent change
/// - more than `period` without `prior`: replay the whole series
pub fn relative_strength_index(
    changes: &[f64],
    period: usize,
    prior: Option<WilderAverages>,
) -> Result<RsiReading, IndicatorError> {
    if period == 0 {
        return Err(IndicatorError::InvalidPeriod);
    }
    if changes.len() < period {
        return Err(IndicatorError::InsufficientData {
            required: period,
            available: changes.len(),
        });
    }
    if let Some(index) = changes.iter().position(|c| !c.is_finite()) {
        return Err(IndicatorError::NonFiniteInput { index });
    }

    let averages = if changes.len() == period {
        WilderAverages::seed(changes)
    } else if let Some(prev) = prior {
        prev.advance(changes[changes.len() - 1], period)
    } else {
        changes[period..]
            .iter()
            .fold(WilderAverages::seed(&changes[..period]), |avg, &ch| {
                avg.advance(ch, period)
            })
    };

    Ok(averages.into())
}

/// Push-style RSI state for one series.
///
/// Buffers the warm-up window, then folds each change with the recurrence.
/// Serializable so callers can persist it between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RsiState {
    period: usize,
    averages: Option<WilderAverages>,
    warmup: Vec<f64>,
    observations: usize,
}

impl RsiState {
    pub fn new(period: usize) -> Result<Self, IndicatorError> {
        if period == 0 {
            return Err(IndicatorError::InvalidPeriod);
        }
        Ok(Self {
            period,
            averages: None,
            warmup: Vec::with_capacity(period),
            observations: 0,
        })
    }

    /// Resume from averages computed elsewhere.
    pub fn resume(
        period: usize,
        averages: WilderAverages,
        observations: usize,
    ) -> Result<Self, IndicatorError> {
        let mut state = Self::new(period)?;
        state.averages = Some(averages);
        state.observations = observations.max(period);
        Ok(state)
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn observations(&self) -> usize {
        self.observations
    }

    pub fn averages(&self) -> Option<WilderAverages> {
        self.averages
    }

    pub fn is_warm(&self) -> bool {
        self.averages.is_some()
    }

    /// Fold one change. Returns `InsufficientData` until the warm-up
    /// window is full; a non-finite change is rejected and not counted.
    pub fn push(&mut self, change: f64) -> Result<RsiReading, IndicatorError> {
        if !change.is_finite() {
            return Err(IndicatorError::NonFiniteInput {
                index: self.observations,
            });
        }
        self.observations += 1;

        let next = match self.averages {
            Some(prev) => prev.advance(change, self.period),
            None => {
                self.warmup.push(change);
                if self.warmup.len() < self.period {
                    return Err(IndicatorError::InsufficientData {
                        required: self.period,
                        available: self.warmup.len(),
                    });
                }
                let seeded = WilderAverages::seed(&self.warmup);
                self.warmup.clear();
                seeded
            }
        };

        self.averages = Some(next);
        Ok(next.into())
    }
}
