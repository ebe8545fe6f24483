//! Per-period price movement helpers feeding the RSI engine.

use serde::{Deserialize, Serialize};

/// One period's OHLC prices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    /// Absolute gain or loss over the period.
    pub fn change(&self) -> f64 {
        self.close - self.open
    }

    /// Percentage gain or loss relative to the open. `None` for a zero open.
    pub fn percent_change(&self) -> Option<f64> {
        if self.open == 0.0 {
            None
        } else {
            Some(self.change() / self.open * 100.0)
        }
    }
}

/// Consecutive differences of a price series (`n` prices → `n - 1` changes).
pub fn price_changes(prices: &[f64]) -> Vec<f64> {
    prices.windows(2).map(|w| w[1] - w[0]).collect()
}
