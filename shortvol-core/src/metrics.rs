//! Derived per-day ratios.
//!
//! The feed carries short, short-exempt and total volume only. Everything
//! here divides by total volume, so a zero-volume row has no derived
//! metrics at all: `derive_metrics` returns `UndefinedRatio` and the record
//! keeps `metrics: None`.
//!
//! Short-volume percentage is `short / total * 100`. Buy volume is the
//! complement `total - short`, so the two percentages always sum to 100.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    pub short_volume_percent: f64,
    pub short_exempt_percent: f64,
    pub buy_volume: f64,
    pub buy_volume_percent: f64,
}

/// A ratio with total volume in the denominator was requested for a row
/// whose total volume is not positive.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("ratio undefined: total volume is {total_volume}")]
pub struct UndefinedRatio {
    pub total_volume: f64,
}

/// `part / whole * 100`, or `None` when `whole` is not positive.
pub fn percent_of(part: f64, whole: f64) -> Option<f64> {
    if whole > 0.0 {
        Some(part / whole * 100.0)
    } else {
        None
    }
}

/// Compute the derived ratios for one day's volumes.
pub fn derive_metrics(
    short_volume: f64,
    short_exempt_volume: f64,
    total_volume: f64,
) -> Result<DerivedMetrics, UndefinedRatio> {
    let undefined = UndefinedRatio { total_volume };
    let buy_volume = total_volume - short_volume;

    Ok(DerivedMetrics {
        short_volume_percent: percent_of(short_volume, total_volume).ok_or(undefined)?,
        short_exempt_percent: percent_of(short_exempt_volume, total_volume).ok_or(undefined)?,
        buy_volume,
        buy_volume_percent: percent_of(buy_volume, total_volume).ok_or(undefined)?,
    })
}
