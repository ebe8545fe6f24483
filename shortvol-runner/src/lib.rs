//! Short-volume runner: configuration, concurrent range ingestion, and
//! report export.
//!
//! This crate builds on `shortvol-core` to provide:
//! - TOML configuration with per-section defaults
//! - Date-range ingestion on a private worker pool with a single aggregating thread
//! - Cancellation and progress callbacks for long ranges
//! - JSON and table rendering of range reports

pub mod config;
pub mod pipeline;
pub mod report;

pub use config::{ConfigError, IndicatorConfig, PipelineConfig, ShortVolConfig};
pub use pipeline::{
    fetch_day, ingest_range, is_weekend, CancelToken, DayOutcome, PipelineError, RangeProgress,
    RangeReport, TracingProgress,
};
pub use report::{render_table, FailureRow, RangeDocument, SummaryRow};
