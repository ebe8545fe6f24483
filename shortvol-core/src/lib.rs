//! Short-volume core: feed retrieval, record parsing, derived metrics,
//! multi-day aggregation, and incremental indicators.
//!
//! Pipeline for one trading day:
//! - `feed` fetches the raw payload for a calendar date
//! - `records` resolves the header layout and parses per-symbol rows
//! - `metrics` fills in the ratios the feed does not carry
//! - `aggregate` folds records into running per-symbol summaries
//!
//! `indicators` is independent of the feed: SMA and Wilder RSI over a
//! caller-threaded state.

pub mod aggregate;
pub mod error;
pub mod feed;
pub mod indicators;
pub mod metrics;
pub mod records;

pub use aggregate::{day_key, Aggregator, DateRange, RangeError, SymbolSummary};
pub use error::DayError;
pub use feed::{feed_url, FeedConfig, FeedSource, FetchError, HttpFeed};
pub use metrics::{derive_metrics, percent_of, DerivedMetrics, UndefinedRatio};
pub use records::{parse_records, ColumnMap, DailyRecord, ParserConfig, RecordParseError};
