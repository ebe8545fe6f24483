//! Concurrent date-range ingestion.
//!
//! Fetch and parse run per date on a private rayon pool. Parsed day batches
//! travel through a bounded channel to the calling thread, which is the only
//! owner of the `Aggregator`, so summaries are mutated by a single writer
//! and need no locks.
//!
//! Per-date failures are isolated: a missing file is counted as skipped, a
//! transport or parse failure is recorded and the range carries on.
//! Cancelling stops new fetches; batches already queued are still folded.

use crate::config::PipelineConfig;
use chrono::{Datelike, NaiveDate, Weekday};
use shortvol_core::{
    parse_records, Aggregator, DailyRecord, DateRange, DayError, FeedSource, ParserConfig,
    SymbolSummary,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::sync_channel;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Shared cancellation flag for an in-flight range request.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of fetching and parsing one date.
#[derive(Debug)]
pub struct DayOutcome {
    pub date: NaiveDate,
    pub result: Result<Vec<DailyRecord>, DayError>,
}

/// Progress callbacks for a range run.
pub trait RangeProgress: Send + Sync {
    /// Called on a worker thread before a date is fetched.
    fn on_day_start(&self, date: NaiveDate, index: usize, total: usize);

    /// Called on the aggregating thread when a date's outcome arrives.
    fn on_day_complete(&self, outcome: &DayOutcome);

    /// Called once the range is drained.
    fn on_range_complete(&self, report: &RangeReport);
}

/// Progress reporter that writes structured `tracing` events.
pub struct TracingProgress;

impl RangeProgress for TracingProgress {
    fn on_day_start(&self, date: NaiveDate, index: usize, total: usize) {
        tracing::debug!(%date, "[{}/{}] fetching", index + 1, total);
    }

    fn on_day_complete(&self, outcome: &DayOutcome) {
        let date = outcome.date;
        match &outcome.result {
            Ok(records) => tracing::info!(%date, records = records.len(), "day ingested"),
            Err(e) if e.is_skippable() => tracing::info!(%date, "no data, skipping"),
            Err(e) => tracing::warn!(%date, error = %e, "day failed"),
        }
    }

    fn on_range_complete(&self, report: &RangeReport) {
        tracing::info!(
            start = %report.range.start(),
            end = %report.range.end(),
            ingested = report.days_ingested.len(),
            skipped = report.days_skipped.len(),
            failed = report.failures.len(),
            symbols = report.summaries.len(),
            cancelled = report.cancelled,
            "range complete"
        );
    }
}

/// Outcome of a range run.
#[derive(Debug)]
pub struct RangeReport {
    pub range: DateRange,
    pub summaries: Vec<SymbolSummary>,
    pub days_ingested: Vec<NaiveDate>,
    /// Weekends and dates with no published file.
    pub days_skipped: Vec<NaiveDate>,
    pub failures: Vec<(NaiveDate, DayError)>,
    pub records_ingested: usize,
    /// Dates never fetched because the run was cancelled.
    pub days_not_attempted: usize,
    pub cancelled: bool,
}

impl RangeReport {
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

/// Fetch and parse one date.
pub fn fetch_day(
    source: &dyn FeedSource,
    parser: &ParserConfig,
    date: NaiveDate,
) -> Result<Vec<DailyRecord>, DayError> {
    let payload = source.fetch(date)?;
    Ok(parse_records(&payload, parser)?)
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Ingest every date in `range` and aggregate the records per symbol.
pub fn ingest_range(
    source: &dyn FeedSource,
    parser: &ParserConfig,
    pipeline: &PipelineConfig,
    range: &DateRange,
    cancel: &CancelToken,
    progress: &dyn RangeProgress,
) -> Result<RangeReport, PipelineError> {
    let (dates, mut days_skipped): (Vec<NaiveDate>, Vec<NaiveDate>) = range
        .days()
        .partition(|d| !(pipeline.skip_weekends && is_weekend(*d)));
    let total = dates.len();

    tracing::info!(
        source = source.name(),
        start = %range.start(),
        end = %range.end(),
        dates = total,
        workers = pipeline.workers,
        "starting range ingestion"
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(pipeline.workers.max(1))
        .thread_name(|i| format!("shortvol-fetch-{i}"))
        .build()?;

    let mut aggregator = Aggregator::new();
    let mut days_ingested = Vec::new();
    let mut failures = Vec::new();
    let mut received = 0;

    let (tx, rx) = sync_channel::<DayOutcome>(pipeline.queue_depth.max(1));

    pool.in_place_scope(|scope| {
        for (index, &date) in dates.iter().enumerate() {
            let tx = tx.clone();
            scope.spawn(move |_| {
                if cancel.is_cancelled() {
                    return;
                }
                progress.on_day_start(date, index, total);
                let result = fetch_day(source, parser, date);
                // The receiver outlives the scope; send only fails if it panicked.
                let _ = tx.send(DayOutcome { date, result });
            });
        }
        drop(tx);

        for outcome in rx {
            received += 1;
            progress.on_day_complete(&outcome);
            match outcome.result {
                Ok(records) => {
                    aggregator.ingest_batch(records);
                    days_ingested.push(outcome.date);
                }
                Err(e) if e.is_skippable() => days_skipped.push(outcome.date),
                Err(e) => failures.push((outcome.date, e)),
            }
        }
    });

    days_ingested.sort();
    days_skipped.sort();
    failures.sort_by_key(|(date, _)| *date);

    let records_ingested = aggregator.records_ingested();
    let report = RangeReport {
        range: *range,
        summaries: aggregator.finalize(range),
        days_ingested,
        days_skipped,
        failures,
        records_ingested,
        days_not_attempted: total - received,
        cancelled: cancel.is_cancelled(),
    };
    progress.on_range_complete(&report);
    Ok(report)
}
