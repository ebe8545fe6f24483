//! Integration tests for concurrent range ingestion, driven by an in-memory
//! feed that records which dates were requested.

use chrono::NaiveDate;
use proptest::prelude::*;
use shortvol_core::{DateRange, DayError, FeedSource, FetchError, ParserConfig};
use shortvol_runner::{
    ingest_range, CancelToken, DayOutcome, PipelineConfig, RangeDocument, RangeProgress,
    RangeReport, ShortVolConfig, TracingProgress,
};
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

struct FixtureFeed {
    files: HashMap<NaiveDate, String>,
    requested: Mutex<Vec<NaiveDate>>,
    cancel_on_fetch: Option<CancelToken>,
}

impl FixtureFeed {
    fn new(files: HashMap<NaiveDate, String>) -> Self {
        Self {
            files,
            requested: Mutex::new(Vec::new()),
            cancel_on_fetch: None,
        }
    }

    fn requested(&self) -> Vec<NaiveDate> {
        let mut dates = self.requested.lock().unwrap().clone();
        dates.sort();
        dates
    }
}

impl FeedSource for FixtureFeed {
    fn name(&self) -> &str {
        "fixture"
    }

    fn fetch(&self, date: NaiveDate) -> Result<Vec<u8>, FetchError> {
        self.requested.lock().unwrap().push(date);
        if let Some(token) = &self.cancel_on_fetch {
            token.cancel();
        }
        match date.format("%d").to_string().as_str() {
            "21" => Err(FetchError::HttpStatus { date, status: 503 }),
            _ => self
                .files
                .get(&date)
                .map(|s| s.clone().into_bytes())
                .ok_or(FetchError::NoDataForDate { date }),
        }
    }
}

#[derive(Default)]
struct CountingProgress {
    started: AtomicUsize,
    completed: AtomicUsize,
    finished: AtomicUsize,
}

impl RangeProgress for CountingProgress {
    fn on_day_start(&self, _date: NaiveDate, _index: usize, _total: usize) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn on_day_complete(&self, _outcome: &DayOutcome) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_range_complete(&self, _report: &RangeReport) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2022, 1, d).unwrap()
}

/// 2022-01-14 (Fri) through 2022-01-21 (Fri).
///
/// 15/16 are a weekend, 17 is a market holiday with no file, 20 is
/// malformed, 21 answers with a server error.
fn fixture() -> FixtureFeed {
    let mut files = HashMap::new();
    files.insert(
        date(14),
        "Date|Symbol|ShortVolume|ShortExemptVolume|TotalVolume|Market\n\
         20220114|AAA|300|0|400|N\n\
         20220114|ZZZ|0|0|0|N\n\
         1\n"
            .to_string(),
    );
    files.insert(
        date(18),
        "Date|Symbol|ShortVolume|ShortExemptVolume|TotalVolume|Market\n\
         20220118|AAA|100|20|400|B,Q,N\n\
         20220118|BBB|800|0|1000|N\n\
         2\n"
            .to_string(),
    );
    files.insert(
        date(19),
        "Symbol|Market|TotalVolume|ShortExemptVolume|ShortVolume|Date\n\
         AAA|Q|1000|10|700|20220119\n\
         1\n"
            .to_string(),
    );
    files.insert(
        date(20),
        "Date|Symbol|ShortVolume\n20220120|AAA|1\n1\n".to_string(),
    );
    FixtureFeed::new(files)
}

fn pipeline(workers: usize) -> PipelineConfig {
    PipelineConfig {
        workers,
        queue_depth: 2,
        skip_weekends: true,
    }
}

fn run(feed: &FixtureFeed, workers: usize, range: &DateRange) -> RangeReport {
    ingest_range(
        feed,
        &ParserConfig::default(),
        &pipeline(workers),
        range,
        &CancelToken::new(),
        &TracingProgress,
    )
    .unwrap()
}

#[test]
fn range_isolates_failures_per_date() {
    let feed = fixture();
    let range = DateRange::new(date(14), date(21)).unwrap();
    let report = run(&feed, 4, &range);

    assert_eq!(report.days_ingested, vec![date(14), date(18), date(19)]);
    assert_eq!(report.days_skipped, vec![date(15), date(16), date(17)]);
    assert_eq!(report.failures.len(), 2);
    assert_eq!(report.failures[0].0, date(20));
    assert!(matches!(report.failures[0].1, DayError::Parse(_)));
    assert_eq!(report.failures[1].0, date(21));
    assert!(matches!(
        report.failures[1].1,
        DayError::Fetch(FetchError::HttpStatus { status: 503, .. })
    ));
    assert!(!report.all_succeeded());
    assert!(!report.cancelled);
    assert_eq!(report.days_not_attempted, 0);
    assert_eq!(report.records_ingested, 5);

    let symbols: Vec<&str> = report.summaries.iter().map(|s| s.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["AAA", "BBB", "ZZZ"]);

    let aaa = &report.summaries[0];
    assert_eq!(aaa.days.len(), 3);
    assert_eq!(aaa.total_short_volume, 1100.0);
    assert_eq!(aaa.total_volume, 1800.0);
    // 14th: 300 - 100 = 200; 18th: -200 (covering); 19th: 400
    assert_eq!(aaa.short_interest, 400.0);
    assert_eq!(aaa.covering_days, 1);

    let zzz = &report.summaries[2];
    assert_eq!(zzz.total_volume, 0.0);
    assert_eq!(zzz.buy_volume_percent, None);
    assert!(zzz.days["2022-01-14"].metrics.is_none());
}

#[test]
fn weekends_are_never_requested() {
    let feed = fixture();
    let range = DateRange::new(date(14), date(18)).unwrap();
    run(&feed, 2, &range);

    assert_eq!(feed.requested(), vec![date(14), date(17), date(18)]);
}

#[test]
fn weekends_requested_when_skip_disabled() {
    let feed = fixture();
    let range = DateRange::new(date(14), date(18)).unwrap();
    let config = PipelineConfig {
        skip_weekends: false,
        ..pipeline(2)
    };
    let report = ingest_range(
        &feed,
        &ParserConfig::default(),
        &config,
        &range,
        &CancelToken::new(),
        &TracingProgress,
    )
    .unwrap();

    assert_eq!(feed.requested().len(), 5);
    // no file for the weekend either way
    assert_eq!(report.days_skipped, vec![date(15), date(16), date(17)]);
}

#[test]
fn worker_count_does_not_change_summaries() {
    let range = DateRange::new(date(14), date(21)).unwrap();
    let serial = run(&fixture(), 1, &range);
    let parallel = run(&fixture(), 4, &range);

    assert_eq!(serial.summaries, parallel.summaries);
    assert_eq!(serial.days_ingested, parallel.days_ingested);
    assert_eq!(serial.days_skipped, parallel.days_skipped);
}

#[test]
fn progress_sees_every_attempted_date() {
    let feed = fixture();
    let range = DateRange::new(date(14), date(21)).unwrap();
    let progress = CountingProgress::default();
    ingest_range(
        &feed,
        &ParserConfig::default(),
        &pipeline(3),
        &range,
        &CancelToken::new(),
        &progress,
    )
    .unwrap();

    // 8 calendar days, 2 weekend days never fetched
    assert_eq!(progress.started.load(Ordering::SeqCst), 6);
    assert_eq!(progress.completed.load(Ordering::SeqCst), 6);
    assert_eq!(progress.finished.load(Ordering::SeqCst), 1);
}

#[test]
fn cancel_before_start_fetches_nothing() {
    let feed = fixture();
    let range = DateRange::new(date(14), date(21)).unwrap();
    let cancel = CancelToken::new();
    cancel.cancel();

    let report = ingest_range(
        &feed,
        &ParserConfig::default(),
        &pipeline(4),
        &range,
        &cancel,
        &TracingProgress,
    )
    .unwrap();

    assert!(feed.requested().is_empty());
    assert!(report.cancelled);
    assert_eq!(report.days_not_attempted, 6);
    assert!(report.summaries.is_empty());
    assert!(report.days_ingested.is_empty());
}

#[test]
fn cancel_mid_range_stops_new_fetches() {
    let cancel = CancelToken::new();
    let mut feed = fixture();
    feed.cancel_on_fetch = Some(cancel.clone());
    let range = DateRange::new(date(14), date(21)).unwrap();

    let report = ingest_range(
        &feed,
        &ParserConfig::default(),
        &pipeline(1),
        &range,
        &cancel,
        &TracingProgress,
    )
    .unwrap();

    // single worker: the first fetch cancels, the rest are never started
    assert_eq!(feed.requested().len(), 1);
    assert!(report.cancelled);
    assert_eq!(report.days_not_attempted, 5);
    assert!(!report.all_succeeded());
}

#[test]
fn single_day_range_reports_one_day() {
    let feed = fixture();
    let range = DateRange::single(date(19));
    let report = run(&feed, 4, &range);

    assert_eq!(report.days_ingested, vec![date(19)]);
    assert!(report.all_succeeded());
    assert_eq!(report.summaries.len(), 1);
    assert_eq!(report.summaries[0].total_buy_volume, 300.0);

    let doc = RangeDocument::new(&report, false, |_| true);
    let json: serde_json::Value = serde_json::from_str(&doc.to_json().unwrap()).unwrap();
    assert_eq!(json["summaries"][0]["symbol"], "AAA");
    assert_eq!(json["summaries"][0]["short_interest"], 400.0);
}

#[test]
fn config_file_drives_pipeline_settings() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "[pipeline]\nworkers = 2\nqueue_depth = 1\n\n[parser]\nfooter_lines = 1\n"
    )
    .unwrap();

    let config = ShortVolConfig::from_file(file.path()).unwrap();
    assert_eq!(config.pipeline.workers, 2);
    assert_eq!(config.pipeline.queue_depth, 1);

    let feed = fixture();
    let range = DateRange::new(date(18), date(19)).unwrap();
    let report = ingest_range(
        &feed,
        &config.parser,
        &config.pipeline,
        &range,
        &CancelToken::new(),
        &TracingProgress,
    )
    .unwrap();
    assert_eq!(report.days_ingested, vec![date(18), date(19)]);
}

#[test]
fn missing_config_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = ShortVolConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, shortvol_runner::ConfigError::Io { .. }));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Pool size and queue depth only change scheduling, never the result.
    #[test]
    fn scheduling_does_not_change_report(workers in 1usize..6, queue_depth in 1usize..4) {
        let range = DateRange::new(date(14), date(21)).unwrap();
        let baseline = run(&fixture(), 1, &range);

        let config = PipelineConfig { workers, queue_depth, skip_weekends: true };
        let report = ingest_range(
            &fixture(),
            &ParserConfig::default(),
            &config,
            &range,
            &CancelToken::new(),
            &TracingProgress,
        )
        .unwrap();

        prop_assert_eq!(&report.summaries, &baseline.summaries);
        prop_assert_eq!(&report.days_ingested, &baseline.days_ingested);
        prop_assert_eq!(&report.days_skipped, &baseline.days_skipped);
        prop_assert_eq!(report.failures.len(), baseline.failures.len());
    }
}
