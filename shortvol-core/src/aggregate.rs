//! Multi-day aggregation of daily records into per-symbol summaries.
//!
//! Each `SymbolSummary` owns a day-keyed map of records. The map is the
//! source of truth: every cumulative field is a sum over it (or a ratio of
//! such sums) and can be rebuilt with `SymbolSummary::from_days`.
//!
//! Short interest is estimated as the running sum of `short - buy` per day.
//! On a covering day (buy volume above half of total volume) the term is
//! negative and reduces the estimate; on a shorting day it adds to it. The
//! estimate is not floored at zero, so it does not depend on fold order.
//!
//! The aggregator does not detect duplicate ingestion. Folding the same
//! record twice double counts every running sum while the day map keeps
//! one entry; callers dedupe upstream. `Aggregator::finalize` always
//! rebuilds each summary from its in-range days, so finalized totals match
//! the day map whether or not duplicates were folded.

use crate::metrics::percent_of;
use crate::records::DailyRecord;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Day-key format for the per-symbol day map.
pub const DAY_KEY_FORMAT: &str = "%Y-%m-%d";

/// Share of total volume that buy volume must exceed for a covering day.
pub const COVERING_THRESHOLD: f64 = 0.5;

pub fn day_key(date: NaiveDate) -> String {
    date.format(DAY_KEY_FORMAT).to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("start date {start} is after end date {end}")]
    Inverted { start: NaiveDate, end: NaiveDate },

    #[error("trailing day count must be at least 1")]
    EmptyTrailingWindow,

    #[error("{days} days before {end} is outside the supported calendar")]
    OutOfRange { end: NaiveDate, days: u32 },
}

/// Inclusive calendar-date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, RangeError> {
        if start > end {
            return Err(RangeError::Inverted { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn single(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    /// The `days` calendar days ending at (and including) `end`.
    pub fn trailing(end: NaiveDate, days: u32) -> Result<Self, RangeError> {
        if days == 0 {
            return Err(RangeError::EmptyTrailingWindow);
        }
        let start = end
            .checked_sub_days(Days::new(u64::from(days) - 1))
            .ok_or(RangeError::OutOfRange { end, days })?;
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Every calendar day in the window, in order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }

    pub fn len_days(&self) -> usize {
        (self.end - self.start).num_days() as usize + 1
    }
}

/// Cumulative short-volume view of one symbol across ingested days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolSummary {
    pub symbol: String,
    pub days: BTreeMap<String, DailyRecord>,
    pub total_short_volume: f64,
    pub total_exempt_short_volume: f64,
    pub total_buy_volume: f64,
    pub total_volume: f64,
    /// Net short-interest estimate: sum of `short - buy` over ingested days.
    pub short_interest: f64,
    pub covering_days: usize,
    pub buy_volume_percent: Option<f64>,
    pub exempt_short_percent: Option<f64>,
    pub short_interest_percent: Option<f64>,
}

impl SymbolSummary {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            days: BTreeMap::new(),
            total_short_volume: 0.0,
            total_exempt_short_volume: 0.0,
            total_buy_volume: 0.0,
            total_volume: 0.0,
            short_interest: 0.0,
            covering_days: 0,
            buy_volume_percent: None,
            exempt_short_percent: None,
            short_interest_percent: None,
        }
    }

    /// Rebuild a summary by reducing over a set of day records.
    pub fn from_days(symbol: impl Into<String>, days: impl IntoIterator<Item = DailyRecord>) -> Self {
        let mut summary = Self::new(symbol);
        for record in days {
            summary.fold(record);
        }
        summary
    }

    /// Fold one day into the summary. All fields are updated together.
    fn fold(&mut self, record: DailyRecord) {
        let buy = record.buy_volume();
        let covering = is_covering_day(&record);

        self.total_short_volume += record.short_volume;
        self.total_exempt_short_volume += record.short_exempt_volume;
        self.total_buy_volume += buy;
        self.total_volume += record.total_volume;
        self.short_interest += short_interest_delta(&record);
        if covering {
            self.covering_days += 1;
        }
        self.days.insert(record.day_key(), record);

        self.buy_volume_percent = percent_of(self.total_buy_volume, self.total_volume);
        self.exempt_short_percent = percent_of(self.total_exempt_short_volume, self.total_volume);
        self.short_interest_percent = percent_of(self.short_interest, self.total_volume);
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        self.days.values().next().map(|r| r.trading_date)
    }

    pub fn last_day(&self) -> Option<NaiveDate> {
        self.days.values().next_back().map(|r| r.trading_date)
    }

    /// Rebuild from the in-range days only. `None` when no day is in range.
    fn restricted_to(self, range: &DateRange) -> Option<Self> {
        let in_range: Vec<DailyRecord> = self
            .days
            .into_values()
            .filter(|r| range.contains(r.trading_date))
            .collect();
        if in_range.is_empty() {
            return None;
        }
        Some(Self::from_days(self.symbol, in_range))
    }
}

/// Buy volume above `COVERING_THRESHOLD` of total volume.
pub fn is_covering_day(record: &DailyRecord) -> bool {
    match record.metrics {
        Some(m) => m.buy_volume > record.total_volume * COVERING_THRESHOLD,
        None => false,
    }
}

/// Signed change to the short-interest estimate for one day.
///
/// Covering days yield `-(buy - short)`, shorting days `short - buy`.
/// Days without defined metrics contribute nothing.
pub fn short_interest_delta(record: &DailyRecord) -> f64 {
    match record.metrics {
        Some(m) => record.short_volume - m.buy_volume,
        None => 0.0,
    }
}

/// Single-owner fold of daily records into per-symbol summaries.
#[derive(Debug, Default)]
pub struct Aggregator {
    summaries: BTreeMap<String, SymbolSummary>,
    records_ingested: usize,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one record into its symbol's summary, creating it on first sight.
    pub fn ingest(&mut self, record: DailyRecord) {
        self.summaries
            .entry(record.symbol.clone())
            .or_insert_with(|| SymbolSummary::new(record.symbol.clone()))
            .fold(record);
        self.records_ingested += 1;
    }

    /// Fold a day's batch. Returns the number of records folded.
    pub fn ingest_batch(&mut self, records: impl IntoIterator<Item = DailyRecord>) -> usize {
        let mut n = 0;
        for record in records {
            self.ingest(record);
            n += 1;
        }
        n
    }

    pub fn get(&self, symbol: &str) -> Option<&SymbolSummary> {
        self.summaries.get(symbol)
    }

    /// Number of symbols seen so far.
    pub fn len(&self) -> usize {
        self.summaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }

    pub fn records_ingested(&self) -> usize {
        self.records_ingested
    }

    /// Completed summaries for symbols with at least one day inside `range`,
    /// sorted by symbol. Each summary is reduced from its in-range days, so
    /// out-of-range days and duplicate folds do not reach the totals.
    pub fn finalize(self, range: &DateRange) -> Vec<SymbolSummary> {
        self.summaries
            .into_values()
            .filter_map(|s| s.restricted_to(range))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 1, d).unwrap()
    }

    fn rec(symbol: &str, d: u32, short: f64, exempt: f64, total: f64) -> DailyRecord {
        DailyRecord::new(symbol, date(d), short, exempt, total, vec!["N".into()])
    }

    #[test]
    fn first_sighting_creates_summary() {
        let mut agg = Aggregator::new();
        assert!(agg.is_empty());
        agg.ingest(rec("AAA", 18, 100.0, 20.0, 400.0));
        assert_eq!(agg.len(), 1);

        let s = agg.get("AAA").unwrap();
        assert_eq!(s.days.len(), 1);
        assert!(s.days.contains_key("2022-01-18"));
        assert_eq!(s.total_short_volume, 100.0);
        assert_eq!(s.total_buy_volume, 300.0);
        assert_eq!(s.buy_volume_percent, Some(75.0));
        assert_eq!(s.exempt_short_percent, Some(5.0));
    }

    #[test]
    fn covering_day_reduces_short_interest() {
        let mut agg = Aggregator::new();
        // shorting day: short 700 of 1000 → +400
        agg.ingest(rec("AAA", 18, 700.0, 0.0, 1000.0));
        assert_eq!(agg.get("AAA").unwrap().short_interest, 400.0);

        // covering day: buy 900 of 1000 → -(900 - 100) = -800
        agg.ingest(rec("AAA", 19, 100.0, 0.0, 1000.0));
        let s = agg.get("AAA").unwrap();
        assert_eq!(s.short_interest, -400.0);
        assert_eq!(s.covering_days, 1);
        assert_eq!(s.short_interest_percent, Some(-20.0));
    }

    #[test]
    fn balanced_day_is_not_covering() {
        let r = rec("AAA", 18, 500.0, 0.0, 1000.0);
        assert!(!is_covering_day(&r));
        assert_eq!(short_interest_delta(&r), 0.0);
    }

    #[test]
    fn zero_volume_day_contributes_nothing() {
        let mut agg = Aggregator::new();
        agg.ingest(rec("HALT", 18, 0.0, 0.0, 0.0));
        let s = agg.get("HALT").unwrap();
        assert_eq!(s.days.len(), 1);
        assert_eq!(s.short_interest, 0.0);
        assert_eq!(s.buy_volume_percent, None);
    }

    #[test]
    fn duplicate_ingestion_double_counts() {
        let mut agg = Aggregator::new();
        let r = rec("AAA", 18, 100.0, 20.0, 400.0);
        agg.ingest(r.clone());
        agg.ingest(r);

        let s = agg.get("AAA").unwrap();
        assert_eq!(s.days.len(), 1);
        assert_eq!(s.total_short_volume, 200.0);
        assert_eq!(s.total_exempt_short_volume, 40.0);
        assert_eq!(s.total_volume, 800.0);
        assert_eq!(s.total_buy_volume, 600.0);
        assert_eq!(agg.records_ingested(), 2);
    }

    #[test]
    fn finalize_restricts_to_range() {
        let mut agg = Aggregator::new();
        agg.ingest_batch([
            rec("AAA", 17, 100.0, 0.0, 400.0),
            rec("AAA", 18, 200.0, 0.0, 400.0),
            rec("BBB", 10, 50.0, 0.0, 100.0),
        ]);

        let range = DateRange::new(date(18), date(20)).unwrap();
        let out = agg.finalize(&range);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].symbol, "AAA");
        assert_eq!(out[0].days.len(), 1);
        assert_eq!(out[0].total_short_volume, 200.0);
        assert_eq!(out[0].first_day(), Some(date(18)));
    }

    #[test]
    fn finalize_totals_follow_day_map() {
        let dup = rec("AAA", 18, 100.0, 20.0, 400.0);
        let range = DateRange::single(date(18));

        let mut only_in_range = Aggregator::new();
        only_in_range.ingest_batch([dup.clone(), dup.clone()]);
        let mut with_outside_day = Aggregator::new();
        with_outside_day.ingest_batch([dup.clone(), dup, rec("AAA", 10, 7.0, 0.0, 9.0)]);

        let a = only_in_range.finalize(&range);
        let b = with_outside_day.finalize(&range);
        assert_eq!(a, b);
        assert_eq!(a[0].days.len(), 1);
        assert_eq!(a[0].total_short_volume, 100.0);
        assert_eq!(a[0].total_buy_volume, 300.0);
    }

    #[test]
    fn finalize_sorts_by_symbol() {
        let mut agg = Aggregator::new();
        agg.ingest_batch([
            rec("ZZZ", 18, 1.0, 0.0, 2.0),
            rec("AAA", 18, 1.0, 0.0, 2.0),
            rec("MMM", 18, 1.0, 0.0, 2.0),
        ]);
        let symbols: Vec<String> = agg
            .finalize(&DateRange::single(date(18)))
            .into_iter()
            .map(|s| s.symbol)
            .collect();
        assert_eq!(symbols, vec!["AAA", "MMM", "ZZZ"]);
    }

    #[test]
    fn incremental_fold_matches_reduction() {
        let days = vec![
            rec("AAA", 18, 100.0, 20.0, 400.0),
            rec("AAA", 19, 900.0, 10.0, 1000.0),
            rec("AAA", 20, 50.0, 0.0, 500.0),
        ];
        let mut agg = Aggregator::new();
        agg.ingest_batch(days.iter().rev().cloned());

        let rebuilt = SymbolSummary::from_days("AAA", days);
        assert_eq!(agg.get("AAA").unwrap(), &rebuilt);
    }

    #[test]
    fn range_validation() {
        assert!(matches!(
            DateRange::new(date(20), date(18)),
            Err(RangeError::Inverted { .. })
        ));
        assert_eq!(
            DateRange::trailing(date(20), 0),
            Err(RangeError::EmptyTrailingWindow)
        );
        assert_eq!(
            DateRange::trailing(date(20), 200_000_000),
            Err(RangeError::OutOfRange {
                end: date(20),
                days: 200_000_000
            })
        );
        let r = DateRange::trailing(date(20), 3).unwrap();
        assert_eq!(r.start(), date(18));
        assert_eq!(r.len_days(), 3);
        assert_eq!(r.days().collect::<Vec<_>>(), vec![date(18), date(19), date(20)]);
    }
}
