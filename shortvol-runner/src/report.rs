//! Range report export: JSON document and fixed-width table.

use crate::pipeline::RangeReport;
use chrono::NaiveDate;
use serde::Serialize;
use shortvol_core::SymbolSummary;
use std::fmt::Write as _;

/// Flat per-symbol row without the day map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub symbol: String,
    pub days: usize,
    pub first_day: Option<NaiveDate>,
    pub last_day: Option<NaiveDate>,
    pub total_short_volume: f64,
    pub total_exempt_short_volume: f64,
    pub total_buy_volume: f64,
    pub total_volume: f64,
    pub short_interest: f64,
    pub covering_days: usize,
    pub buy_volume_percent: Option<f64>,
    pub exempt_short_percent: Option<f64>,
    pub short_interest_percent: Option<f64>,
}

impl From<&SymbolSummary> for SummaryRow {
    fn from(s: &SymbolSummary) -> Self {
        Self {
            symbol: s.symbol.clone(),
            days: s.days.len(),
            first_day: s.first_day(),
            last_day: s.last_day(),
            total_short_volume: s.total_short_volume,
            total_exempt_short_volume: s.total_exempt_short_volume,
            total_buy_volume: s.total_buy_volume,
            total_volume: s.total_volume,
            short_interest: s.short_interest,
            covering_days: s.covering_days,
            buy_volume_percent: s.buy_volume_percent,
            exempt_short_percent: s.exempt_short_percent,
            short_interest_percent: s.short_interest_percent,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FailureRow {
    pub date: NaiveDate,
    pub error: String,
}

/// Serializable view of a `RangeReport`.
#[derive(Debug, Serialize)]
pub struct RangeDocument<'a> {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days_ingested: &'a [NaiveDate],
    pub days_skipped: &'a [NaiveDate],
    pub failures: Vec<FailureRow>,
    pub records_ingested: usize,
    pub cancelled: bool,
    pub summaries: Vec<SummaryRow>,
    /// Full per-day detail, only when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Vec<&'a SymbolSummary>>,
}

impl<'a> RangeDocument<'a> {
    /// Build a document, keeping only symbols accepted by `filter`.
    pub fn new(
        report: &'a RangeReport,
        include_days: bool,
        filter: impl Fn(&SymbolSummary) -> bool,
    ) -> Self {
        let selected: Vec<&SymbolSummary> = report.summaries.iter().filter(|s| filter(*s)).collect();
        Self {
            start: report.range.start(),
            end: report.range.end(),
            days_ingested: &report.days_ingested,
            days_skipped: &report.days_skipped,
            failures: report
                .failures
                .iter()
                .map(|(date, e)| FailureRow {
                    date: *date,
                    error: e.to_string(),
                })
                .collect(),
            records_ingested: report.records_ingested,
            cancelled: report.cancelled,
            summaries: selected.iter().map(|s| SummaryRow::from(*s)).collect(),
            detail: include_days.then_some(selected),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn fmt_pct(v: Option<f64>) -> String {
    v.map(|p| format!("{p:.2}%")).unwrap_or_else(|| "n/a".into())
}

/// Render summary rows as a fixed-width table.
pub fn render_table(rows: &[SummaryRow]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<8} {:>4} {:>14} {:>12} {:>14} {:>14} {:>15} {:>8} {:>8}",
        "Symbol", "Days", "Short Vol", "Exempt", "Buy Vol", "Total Vol", "Short Int", "Buy %", "SI %"
    );
    let _ = writeln!(out, "{}", "-".repeat(105));
    for r in rows {
        let _ = writeln!(
            out,
            "{:<8} {:>4} {:>14.0} {:>12.0} {:>14.0} {:>14.0} {:>15.0} {:>8} {:>8}",
            r.symbol,
            r.days,
            r.total_short_volume,
            r.total_exempt_short_volume,
            r.total_buy_volume,
            r.total_volume,
            r.short_interest,
            fmt_pct(r.buy_volume_percent),
            fmt_pct(r.short_interest_percent),
        );
    }
    out
}
