//! Daily record parsing.
//!
//! A feed payload is a delimited text file: one header line naming the
//! columns, one row per symbol, and a trailer (record count) at the end.
//! Column order differs between feed versions, so every row is addressed
//! by column name through a `ColumnMap` built from the header.
//!
//! The `Market` column may hold several venue codes joined by the venue
//! separator. When the venue separator differs from the field delimiter it
//! is escaped to a sentinel before the `csv` reader splits fields, then
//! split back out of the market field. When the two are the same character
//! the extra venues arrive as surplus fields, which are folded back into
//! `Market` only if it is the last column.
//!
//! Any malformed row fails the whole payload. There is no partial recovery.

use crate::metrics::{derive_metrics, DerivedMetrics};
use chrono::NaiveDate;
use csv::{StringRecord, Terminator, Trim};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Stand-in for an intra-field venue separator while fields are split.
const VENUE_SENTINEL: char = '\u{1f}';

pub const COL_DATE: &str = "Date";
pub const COL_SYMBOL: &str = "Symbol";
pub const COL_SHORT_VOLUME: &str = "ShortVolume";
pub const COL_SHORT_EXEMPT_VOLUME: &str = "ShortExemptVolume";
pub const COL_TOTAL_VOLUME: &str = "TotalVolume";
pub const COL_MARKET: &str = "Market";

/// One symbol, one trading day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub symbol: String,
    pub trading_date: NaiveDate,
    pub short_volume: f64,
    pub short_exempt_volume: f64,
    pub total_volume: f64,
    /// Reporting venue codes, in feed order.
    pub market: Vec<String>,
    /// `None` when total volume is zero and no ratio is defined.
    pub metrics: Option<DerivedMetrics>,
}

impl DailyRecord {
    /// Build a record from raw volumes with derived metrics populated.
    pub fn new(
        symbol: impl Into<String>,
        trading_date: NaiveDate,
        short_volume: f64,
        short_exempt_volume: f64,
        total_volume: f64,
        market: Vec<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            trading_date,
            short_volume,
            short_exempt_volume,
            total_volume,
            market,
            metrics: None,
        }
        .with_metrics()
    }

    /// Populate derived metrics from the raw volumes.
    pub fn with_metrics(mut self) -> Self {
        self.metrics =
            derive_metrics(self.short_volume, self.short_exempt_volume, self.total_volume).ok();
        self
    }

    /// Canonical day key used by the aggregator.
    pub fn day_key(&self) -> String {
        crate::aggregate::day_key(self.trading_date)
    }

    /// Buy volume, or zero when the day has no defined metrics.
    pub fn buy_volume(&self) -> f64 {
        self.metrics.map(|m| m.buy_volume).unwrap_or(0.0)
    }
}

/// Parser settings for one feed version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Field delimiter. `None` detects it from the header: `|` if the
    /// header contains one, otherwise `,`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_delimiter: Option<char>,
    /// Separator between venue codes inside the `Market` field.
    pub venue_separator: char,
    /// Trailer lines at the end of the file that are not data rows.
    pub footer_lines: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            field_delimiter: None,
            venue_separator: ',',
            footer_lines: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordParseError {
    #[error("payload has no header line")]
    EmptyPayload,

    #[error("header is missing required column '{column}'")]
    MissingColumn { column: String },

    #[error("line {line}: expected {expected} fields, found {found}")]
    ShortRow {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: invalid trade date '{value}'")]
    InvalidDate { line: usize, value: String },

    #[error("line {line}: invalid {column} '{value}'")]
    InvalidNumber {
        line: usize,
        column: String,
        value: String,
    },

    #[error("line {line}: negative {column}")]
    NegativeVolume { line: usize, column: String },

    #[error("line {line}: expected {expected} fields, found {found}")]
    LongRow {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: empty symbol")]
    EmptySymbol { line: usize },

    #[error("field delimiter {delimiter:?} must be a single ASCII character")]
    UnsupportedDelimiter { delimiter: char },

    #[error("line {line}: unreadable row: {reason}")]
    Reader { line: usize, reason: String },
}

/// Column name to index mapping read from a header record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    indices: HashMap<String, usize>,
    width: usize,
}

impl ColumnMap {
    pub fn from_headers(headers: &StringRecord) -> Self {
        let indices = headers
            .iter()
            .map(clean_field)
            .enumerate()
            .filter(|(_, name)| !name.is_empty())
            .map(|(i, name)| (name.to_string(), i))
            .collect();

        Self {
            indices,
            width: headers.len(),
        }
    }

    pub fn get(&self, column: &str) -> Option<usize> {
        self.indices.get(column).copied()
    }

    /// Number of fields in the header.
    pub fn width(&self) -> usize {
        self.width
    }

    fn require(&self, column: &str) -> Result<usize, RecordParseError> {
        self.get(column).ok_or_else(|| RecordParseError::MissingColumn {
            column: column.to_string(),
        })
    }
}

/// Resolved positions of the required columns.
#[derive(Debug, Clone, Copy)]
struct Layout {
    date: usize,
    symbol: usize,
    short_volume: usize,
    short_exempt_volume: usize,
    total_volume: usize,
    market: usize,
    width: usize,
    /// Venue separator equals the field delimiter, so extra venues arrive
    /// as extra fields after `Market`.
    venues_split_as_fields: bool,
}

impl Layout {
    fn resolve(columns: &ColumnMap, venues_split_as_fields: bool) -> Result<Self, RecordParseError> {
        Ok(Self {
            date: columns.require(COL_DATE)?,
            symbol: columns.require(COL_SYMBOL)?,
            short_volume: columns.require(COL_SHORT_VOLUME)?,
            short_exempt_volume: columns.require(COL_SHORT_EXEMPT_VOLUME)?,
            total_volume: columns.require(COL_TOTAL_VOLUME)?,
            market: columns.require(COL_MARKET)?,
            width: columns.width(),
            venues_split_as_fields,
        })
    }

    /// Surplus fields can only be folded into `Market` when it is the last column.
    fn accepts_surplus(&self) -> bool {
        self.venues_split_as_fields && self.market + 1 == self.width
    }
}

/// Parse one feed payload into daily records with derived metrics.
pub fn parse_records(
    payload: &[u8],
    config: &ParserConfig,
) -> Result<Vec<DailyRecord>, RecordParseError> {
    let text = String::from_utf8_lossy(payload);

    let header_line = text
        .split('\n')
        .find(|l| !clean_field(l).is_empty())
        .ok_or(RecordParseError::EmptyPayload)?;
    let delimiter = config
        .field_delimiter
        .unwrap_or_else(|| detect_delimiter(header_line));
    let delimiter_byte = u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or(RecordParseError::UnsupportedDelimiter { delimiter })?;
    let venues_split_as_fields = config.venue_separator == delimiter;

    let escaped = if venues_split_as_fields {
        text.into_owned()
    } else {
        text.replace(config.venue_separator, &VENUE_SENTINEL.to_string())
    };

    // One entry per physical line so reader positions map back to file lines.
    let mut lines: Vec<&str> = escaped.split('\n').map(clean_field).collect();
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    let header_pos = lines
        .iter()
        .position(|l| !l.is_empty())
        .ok_or(RecordParseError::EmptyPayload)?;
    let data_end = lines
        .len()
        .saturating_sub(config.footer_lines)
        .max(header_pos + 1);
    let body = lines[header_pos..data_end].join("\n");

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter_byte)
        .has_headers(true)
        .flexible(true)
        .quoting(false)
        .trim(Trim::All)
        .terminator(Terminator::Any(b'\n'))
        .from_reader(body.as_bytes());

    let file_line = |reader_line: u64| header_pos + reader_line as usize;
    let reader_error = |e: csv::Error| RecordParseError::Reader {
        line: e
            .position()
            .map_or(header_pos + 1, |p| file_line(p.line())),
        reason: e.to_string(),
    };

    let columns = ColumnMap::from_headers(reader.headers().map_err(reader_error)?);
    let layout = Layout::resolve(&columns, venues_split_as_fields)?;
    tracing::debug!(
        delimiter = %delimiter,
        width = columns.width(),
        "resolved feed header"
    );

    let mut records = Vec::with_capacity(data_end - header_pos - 1);
    for row in reader.records() {
        let row = row.map_err(reader_error)?;
        let line_no = row.position().map_or(0, |p| file_line(p.line()));
        records.push(parse_row(line_no, &row, layout)?);
    }

    tracing::debug!(records = records.len(), "parsed feed payload");
    Ok(records)
}

fn parse_row(
    line_no: usize,
    row: &StringRecord,
    layout: Layout,
) -> Result<DailyRecord, RecordParseError> {
    let fields: Vec<&str> = row.iter().map(clean_field).collect();
    if fields.len() < layout.width {
        return Err(RecordParseError::ShortRow {
            line: line_no,
            expected: layout.width,
            found: fields.len(),
        });
    }
    if fields.len() > layout.width && !layout.accepts_surplus() {
        return Err(RecordParseError::LongRow {
            line: line_no,
            expected: layout.width,
            found: fields.len(),
        });
    }

    let raw_date = fields[layout.date];
    let trading_date = parse_date_token(raw_date).ok_or_else(|| RecordParseError::InvalidDate {
        line: line_no,
        value: raw_date.to_string(),
    })?;

    let symbol = fields[layout.symbol];
    if symbol.is_empty() {
        return Err(RecordParseError::EmptySymbol { line: line_no });
    }

    let short_volume = parse_volume(line_no, COL_SHORT_VOLUME, fields[layout.short_volume])?;
    let short_exempt_volume = parse_volume(
        line_no,
        COL_SHORT_EXEMPT_VOLUME,
        fields[layout.short_exempt_volume],
    )?;
    let total_volume = parse_volume(line_no, COL_TOTAL_VOLUME, fields[layout.total_volume])?;

    // Everything from `Market` on; only one field unless surplus was accepted above.
    let market_end = if fields.len() > layout.width {
        fields.len()
    } else {
        layout.market + 1
    };
    let market = fields[layout.market..market_end]
        .iter()
        .flat_map(|f| f.split(VENUE_SENTINEL))
        .map(clean_field)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect();

    Ok(DailyRecord::new(
        symbol,
        trading_date,
        short_volume,
        short_exempt_volume,
        total_volume,
        market,
    ))
}

/// Strict `YYYYMMDD` parse.
fn parse_date_token(value: &str) -> Option<NaiveDate> {
    if value.len() != 8 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(value, crate::feed::URL_DATE_FORMAT).ok()
}

fn parse_volume(line: usize, column: &str, value: &str) -> Result<f64, RecordParseError> {
    let parsed = value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| RecordParseError::InvalidNumber {
            line,
            column: column.to_string(),
            value: value.to_string(),
        })?;
    if parsed < 0.0 {
        return Err(RecordParseError::NegativeVolume {
            line,
            column: column.to_string(),
        });
    }
    Ok(parsed)
}

fn detect_delimiter(header: &str) -> char {
    if header.contains('|') {
        '|'
    } else {
        ','
    }
}

/// Trim whitespace and stray control characters (`\r` in particular),
/// keeping the venue sentinel intact.
fn clean_field(field: &str) -> &str {
    field.trim_matches(|c: char| (c.is_whitespace() || c.is_control()) && c != VENUE_SENTINEL)
}
