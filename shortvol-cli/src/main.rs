//! Short-volume CLI: range reports and indicator walkthroughs.
//!
//! Commands:
//! - `shorts`: fetch daily short-volume files for a date range and report
//!   per-symbol totals and short-interest estimates
//! - `rsi`: evaluate SMA and Wilder RSI step by step over a series
//!
//! Logging goes to stderr through `tracing`; set `RUST_LOG` to adjust.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use shortvol_core::indicators::{price_changes, IndicatorError, RsiState, Sma};
use shortvol_core::{DateRange, HttpFeed};
use shortvol_runner::{
    ingest_range, render_table, CancelToken, RangeDocument, ShortVolConfig, SummaryRow,
    TracingProgress,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Parser)]
#[command(
    name = "shortvol",
    about = "Daily short-volume aggregation and short-interest estimates"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and aggregate short-volume files for a date range.
    Shorts {
        /// Single trading date (YYYY-MM-DD).
        #[arg(short = 'o', long)]
        one_day: Option<String>,

        /// Range start (YYYY-MM-DD).
        #[arg(short, long)]
        start: Option<String>,

        /// Range end (YYYY-MM-DD). Defaults to today when --start is given.
        #[arg(short, long)]
        end: Option<String>,

        /// Number of calendar days ending at --end (or today).
        #[arg(short, long)]
        trailing_days: Option<u32>,

        /// Only report these symbols.
        #[arg(long)]
        symbol: Vec<String>,

        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,

        /// Include per-day records in JSON output.
        #[arg(long, default_value_t = false)]
        include_days: bool,

        /// Path to a TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the configured worker count.
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Walk SMA and RSI over a series, one step per observation.
    Rsi {
        /// Comma-separated price changes.
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
        changes: Vec<f64>,

        /// Comma-separated prices; changes are their consecutive differences.
        #[arg(long, value_delimiter = ',', conflicts_with = "changes")]
        prices: Vec<f64>,

        /// Smoothing period. Defaults to the configured period.
        #[arg(long)]
        period: Option<usize>,

        /// Path to a TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Shorts {
            one_day,
            start,
            end,
            trailing_days,
            symbol,
            format,
            include_days,
            config,
            workers,
        } => {
            let selection = DateSelection {
                one_day,
                start,
                end,
                trailing_days,
            };
            run_shorts(
                selection,
                symbol,
                format,
                include_days,
                config,
                workers,
            )
        }
        Commands::Rsi {
            changes,
            prices,
            period,
            config,
        } => run_rsi(changes, prices, period, config),
    }
}

fn load_config(path: Option<PathBuf>) -> Result<ShortVolConfig> {
    match path {
        Some(path) => ShortVolConfig::from_file(&path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(ShortVolConfig::default()),
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .with_context(|| format!("invalid date '{s}', expected YYYY-MM-DD"))
}

/// Raw date flags from the command line.
#[derive(Debug, Default)]
struct DateSelection {
    one_day: Option<String>,
    start: Option<String>,
    end: Option<String>,
    trailing_days: Option<u32>,
}

impl DateSelection {
    /// Resolve to a range. Explicit start/end wins over trailing days,
    /// which wins over a single day; with nothing given, today.
    fn resolve(&self, today: NaiveDate) -> Result<DateRange> {
        let end = self.end.as_deref().map(parse_date).transpose()?;

        if let Some(start) = self.start.as_deref() {
            let start = parse_date(start)?;
            return Ok(DateRange::new(start, end.unwrap_or(today))?);
        }
        if let Some(days) = self.trailing_days {
            return Ok(DateRange::trailing(end.unwrap_or(today), days)?);
        }
        if let Some(end) = end {
            bail!("--end {end} requires --start or --trailing-days");
        }
        if let Some(day) = self.one_day.as_deref() {
            return Ok(DateRange::single(parse_date(day)?));
        }
        Ok(DateRange::single(today))
    }
}

fn run_shorts(
    selection: DateSelection,
    symbols: Vec<String>,
    format: OutputFormat,
    include_days: bool,
    config_path: Option<PathBuf>,
    workers: Option<usize>,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(workers) = workers {
        config.pipeline.workers = workers;
    }
    config.validate()?;

    let today = chrono::Local::now().date_naive();
    let range = selection.resolve(today)?;
    tracing::debug!(start = %range.start(), end = %range.end(), "resolved date selection");

    let feed = HttpFeed::new(config.feed.clone())?;
    let report = ingest_range(
        &feed,
        &config.parser,
        &config.pipeline,
        &range,
        &CancelToken::new(),
        &TracingProgress,
    )?;

    let wanted: Vec<String> = symbols.iter().map(|s| s.to_uppercase()).collect();
    let filter = |s: &shortvol_core::SymbolSummary| wanted.is_empty() || wanted.contains(&s.symbol);

    match format {
        OutputFormat::Json => {
            let doc = RangeDocument::new(&report, include_days, filter);
            println!("{}", doc.to_json()?);
        }
        OutputFormat::Table => {
            let rows: Vec<SummaryRow> = report
                .summaries
                .iter()
                .filter(|s| filter(*s))
                .map(SummaryRow::from)
                .collect();
            println!("Range: {} to {}", range.start(), range.end());
            println!(
                "Days: {} ingested, {} skipped, {} failed",
                report.days_ingested.len(),
                report.days_skipped.len(),
                report.failures.len()
            );
            println!();
            if rows.is_empty() {
                println!("No records in range.");
            } else {
                print!("{}", render_table(&rows));
            }
        }
    }

    if !report.failures.is_empty() {
        for (date, err) in &report.failures {
            eprintln!("Error for {date}: {err}");
        }
        std::process::exit(1);
    }

    Ok(())
}

fn run_rsi(
    changes: Vec<f64>,
    prices: Vec<f64>,
    period: Option<usize>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let period = period.unwrap_or(config.indicators.rsi_period);
    let sma = config.indicators.sma();

    let (levels, changes) = if prices.is_empty() {
        (None, changes)
    } else {
        let changes = price_changes(&prices);
        (Some(prices), changes)
    };
    if changes.is_empty() {
        bail!("need at least one change (or two prices)");
    }

    let mut state = RsiState::new(period)?;

    println!("{:>5} {:>12} {:>12} {:>12} {:>12} {:>10}", "Step", "Change", "SMA", "Avg Gain", "Avg Loss", "RSI");
    println!("{}", "-".repeat(68));
    for (i, &change) in changes.iter().enumerate() {
        // SMA over prices when given (aligned to the price closing this step), else over changes
        let sma_value = match &levels {
            Some(p) => trailing_sma(sma, &p[..i + 2], period),
            None => trailing_sma(sma, &changes[..=i], period),
        };

        let (gain, loss, rsi) = match state.push(change) {
            Ok(reading) => (
                format!("{:.4}", reading.averages.avg_gain),
                format!("{:.4}", reading.averages.avg_loss),
                reading
                    .rsi
                    .value()
                    .map(|v| format!("{v:.2}"))
                    .unwrap_or_else(|| "undefined".into()),
            ),
            Err(IndicatorError::InsufficientData { .. }) => {
                ("-".into(), "-".into(), "warming".into())
            }
            Err(e) => return Err(e.into()),
        };

        println!(
            "{:>5} {:>12.4} {:>12} {:>12} {:>12} {:>10}",
            i + 1,
            change,
            sma_value,
            gain,
            loss,
            rsi
        );
    }

    Ok(())
}

/// SMA of the last `period` values, formatted for display.
fn trailing_sma(sma: Sma, values: &[f64], period: usize) -> String {
    if values.len() < period {
        return "-".into();
    }
    match sma.compute(&values[values.len() - period..]) {
        Ok(v) => format!("{v:.4}"),
        Err(IndicatorError::NegativeResult { .. }) => "negative".into(),
        Err(_) => "n/a".into(),
    }
}
