//! Serializable run configuration.
//!
//! Every section has defaults, so an empty TOML file (or no file at all)
//! yields a working configuration pointed at the public daily feed.
//!
//! ```toml
//! [feed]
//! url_prefix = "https://cdn.finra.org/equity/regsho/daily/CNMSshvol"
//! url_suffix = ".txt"
//! timeout_secs = 30
//!
//! [parser]
//! venue_separator = ","
//! footer_lines = 1
//!
//! [pipeline]
//! workers = 4
//! queue_depth = 16
//! skip_weekends = true
//!
//! [indicators]
//! rsi_period = 14
//! reject_negative_sma = true
//! ```

use serde::{Deserialize, Serialize};
use shortvol_core::indicators::Sma;
use shortvol_core::{FeedConfig, ParserConfig};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Complete configuration for a range run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShortVolConfig {
    pub feed: FeedConfig,
    pub parser: ParserConfig,
    pub pipeline: PipelineConfig,
    pub indicators: IndicatorConfig,
}

/// Concurrency settings for range ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Concurrent fetch/parse workers.
    pub workers: usize,
    /// Parsed day batches that may wait for the aggregator.
    pub queue_depth: usize,
    /// Skip Saturdays and Sundays without issuing a request.
    pub skip_weekends: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_depth: 16,
            skip_weekends: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub rsi_period: usize,
    pub reject_negative_sma: bool,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            reject_negative_sma: true,
        }
    }
}

impl IndicatorConfig {
    pub fn sma(&self) -> Sma {
        if self.reject_negative_sma {
            Sma::strict()
        } else {
            Sma::permissive()
        }
    }
}

impl ShortVolConfig {
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feed.url_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid("feed.url_prefix must not be empty".into()));
        }
        if self.feed.timeout_secs == 0 {
            return Err(ConfigError::Invalid("feed.timeout_secs must be at least 1".into()));
        }
        if self.parser.field_delimiter.is_some_and(|d| !d.is_ascii()) {
            return Err(ConfigError::Invalid(
                "parser.field_delimiter must be an ASCII character".into(),
            ));
        }
        if self.pipeline.workers == 0 {
            return Err(ConfigError::Invalid("pipeline.workers must be at least 1".into()));
        }
        if self.pipeline.queue_depth == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.queue_depth must be at least 1".into(),
            ));
        }
        if self.indicators.rsi_period == 0 {
            return Err(ConfigError::Invalid(
                "indicators.rsi_period must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
