//! Data loading and validation
//!
//! Loads raw OHLCV candles or pre-computed feature bars from CSV files and
//! validates bar sequences before they reach the learning loop.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::DataConfig;
use crate::error::DataValidationError;
use crate::features::{build_market_bars, FeatureConfig};
use crate::{Candle, MarketBar, Symbol};

// =============================================================================
// CSV Data Loading
// =============================================================================

fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    s.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // Try parsing without timezone and assume UTC
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
        })
        .with_context(|| format!("Failed to parse datetime: {}", s))
}

/// Load OHLCV candles (`datetime,open,high,low,close,volume`).
///
/// Rows that fail candle validation are skipped with a warning.
pub fn load_candles_csv(path: impl AsRef<Path>) -> Result<Vec<Candle>> {
    let mut reader = csv::Reader::from_path(path.as_ref())
        .with_context(|| format!("Failed to open CSV file {}", path.as_ref().display()))?;

    let mut candles = Vec::new();
    let mut skipped = 0usize;

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read row {}", row_idx + 1))?;

        let datetime = parse_datetime(record.get(0).context("Missing datetime column")?)?;
        let column = |idx: usize, name: &str| -> Result<f64> {
            record
                .get(idx)
                .with_context(|| format!("Missing {} column", name))?
                .trim()
                .parse()
                .with_context(|| format!("Failed to parse {} on row {}", name, row_idx + 1))
        };
        let open = column(1, "open")?;
        let high = column(2, "high")?;
        let low = column(3, "low")?;
        let close = column(4, "close")?;
        let volume = column(5, "volume")?;

        match Candle::new(datetime, open, high, low, close, volume) {
            Ok(candle) => candles.push(candle),
            Err(e) => {
                warn!("Skipping invalid candle at row {}: {}", row_idx + 1, e);
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        warn!("Skipped {} invalid rows in {}", skipped, path.as_ref().display());
    }

    Ok(candles)
}

/// One row of a feature CSV; indicator cells may be blank during warm-up
#[derive(Debug, Deserialize)]
struct FeatureRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    rsi: Option<f64>,
    ema: Option<f64>,
    aroon_up: Option<f64>,
    aroon_down: Option<f64>,
    price_change_pct: Option<f64>,
}

impl FeatureRow {
    fn into_bar(self, index: usize) -> Result<MarketBar> {
        let require = |value: Option<f64>, field: &'static str| {
            value.ok_or(DataValidationError::MissingField { index, field })
        };
        Ok(MarketBar {
            timestamp: parse_datetime(&self.timestamp)?,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            rsi: require(self.rsi, "rsi")?,
            ema: require(self.ema, "ema")?,
            aroon_up: require(self.aroon_up, "aroon_up")?,
            aroon_down: require(self.aroon_down, "aroon_down")?,
            price_change_pct: require(self.price_change_pct, "price_change_pct")?,
        })
    }
}

/// Load pre-computed bars
/// (`timestamp,open,high,low,close,volume,rsi,ema,aroon_up,aroon_down,price_change_pct`).
///
/// A blank indicator cell fails with `DataValidationError::MissingField`.
pub fn load_bars_csv(path: impl AsRef<Path>) -> Result<Vec<MarketBar>> {
    let mut reader = csv::Reader::from_path(path.as_ref())
        .with_context(|| format!("Failed to open CSV file {}", path.as_ref().display()))?;

    let mut bars = Vec::new();
    for (row_idx, result) in reader.deserialize::<FeatureRow>().enumerate() {
        let row = result.with_context(|| format!("Failed to read row {}", row_idx + 1))?;
        bars.push(row.into_bar(row_idx)?);
    }
    Ok(bars)
}

/// Write bars in the feature CSV layout read by `load_bars_csv`
pub fn write_bars_csv(path: impl AsRef<Path>, bars: &[MarketBar]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path.as_ref())
        .with_context(|| format!("Failed to create {}", path.as_ref().display()))?;
    writer.write_record([
        "timestamp",
        "open",
        "high",
        "low",
        "close",
        "volume",
        "rsi",
        "ema",
        "aroon_up",
        "aroon_down",
        "price_change_pct",
    ])?;
    for bar in bars {
        let mut record = vec![bar.timestamp.to_rfc3339()];
        record.extend(bar.fields().iter().map(|(_, v)| v.to_string()));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Path of a symbol's data file under `data_dir`
pub fn data_path(config: &DataConfig, symbol: &Symbol) -> PathBuf {
    let filename = if config.precomputed {
        format!("{}_{}_features.csv", symbol.as_str(), config.timeframe)
    } else {
        format!("{}_{}.csv", symbol.as_str(), config.timeframe)
    };
    Path::new(&config.data_dir).join(filename)
}

/// Load, prepare and date-filter the bars for one symbol
pub fn load_symbol_bars(
    config: &DataConfig,
    features: &FeatureConfig,
    symbol: &Symbol,
) -> Result<Vec<MarketBar>> {
    let path = data_path(config, symbol);
    if !path.exists() {
        anyhow::bail!("Data file not found: {}", path.display());
    }

    let bars = if config.precomputed {
        load_bars_csv(&path).with_context(|| format!("Failed to load features for {}", symbol))?
    } else {
        let candles = load_candles_csv(&path)
            .with_context(|| format!("Failed to load data for {}", symbol))?;
        info!("Loaded {} candles for {}", candles.len(), symbol);
        let report = validate_candles(&candles);
        for warning in &report.warnings {
            warn!("{}: {}", symbol, warning);
        }
        if !report.is_valid() {
            anyhow::bail!("Invalid candles for {}: {}", symbol, report.errors.join("; "));
        }
        build_market_bars(&candles, features)
    };

    let bars = filter_date_range(bars, config.start.as_deref(), config.end.as_deref())?;
    info!("Prepared {} bars for {}", bars.len(), symbol);
    Ok(bars)
}

/// Keep bars between `start` and `end` (inclusive dates, YYYY-MM-DD)
pub fn filter_date_range(
    bars: Vec<MarketBar>,
    start: Option<&str>,
    end: Option<&str>,
) -> Result<Vec<MarketBar>> {
    let parse = |s: &str| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("Invalid date: {}", s))
    };
    let start = start.map(parse).transpose()?;
    let end = end.map(parse).transpose()?;

    Ok(bars
        .into_iter()
        .filter(|b| {
            let day = b.timestamp.date_naive();
            start.map_or(true, |s| day >= s) && end.map_or(true, |e| day <= e)
        })
        .collect())
}

// =============================================================================
// Validation
// =============================================================================

/// Check a bar sequence before any episode runs.
///
/// Fails on the first problem found: empty input, non-finite fields,
/// non-positive prices, `high < low`, an open or close outside
/// `[low, high]`, or timestamps that do not strictly increase.
pub fn validate_bars(bars: &[MarketBar]) -> Result<(), DataValidationError> {
    if bars.is_empty() {
        return Err(DataValidationError::Empty);
    }

    for (index, bar) in bars.iter().enumerate() {
        if let Some((field, value)) = bar.fields().into_iter().find(|(_, v)| !v.is_finite()) {
            return Err(DataValidationError::NonFinite { index, field, value });
        }
        if bar.open <= 0.0 || bar.high <= 0.0 || bar.low <= 0.0 || bar.close <= 0.0 {
            return Err(DataValidationError::NonPositivePrice {
                index,
                low: bar.low,
                close: bar.close,
            });
        }
        if bar.high < bar.low {
            return Err(DataValidationError::InvalidRange {
                index,
                high: bar.high,
                low: bar.low,
            });
        }
        // Stops are triggered from low/high, so the close must lie inside them
        for (field, value) in [("open", bar.open), ("close", bar.close)] {
            if value < bar.low || value > bar.high {
                return Err(DataValidationError::PriceOutOfRange {
                    index,
                    field,
                    value,
                    low: bar.low,
                    high: bar.high,
                });
            }
        }
        if index > 0 && bar.timestamp <= bars[index - 1].timestamp {
            return Err(DataValidationError::NonMonotonicTime {
                index,
                previous: bars[index - 1].timestamp,
                current: bar.timestamp,
            });
        }
    }

    Ok(())
}

/// Result of candle validation
#[derive(Debug)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Non-fatal sanity report over raw candles
pub fn validate_candles(candles: &[Candle]) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if candles.is_empty() {
        errors.push("No candles provided".to_string());
        return ValidationResult { errors, warnings };
    }

    for (i, candle) in candles.iter().enumerate() {
        if let Err(e) = candle.validate() {
            errors.push(format!("Candle {}: {}", i, e));
        }
        if i > 0 && candle.datetime <= candles[i - 1].datetime {
            warnings.push(format!("Candle {}: not chronological", i));
        }
    }

    ValidationResult { errors, warnings }
}
