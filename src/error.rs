//! Error types for the learning engine
//!
//! Both variants are fatal: they are raised before the first episode starts,
//! so a failed run never touches the Q-table.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Problems with the bar sequence handed to the trainer
#[derive(Debug, Error, PartialEq)]
pub enum DataValidationError {
    #[error("no market bars provided")]
    Empty,

    #[error("bar {index}: missing required field '{field}'")]
    MissingField { index: usize, field: &'static str },

    #[error("bar {index}: field '{field}' is not finite ({value})")]
    NonFinite {
        index: usize,
        field: &'static str,
        value: f64,
    },

    #[error("bar {index}: prices must be positive (low={low}, close={close})")]
    NonPositivePrice { index: usize, low: f64, close: f64 },

    #[error("bar {index}: high ({high}) < low ({low})")]
    InvalidRange { index: usize, high: f64, low: f64 },

    #[error("bar {index}: {field} ({value}) outside [{low}, {high}]")]
    PriceOutOfRange {
        index: usize,
        field: &'static str,
        value: f64,
        low: f64,
        high: f64,
    },

    #[error("bar {index}: timestamp {current} is not after previous {previous}")]
    NonMonotonicTime {
        index: usize,
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },
}

/// Invalid hyperparameters
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("alpha must be in (0, 1], got {0}")]
    InvalidAlpha(f64),

    #[error("gamma must be in [0, 1), got {0}")]
    InvalidGamma(f64),

    #[error("stop_loss_fraction must be in (0, 1), got {0}")]
    InvalidStopLoss(f64),

    #[error("take_profit_fraction must be positive, got {0}")]
    InvalidTakeProfit(f64),

    #[error("epsilon bounds must satisfy 0 <= end <= start <= 1 (start={start}, end={end})")]
    InvalidEpsilon { start: f64, end: f64 },

    #[error("epsilon_decay must be in (0, 1], got {0}")]
    InvalidDecay(f64),

    #[error("num_training_episodes must be at least 1")]
    NoEpisodes,

    #[error("stop_loss_penalty must be >= 1, got {0}")]
    InvalidPenalty(f64),

    #[error("shaping_weight must be finite and >= 0, got {0}")]
    InvalidShapingWeight(f64),

    #[error("action_priority must list every action exactly once: {0}")]
    InvalidActionPriority(String),

    #[error("invalid encoder buckets: {0}")]
    InvalidEncoder(String),

    #[error("{0} must be at least 1")]
    InvalidFeaturePeriod(&'static str),
}

/// Anything that can abort a training run
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("data validation error: {0}")]
    Data(#[from] DataValidationError),
}
