//! Q-Learning Crypto Trading Agent
//!
//! A tabular Q-learning agent for BTC/USDT and ETH/USDT, trained and
//! evaluated by replaying historical bars. Includes indicator-based state
//! encoding, stop-loss aware position management, performance metrics and
//! parallel hyperparameter sweeps.

pub mod backtest;
pub mod config;
pub mod data;
pub mod encoder;
pub mod error;
pub mod features;
pub mod indicators;
pub mod metrics;
pub mod optimizer;
pub mod policy;
pub mod qtable;
pub mod reward;
pub mod risk;
pub mod types;

pub use backtest::{EpisodeKind, EpisodeResult, QLearningTrainer, StepRecord, TrainingRun};
pub use config::Config;
pub use encoder::{StateEncoder, StateKey};
pub use error::{ConfigError, DataValidationError, EngineError};
pub use qtable::QTable;
pub use types::*;
