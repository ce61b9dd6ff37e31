//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files. Every field has a
//! serde default so a config file only needs to list what it changes.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::encoder::EncoderConfig;
use crate::error::ConfigError;
use crate::features::FeatureConfig;
use crate::optimizer::SweepGrid;
use crate::policy::EpsilonSchedule;
use crate::reward::RewardConfig;
use crate::risk::RiskConfig;
use crate::{Action, Symbol};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    /// Hyperparameter grid for the sweep command (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sweep: Option<SweepGrid>,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        Ok(config)
    }

    /// Validate every section that feeds the learning engine
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.features.validate()?;
        self.encoder.validate()?;
        self.agent.validate()
    }
}

/// Where market data lives and which markets to run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_results_dir")]
    pub results_dir: String,
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
    /// Files already carry indicator columns (`{SYMBOL}_{timeframe}_features.csv`)
    #[serde(default)]
    pub precomputed: bool,
    /// Optional start date (YYYY-MM-DD)
    #[serde(default)]
    pub start: Option<String>,
    /// Optional end date (YYYY-MM-DD)
    #[serde(default)]
    pub end: Option<String>,
}

fn default_data_dir() -> String { "data".to_string() }
fn default_results_dir() -> String { "results".to_string() }
fn default_symbols() -> Vec<String> { vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()] }
fn default_timeframe() -> String { "1h".to_string() }

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            data_dir: default_data_dir(),
            results_dir: default_results_dir(),
            symbols: default_symbols(),
            timeframe: default_timeframe(),
            precomputed: false,
            start: None,
            end: None,
        }
    }
}

impl DataConfig {
    pub fn symbols(&self) -> Vec<Symbol> {
        self.symbols.iter().map(|s| Symbol::new(s.clone())).collect()
    }

    /// Where exports go: `explicit` when given, else `results_dir`
    pub fn export_dir(&self, explicit: Option<&Path>) -> PathBuf {
        explicit.map_or_else(|| PathBuf::from(&self.results_dir), Path::to_path_buf)
    }
}

/// How epsilon moves from `epsilon_start` to `epsilon_end` across episodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecaySchedule {
    #[default]
    Linear,
    Exponential,
    Constant,
}

/// Q-learning agent hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Stop distance as a fraction of entry price (default: 0.03)
    #[serde(default = "default_stop_loss_fraction")]
    pub stop_loss_fraction: f64,

    /// Take-profit distance as a fraction of entry price (default: disabled)
    #[serde(default)]
    pub take_profit_fraction: Option<f64>,

    /// Ratchet the stop behind favourable closes (default: false)
    #[serde(default)]
    pub trailing_stop: bool,

    /// Learning rate, 0 < alpha <= 1 (default: 0.1)
    #[serde(default = "default_alpha")]
    pub alpha: f64,

    /// Discount factor, 0 <= gamma < 1 (default: 0.95)
    #[serde(default = "default_gamma")]
    pub gamma: f64,

    #[serde(default = "default_epsilon_start")]
    pub epsilon_start: f64,

    /// Exploration floor during training (default: 0.05)
    #[serde(default = "default_epsilon_end")]
    pub epsilon_end: f64,

    #[serde(default)]
    pub decay_schedule: DecaySchedule,

    /// Per-episode multiplier for the exponential schedule (default: 0.95)
    #[serde(default = "default_epsilon_decay")]
    pub epsilon_decay: f64,

    #[serde(default = "default_num_training_episodes")]
    pub num_training_episodes: usize,

    /// Stop each episode after this many bars (default: all bars)
    #[serde(default)]
    pub max_bars_per_episode: Option<usize>,

    /// Add mark-to-market shaping while a position is open (default: false)
    #[serde(default)]
    pub reward_shaping_enabled: bool,

    #[serde(default = "default_shaping_weight")]
    pub shaping_weight: f64,

    /// Multiplier applied to losing stop-loss exits (default: 1.5)
    #[serde(default = "default_stop_loss_penalty")]
    pub stop_loss_penalty: f64,

    /// Value of (state, action) pairs never updated (default: 0.0)
    #[serde(default)]
    pub initial_q_value: f64,

    /// Tie-break order for best-action selection, earliest wins
    #[serde(default = "default_action_priority")]
    pub action_priority: Vec<Action>,

    /// Seed for the exploration RNG
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_stop_loss_fraction() -> f64 { 0.03 }
fn default_alpha() -> f64 { 0.1 }
fn default_gamma() -> f64 { 0.95 }
fn default_epsilon_start() -> f64 { 1.0 }
fn default_epsilon_end() -> f64 { 0.05 }
fn default_epsilon_decay() -> f64 { 0.95 }
fn default_num_training_episodes() -> usize { 50 }
fn default_shaping_weight() -> f64 { 0.1 }
fn default_stop_loss_penalty() -> f64 { 1.5 }
fn default_seed() -> u64 { 42 }

pub fn default_action_priority() -> Vec<Action> {
    vec![Action::Hold, Action::Close, Action::OpenLong, Action::OpenShort]
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            stop_loss_fraction: default_stop_loss_fraction(),
            take_profit_fraction: None,
            trailing_stop: false,
            alpha: default_alpha(),
            gamma: default_gamma(),
            epsilon_start: default_epsilon_start(),
            epsilon_end: default_epsilon_end(),
            decay_schedule: DecaySchedule::default(),
            epsilon_decay: default_epsilon_decay(),
            num_training_episodes: default_num_training_episodes(),
            max_bars_per_episode: None,
            reward_shaping_enabled: false,
            shaping_weight: default_shaping_weight(),
            stop_loss_penalty: default_stop_loss_penalty(),
            initial_q_value: 0.0,
            action_priority: default_action_priority(),
            seed: default_seed(),
        }
    }
}

impl AgentConfig {
    /// Check every hyperparameter against its allowed range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(ConfigError::InvalidAlpha(self.alpha));
        }
        if !(self.gamma >= 0.0 && self.gamma < 1.0) {
            return Err(ConfigError::InvalidGamma(self.gamma));
        }
        if !(self.stop_loss_fraction > 0.0 && self.stop_loss_fraction < 1.0) {
            return Err(ConfigError::InvalidStopLoss(self.stop_loss_fraction));
        }
        if let Some(tp) = self.take_profit_fraction {
            if !(tp > 0.0 && tp.is_finite()) {
                return Err(ConfigError::InvalidTakeProfit(tp));
            }
        }
        let (start, end) = (self.epsilon_start, self.epsilon_end);
        if !(0.0..=1.0).contains(&start) || !(0.0..=1.0).contains(&end) || end > start {
            return Err(ConfigError::InvalidEpsilon { start, end });
        }
        if self.decay_schedule == DecaySchedule::Exponential
            && !(self.epsilon_decay > 0.0 && self.epsilon_decay <= 1.0)
        {
            return Err(ConfigError::InvalidDecay(self.epsilon_decay));
        }
        if self.num_training_episodes == 0 {
            return Err(ConfigError::NoEpisodes);
        }
        if !(self.stop_loss_penalty >= 1.0 && self.stop_loss_penalty.is_finite()) {
            return Err(ConfigError::InvalidPenalty(self.stop_loss_penalty));
        }
        if !(self.shaping_weight >= 0.0 && self.shaping_weight.is_finite()) {
            return Err(ConfigError::InvalidShapingWeight(self.shaping_weight));
        }
        self.validate_action_priority()
    }

    fn validate_action_priority(&self) -> Result<(), ConfigError> {
        let mut sorted = self.action_priority.clone();
        sorted.sort();
        sorted.dedup();
        if self.action_priority.len() != Action::ALL.len() || sorted.len() != Action::ALL.len() {
            return Err(ConfigError::InvalidActionPriority(format!(
                "{:?}",
                self.action_priority
            )));
        }
        Ok(())
    }

    pub fn risk_config(&self) -> RiskConfig {
        RiskConfig {
            stop_loss_fraction: self.stop_loss_fraction,
            take_profit_fraction: self.take_profit_fraction,
            trailing_stop: self.trailing_stop,
        }
    }

    pub fn reward_config(&self) -> RewardConfig {
        RewardConfig {
            stop_loss_penalty: self.stop_loss_penalty,
            shaping_enabled: self.reward_shaping_enabled,
            shaping_weight: self.shaping_weight,
        }
    }

    pub fn epsilon_schedule(&self) -> EpsilonSchedule {
        EpsilonSchedule {
            start: self.epsilon_start,
            end: self.epsilon_end,
            schedule: self.decay_schedule,
            decay: self.epsilon_decay,
        }
    }
}
