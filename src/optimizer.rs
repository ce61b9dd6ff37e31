//! Hyperparameter sweep
//!
//! Runs independent training runs over a grid of agent parameters. Each run
//! builds its own trainer, so runs share nothing and execute in parallel.

use indicatif::ProgressBar;
use itertools::iproduct;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::backtest::QLearningTrainer;
use crate::config::AgentConfig;
use crate::encoder::EncoderConfig;
use crate::metrics::calculate_metrics;
use crate::{MarketBar, Symbol};

/// Parameter ranges for the sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepGrid {
    pub alphas: Vec<f64>,
    pub gammas: Vec<f64>,
    pub stop_loss_fractions: Vec<f64>,
    pub stop_loss_penalties: Vec<f64>,
    pub num_training_episodes: Vec<usize>,
}

impl Default for SweepGrid {
    fn default() -> Self {
        Self::quick()
    }
}

impl SweepGrid {
    /// Quick grid for faster sweeps
    pub fn quick() -> Self {
        SweepGrid {
            alphas: vec![0.05, 0.1],
            gammas: vec![0.9, 0.95],
            stop_loss_fractions: vec![0.02, 0.03],
            stop_loss_penalties: vec![1.5],
            num_training_episodes: vec![50],
        }
    }

    /// Full grid for comprehensive sweeps
    pub fn full() -> Self {
        SweepGrid {
            alphas: vec![0.01, 0.05, 0.1, 0.2],
            gammas: vec![0.8, 0.9, 0.95, 0.99],
            stop_loss_fractions: vec![0.01, 0.02, 0.03, 0.05],
            stop_loss_penalties: vec![1.0, 1.5, 2.0],
            num_training_episodes: vec![25, 50, 100],
        }
    }

    /// Every valid agent config in the grid, starting from `base`
    pub fn generate_configs(&self, base: &AgentConfig) -> Vec<AgentConfig> {
        iproduct!(
            &self.alphas,
            &self.gammas,
            &self.stop_loss_fractions,
            &self.stop_loss_penalties,
            &self.num_training_episodes
        )
        .map(|(&alpha, &gamma, &stop, &penalty, &episodes)| AgentConfig {
            alpha,
            gamma,
            stop_loss_fraction: stop,
            stop_loss_penalty: penalty,
            num_training_episodes: episodes,
            ..base.clone()
        })
        // Skip invalid combinations
        .filter(|config| config.validate().is_ok())
        .collect()
    }

    pub fn total_combinations(&self) -> usize {
        self.alphas.len()
            * self.gammas.len()
            * self.stop_loss_fractions.len()
            * self.stop_loss_penalties.len()
            * self.num_training_episodes.len()
    }
}

/// The swept parameters of one run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepParams {
    pub alpha: f64,
    pub gamma: f64,
    pub stop_loss_fraction: f64,
    pub stop_loss_penalty: f64,
    pub num_training_episodes: usize,
}

impl From<&AgentConfig> for SweepParams {
    fn from(config: &AgentConfig) -> Self {
        SweepParams {
            alpha: config.alpha,
            gamma: config.gamma,
            stop_loss_fraction: config.stop_loss_fraction,
            stop_loss_penalty: config.stop_loss_penalty,
            num_training_episodes: config.num_training_episodes,
        }
    }
}

impl std::fmt::Display for SweepParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "a:{} g:{} stop:{:.1}% pen:{} ep:{}",
            self.alpha,
            self.gamma,
            self.stop_loss_fraction * 100.0,
            self.stop_loss_penalty,
            self.num_training_episodes
        )
    }
}

/// Evaluation result for a single (symbol, parameter) combination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepResult {
    pub symbol: Symbol,
    pub params: SweepParams,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub total_return: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub total_trades: usize,
    pub calmar_ratio: f64,
    pub profit_factor: f64,
    pub q_table_size: usize,
}

/// Train and evaluate one configuration. Failures are logged and skipped.
pub fn run_single(
    symbol: &Symbol,
    bars: &[MarketBar],
    agent: &AgentConfig,
    encoder: &EncoderConfig,
) -> Option<SweepResult> {
    let mut trainer = match QLearningTrainer::new(agent.clone(), encoder.clone()) {
        Ok(t) => t,
        Err(e) => {
            warn!("Skipping {} ({}): {}", symbol, SweepParams::from(agent), e);
            return None;
        }
    };
    let run = match trainer.run(bars) {
        Ok(r) => r,
        Err(e) => {
            warn!("Run failed for {} ({}): {}", symbol, SweepParams::from(agent), e);
            return None;
        }
    };
    let metrics = calculate_metrics(&run.evaluation);

    Some(SweepResult {
        symbol: symbol.clone(),
        params: SweepParams::from(agent),
        sharpe_ratio: metrics.sharpe_ratio,
        sortino_ratio: metrics.sortino_ratio,
        total_return: metrics.total_return,
        max_drawdown: metrics.max_drawdown,
        win_rate: metrics.win_rate,
        total_trades: metrics.total_trades,
        calmar_ratio: metrics.calmar_ratio,
        profit_factor: metrics.profit_factor,
        q_table_size: trainer.qtable().len(),
    })
}

/// Run every (symbol, config) pair in parallel
pub fn run_sweep(
    data: &[(Symbol, Vec<MarketBar>)],
    configs: &[AgentConfig],
    encoder: &EncoderConfig,
    progress_bar: Option<&ProgressBar>,
) -> Vec<SweepResult> {
    let runs: Vec<(&Symbol, &[MarketBar], &AgentConfig)> = iproduct!(data, configs)
        .map(|((symbol, bars), config)| (symbol, bars.as_slice(), config))
        .collect();

    tracing::info!("Testing {} sweep runs", runs.len());

    runs.par_iter()
        .filter_map(|(symbol, bars, config)| {
            let result = run_single(symbol, bars, config, encoder);
            if let Some(pb) = progress_bar {
                pb.inc(1);
            }
            result
        })
        .collect()
}

/// Sort sweep results by the given metric, best first
pub fn sort_results(results: &mut [SweepResult], sort_by: &str) {
    let key = |r: &SweepResult| {
        let value = match sort_by {
            "calmar" => r.calmar_ratio,
            "return" => r.total_return,
            "win_rate" => r.win_rate,
            "profit_factor" => r.profit_factor,
            "sortino" => r.sortino_ratio,
            _ => r.sharpe_ratio,
        };
        // NaN sorts last
        if value.is_nan() {
            f64::NEG_INFINITY
        } else {
            value
        }
    };
    results.sort_by(|a, b| key(b).total_cmp(&key(a)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_configs_keeps_base_fields() {
        let base = AgentConfig { seed: 7, ..Default::default() };
        let grid = SweepGrid::quick();
        let configs = grid.generate_configs(&base);
        assert_eq!(configs.len(), grid.total_combinations());
        assert!(configs.iter().all(|c| c.seed == 7));
    }

    #[test]
    fn test_invalid_combinations_skipped() {
        let grid = SweepGrid {
            alphas: vec![0.1, 1.5],
            gammas: vec![0.9, 1.0],
            stop_loss_fractions: vec![0.03],
            stop_loss_penalties: vec![1.5],
            num_training_episodes: vec![10],
        };
        let configs = grid.generate_configs(&AgentConfig::default());
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].alpha, 0.1);
        assert_eq!(configs[0].gamma, 0.9);
    }

    #[test]
    fn test_sort_results() {
        let result = |sharpe: f64, ret: f64| SweepResult {
            symbol: Symbol::new("BTCUSDT"),
            params: SweepParams::from(&AgentConfig::default()),
            sharpe_ratio: sharpe,
            sortino_ratio: 0.0,
            total_return: ret,
            max_drawdown: 0.0,
            win_rate: 0.0,
            total_trades: 1,
            calmar_ratio: 0.0,
            profit_factor: 0.0,
            q_table_size: 0,
        };
        let mut results = vec![result(0.5, 10.0), result(2.0, -1.0), result(f64::NAN, 3.0)];
        sort_results(&mut results, "return");
        assert_eq!(results[0].total_return, 10.0);
        sort_results(&mut results, "sharpe");
        assert_eq!(results[0].sharpe_ratio, 2.0);
        assert_eq!(results[1].sharpe_ratio, 0.5);
        assert!(results.last().unwrap().sharpe_ratio.is_nan());
    }
}
