//! Q-learning training and backtest loop
//!
//! Replays a bar sequence once per episode. Training episodes share a single
//! Q-table and explore according to the epsilon schedule; the final
//! evaluation pass runs greedily with learning switched off.
//!
//! Per bar:
//! ```text
//! encode -> select -> apply (stops first) -> reward -> TD update
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{AgentConfig, Config};
use crate::data::validate_bars;
use crate::encoder::{EncoderConfig, StateEncoder, StateKey};
use crate::error::{ConfigError, EngineError};
use crate::policy::{EpsilonGreedyPolicy, EpsilonSchedule};
use crate::qtable::QTable;
use crate::reward::{RewardFunction, Transition};
use crate::risk::PositionManager;
use crate::{Action, ExitReason, MarketBar, PositionSide, Trade};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpisodeKind {
    Training,
    Evaluation,
}

/// One bar of one episode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
    pub state: StateKey,
    /// What the policy picked
    pub chosen_action: Action,
    /// What the position manager did
    pub executed_action: Action,
    pub reward: f64,
    pub realized_pnl: f64,
    pub exit_reason: Option<ExitReason>,
    pub side_after: PositionSide,
    /// Compounded realized return so far (0.05 == +5%)
    pub cumulative_return: f64,
}

/// Full record of one pass over the bars
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeResult {
    pub kind: EpisodeKind,
    pub episode: usize,
    pub epsilon: f64,
    pub steps: Vec<StepRecord>,
    pub trades: Vec<Trade>,
}

impl EpisodeResult {
    pub fn total_reward(&self) -> f64 {
        self.steps.iter().map(|s| s.reward).sum()
    }

    pub fn total_return(&self) -> f64 {
        self.steps.last().map_or(0.0, |s| s.cumulative_return)
    }

    pub fn final_side(&self) -> PositionSide {
        self.steps.last().map_or(PositionSide::Flat, |s| s.side_after)
    }

    pub fn stop_loss_exits(&self) -> usize {
        self.trades
            .iter()
            .filter(|t| t.exit_reason == ExitReason::StopLoss)
            .count()
    }

    pub fn summary(&self, q_table_size: usize) -> EpisodeSummary {
        EpisodeSummary {
            episode: self.episode,
            kind: self.kind,
            epsilon: self.epsilon,
            total_reward: self.total_reward(),
            total_return: self.total_return(),
            trades: self.trades.len(),
            stop_loss_exits: self.stop_loss_exits(),
            q_table_size,
        }
    }
}

/// Compact per-episode statistics kept for training passes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub episode: usize,
    pub kind: EpisodeKind,
    pub epsilon: f64,
    pub total_reward: f64,
    pub total_return: f64,
    pub trades: usize,
    pub stop_loss_exits: usize,
    pub q_table_size: usize,
}

/// Output of `QLearningTrainer::run`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingRun {
    pub training: Vec<EpisodeSummary>,
    pub evaluation: EpisodeResult,
}

/// Owns the Q-table and every component that touches it during a run
pub struct QLearningTrainer {
    config: AgentConfig,
    encoder: StateEncoder,
    positions: PositionManager,
    reward_fn: RewardFunction,
    policy: EpsilonGreedyPolicy,
    schedule: EpsilonSchedule,
    qtable: QTable,
    episodes_run: usize,
}

impl QLearningTrainer {
    /// Validate configuration and build a trainer with an empty Q-table
    pub fn new(agent: AgentConfig, encoder: EncoderConfig) -> Result<Self, ConfigError> {
        agent.validate()?;
        let encoder = StateEncoder::new(encoder)?;

        Ok(QLearningTrainer {
            positions: agent.risk_config().build(),
            reward_fn: RewardFunction::new(agent.reward_config()),
            policy: EpsilonGreedyPolicy::new(agent.seed),
            schedule: agent.epsilon_schedule(),
            qtable: QTable::new(agent.initial_q_value, agent.action_priority.clone()),
            encoder,
            config: agent,
            episodes_run: 0,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Self::new(config.agent.clone(), config.encoder.clone())
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn qtable(&self) -> &QTable {
        &self.qtable
    }

    /// Direct table access for seeding values before a run
    pub fn qtable_mut(&mut self) -> &mut QTable {
        &mut self.qtable
    }

    /// Training episodes completed so far
    pub fn episodes_run(&self) -> usize {
        self.episodes_run
    }

    /// Run all training episodes followed by one greedy evaluation pass.
    pub fn run(&mut self, bars: &[MarketBar]) -> Result<TrainingRun, EngineError> {
        validate_bars(bars)?;

        let total = self.config.num_training_episodes;
        let mut training = Vec::with_capacity(total);

        for episode in 0..total {
            let epsilon = self.schedule.epsilon(episode, total);
            let result = self.simulate(bars, EpisodeKind::Training, episode, epsilon);
            let summary = result.summary(self.qtable.len());
            info!(
                episode = episode + 1,
                total = total,
                epsilon = epsilon,
                reward = summary.total_reward,
                return_pct = summary.total_return * 100.0,
                trades = summary.trades,
                stop_losses = summary.stop_loss_exits,
                "Training episode complete"
            );
            training.push(summary);
        }

        let evaluation = self.simulate(bars, EpisodeKind::Evaluation, total, 0.0);
        info!(
            reward = evaluation.total_reward(),
            return_pct = evaluation.total_return() * 100.0,
            trades = evaluation.trades.len(),
            q_table_size = self.qtable.len(),
            "Evaluation complete"
        );

        Ok(TrainingRun { training, evaluation })
    }

    /// Run a single episode. Evaluation episodes use epsilon 0 and never
    /// write to the Q-table.
    pub fn run_episode(
        &mut self,
        bars: &[MarketBar],
        kind: EpisodeKind,
    ) -> Result<EpisodeResult, EngineError> {
        validate_bars(bars)?;
        let result = match kind {
            EpisodeKind::Training => {
                let total = self.config.num_training_episodes;
                let epsilon = self.schedule.epsilon(self.episodes_run, total);
                self.simulate(bars, kind, self.episodes_run, epsilon)
            }
            EpisodeKind::Evaluation => self.simulate(bars, kind, self.episodes_run, 0.0),
        };
        Ok(result)
    }

    fn simulate(
        &mut self,
        bars: &[MarketBar],
        kind: EpisodeKind,
        episode: usize,
        epsilon: f64,
    ) -> EpisodeResult {
        let learn = kind == EpisodeKind::Training;
        let limit = self
            .config
            .max_bars_per_episode
            .map_or(bars.len(), |max| max.min(bars.len()));
        let bars = &bars[..limit];
        let lookback = self.encoder.config().change_lookback;
        let (alpha, gamma) = (self.config.alpha, self.config.gamma);

        self.positions.reset();
        let mut steps = Vec::with_capacity(bars.len());
        let mut trades = Vec::new();
        let mut equity = 1.0;

        let mut state = match bars.first() {
            Some(first) => self.encoder.encode(first, &[]),
            None => return Self::empty_result(kind, episode, epsilon),
        };

        for (t, bar) in bars.iter().enumerate() {
            let side_before = self.positions.side();
            let available = Action::available(side_before);
            let chosen = self.policy.select(&self.qtable, &state, available, epsilon);
            let outcome = self.positions.apply_action(chosen, bar);

            let price_delta = if !side_before.is_flat() && !outcome.side_after.is_flat() && t > 0 {
                bar.close - bars[t - 1].close
            } else {
                0.0
            };
            let mut reward = self.reward_fn.reward(&Transition {
                realized_pnl: outcome.realized_pnl,
                entry_price: outcome.entry_price,
                exit_reason: outcome.exit_reason,
                side_after: outcome.side_after,
                price_delta,
            });

            let mut realized_pnl = outcome.realized_pnl;
            let mut exit_reason = outcome.exit_reason;
            if let Some(trade) = outcome.trade {
                equity *= 1.0 + trade.return_fraction();
                trades.push(trade);
            }

            let is_last = t + 1 == bars.len();
            if is_last {
                if let Some(trade) =
                    self.positions
                        .force_close(bar.close, bar.timestamp, ExitReason::EndOfData)
                {
                    reward += self.reward_fn.reward(&Transition {
                        realized_pnl: trade.pnl,
                        entry_price: Some(trade.entry_price),
                        exit_reason: Some(ExitReason::EndOfData),
                        side_after: PositionSide::Flat,
                        price_delta: 0.0,
                    });
                    realized_pnl += trade.pnl;
                    exit_reason = Some(ExitReason::EndOfData);
                    equity *= 1.0 + trade.return_fraction();
                    trades.push(trade);
                }
            }

            let side_after = self.positions.side();
            let next_state = if is_last {
                None
            } else {
                let next_bar = &bars[t + 1];
                let history = &bars[(t + 1).saturating_sub(lookback)..=t];
                Some(self.encoder.encode(next_bar, history))
            };

            if learn {
                let next = next_state
                    .as_ref()
                    .map(|s| (s, Action::available(side_after)));
                self.qtable.update(state, chosen, reward, next, alpha, gamma);
            }

            if outcome.executed_action != chosen {
                debug!(
                    step = t,
                    chosen = %chosen,
                    executed = %outcome.executed_action,
                    "Chosen action overridden"
                );
            }

            steps.push(StepRecord {
                timestamp: bar.timestamp,
                close: bar.close,
                state,
                chosen_action: chosen,
                executed_action: outcome.executed_action,
                reward,
                realized_pnl,
                exit_reason,
                side_after,
                cumulative_return: equity - 1.0,
            });

            if let Some(next) = next_state {
                state = next;
            }
        }

        if learn {
            self.episodes_run += 1;
        }

        EpisodeResult {
            kind,
            episode,
            epsilon,
            steps,
            trades,
        }
    }

    fn empty_result(kind: EpisodeKind, episode: usize, epsilon: f64) -> EpisodeResult {
        EpisodeResult {
            kind,
            episode,
            epsilon,
            steps: Vec::new(),
            trades: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DataValidationError;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};

    fn bars_from_closes(closes: &[f64]) -> Vec<MarketBar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| MarketBar {
                timestamp: start + Duration::hours(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1.0,
                rsi: 50.0,
                ema: close,
                aroon_up: 50.0,
                aroon_down: 50.0,
                price_change_pct: 0.0,
            })
            .collect()
    }

    fn agent(episodes: usize) -> AgentConfig {
        AgentConfig {
            num_training_episodes: episodes,
            ..Default::default()
        }
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let config = AgentConfig { alpha: 1.5, ..Default::default() };
        assert!(matches!(
            QLearningTrainer::new(config, EncoderConfig::default()),
            Err(ConfigError::InvalidAlpha(_))
        ));
    }

    #[test]
    fn test_empty_bars_rejected_without_mutation() {
        let mut trainer = QLearningTrainer::new(agent(3), EncoderConfig::default()).unwrap();
        let err = trainer.run(&[]).unwrap_err();
        assert!(matches!(err, EngineError::Data(DataValidationError::Empty)));
        assert!(trainer.qtable().is_empty());
        assert_eq!(trainer.episodes_run(), 0);
    }

    #[test]
    fn test_runs_training_then_evaluation() {
        let bars = bars_from_closes(&[100.0, 101.0, 99.0, 102.0, 103.0, 101.0]);
        let mut trainer = QLearningTrainer::new(agent(4), EncoderConfig::default()).unwrap();
        let run = trainer.run(&bars).unwrap();

        assert_eq!(run.training.len(), 4);
        assert_eq!(run.evaluation.kind, EpisodeKind::Evaluation);
        assert_eq!(run.evaluation.epsilon, 0.0);
        assert_eq!(run.evaluation.steps.len(), bars.len());
        assert_eq!(run.evaluation.final_side(), PositionSide::Flat);
        assert_eq!(trainer.episodes_run(), 4);
    }

    #[test]
    fn test_evaluation_does_not_mutate_table() {
        let bars = bars_from_closes(&[100.0, 102.0, 101.0, 104.0, 103.0]);
        let mut trainer = QLearningTrainer::new(agent(2), EncoderConfig::default()).unwrap();
        trainer.run(&bars).unwrap();
        let before = trainer.qtable().entries();
        trainer.run_episode(&bars, EpisodeKind::Evaluation).unwrap();
        assert_eq!(trainer.qtable().entries(), before);
    }

    #[test]
    fn test_max_bars_per_episode() {
        let bars = bars_from_closes(&[100.0, 101.0, 102.0, 103.0, 104.0]);
        let config = AgentConfig {
            max_bars_per_episode: Some(3),
            ..agent(1)
        };
        let mut trainer = QLearningTrainer::new(config, EncoderConfig::default()).unwrap();
        let run = trainer.run(&bars).unwrap();
        assert_eq!(run.evaluation.steps.len(), 3);
        assert_eq!(run.evaluation.final_side(), PositionSide::Flat);
    }

    #[test]
    fn test_end_of_data_force_close() {
        let bars = bars_from_closes(&[100.0, 101.0, 102.0]);
        let mut trainer = QLearningTrainer::new(agent(1), EncoderConfig::default()).unwrap();
        let state = StateEncoder::default().encode(&bars[0], &[]);
        trainer.qtable_mut().set(state, Action::OpenLong, 1.0);
        trainer.qtable_mut().set(state, Action::Hold, 0.5);

        let result = trainer.run_episode(&bars, EpisodeKind::Evaluation).unwrap();
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].exit_reason, ExitReason::EndOfData);
        assert_relative_eq!(result.trades[0].pnl, 2.0, epsilon = 1e-9);
        assert_relative_eq!(result.total_return(), 0.02, epsilon = 1e-9);
        assert_eq!(result.steps[2].exit_reason, Some(ExitReason::EndOfData));
    }
}
