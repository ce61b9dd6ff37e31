//! Epsilon-greedy action selection and its exploration schedule

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::DecaySchedule;
use crate::encoder::StateKey;
use crate::qtable::QTable;
use crate::Action;

/// Exploration rate as a function of training episode
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpsilonSchedule {
    pub start: f64,
    pub end: f64,
    pub schedule: DecaySchedule,
    /// Per-episode multiplier (exponential only)
    pub decay: f64,
}

impl Default for EpsilonSchedule {
    fn default() -> Self {
        Self {
            start: 1.0,
            end: 0.05,
            schedule: DecaySchedule::Linear,
            decay: 0.95,
        }
    }
}

impl EpsilonSchedule {
    /// Epsilon for `episode` (0-based) out of `total` training episodes
    pub fn epsilon(&self, episode: usize, total: usize) -> f64 {
        match self.schedule {
            DecaySchedule::Constant => self.start,
            DecaySchedule::Linear => {
                if total <= 1 {
                    return self.start;
                }
                let progress = episode.min(total - 1) as f64 / (total - 1) as f64;
                self.start + (self.end - self.start) * progress
            }
            DecaySchedule::Exponential => {
                let exponent = i32::try_from(episode).unwrap_or(i32::MAX);
                (self.start * self.decay.powi(exponent)).max(self.end)
            }
        }
    }
}

/// Explores uniformly with probability epsilon, otherwise exploits the table
#[derive(Debug, Clone)]
pub struct EpsilonGreedyPolicy {
    rng: StdRng,
}

impl EpsilonGreedyPolicy {
    pub fn new(seed: u64) -> Self {
        EpsilonGreedyPolicy {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn select(
        &mut self,
        qtable: &QTable,
        state: &StateKey,
        available: &[Action],
        epsilon: f64,
    ) -> Action {
        // epsilon <= 0 must not advance the RNG
        if epsilon > 0.0 && self.rng.gen::<f64>() < epsilon {
            return available.choose(&mut self.rng).copied().unwrap_or(Action::Hold);
        }
        qtable.best_action(state, available)
    }
}
