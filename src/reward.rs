//! Reward function
//!
//! Rewards are fractional returns on entry price so that BTC and ETH runs
//! live on the same scale.

use serde::{Deserialize, Serialize};

use crate::{ExitReason, PositionSide};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardConfig {
    /// Multiplier for losing stop-loss exits (>= 1)
    pub stop_loss_penalty: f64,
    pub shaping_enabled: bool,
    pub shaping_weight: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            stop_loss_penalty: 1.5,
            shaping_enabled: false,
            shaping_weight: 0.1,
        }
    }
}

/// Everything the reward depends on for one step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub realized_pnl: f64,
    /// Entry price of the closed or still-open position
    pub entry_price: Option<f64>,
    pub exit_reason: Option<ExitReason>,
    /// Side after the step
    pub side_after: PositionSide,
    /// close_t - close_{t-1}
    pub price_delta: f64,
}

#[derive(Debug, Clone, Default)]
pub struct RewardFunction {
    config: RewardConfig,
}

impl RewardFunction {
    pub fn new(config: RewardConfig) -> Self {
        RewardFunction { config }
    }

    pub fn config(&self) -> &RewardConfig {
        &self.config
    }

    pub fn reward(&self, t: &Transition) -> f64 {
        let entry = match t.entry_price {
            Some(p) if p > 0.0 => p,
            _ => return 0.0,
        };

        let mut reward = if t.exit_reason.is_some() {
            t.realized_pnl / entry
        } else {
            0.0
        };

        if t.exit_reason == Some(ExitReason::StopLoss) && reward < 0.0 {
            reward *= self.config.stop_loss_penalty;
        }

        if self.config.shaping_enabled && !t.side_after.is_flat() {
            reward +=
                self.config.shaping_weight * t.price_delta * t.side_after.direction() / entry;
        }

        reward
    }
}
