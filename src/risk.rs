//! Position and risk management
//!
//! Tracks the single position an agent may hold and enforces stop-loss and
//! take-profit exits before the agent's chosen action is honored.
//!
//! All P&L is per unit of the asset, in price units:
//! ```text
//! realized_pnl = (exit_price - entry_price) * direction
//! ```
//! where direction is +1 for long and -1 for short.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Action, ExitReason, MarketBar, PositionSide, Trade};

/// Configuration for PositionManager using builder pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Stop distance as a fraction of entry (0.03 = 3%)
    pub stop_loss_fraction: f64,
    pub take_profit_fraction: Option<f64>,
    pub trailing_stop: bool,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            stop_loss_fraction: 0.03,
            take_profit_fraction: None,
            trailing_stop: false,
        }
    }
}

impl RiskConfig {
    /// Set stop-loss distance as a fraction (e.g., 0.03 = 3%)
    pub fn with_stop_loss(mut self, fraction: f64) -> Self {
        self.stop_loss_fraction = fraction;
        self
    }

    /// Enable a take-profit target at the given fraction
    pub fn with_take_profit(mut self, fraction: f64) -> Self {
        self.take_profit_fraction = Some(fraction);
        self
    }

    pub fn with_trailing_stop(mut self, enabled: bool) -> Self {
        self.trailing_stop = enabled;
        self
    }

    /// Build the PositionManager
    pub fn build(self) -> PositionManager {
        PositionManager::new(self)
    }
}

/// The open position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub side: PositionSide,
    pub entry_price: f64,
    pub stop_loss_price: f64,
    pub take_profit_price: Option<f64>,
    pub entry_time: DateTime<Utc>,
}

impl Position {
    /// Unrealized P&L per unit at `price`
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        (price - self.entry_price) * self.side.direction()
    }

    fn stop_triggered(&self, bar: &MarketBar) -> bool {
        match self.side {
            PositionSide::Long => bar.low <= self.stop_loss_price,
            PositionSide::Short => bar.high >= self.stop_loss_price,
            PositionSide::Flat => false,
        }
    }

    fn target_triggered(&self, bar: &MarketBar) -> Option<f64> {
        let target = self.take_profit_price?;
        let hit = match self.side {
            PositionSide::Long => bar.high >= target,
            PositionSide::Short => bar.low <= target,
            PositionSide::Flat => false,
        };
        hit.then_some(target)
    }
}

/// What happened to the position on one bar
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// Action the agent asked for
    pub requested_action: Action,
    /// Action actually applied (Close on a forced exit, Hold on an invalid request)
    pub executed_action: Action,
    /// Realized P&L per unit, 0 if nothing closed
    pub realized_pnl: f64,
    /// Entry price of the position involved in this step, if any
    pub entry_price: Option<f64>,
    pub exit_reason: Option<ExitReason>,
    pub side_after: PositionSide,
    pub trade: Option<Trade>,
}

impl StepOutcome {
    /// True when a stop or target overrode the agent
    pub fn forced_close(&self) -> bool {
        self.exit_reason.is_some_and(ExitReason::is_forced)
    }
}

/// Owns the position and is the only thing that mutates it
#[derive(Debug, Clone)]
pub struct PositionManager {
    config: RiskConfig,
    position: Option<Position>,
}

impl PositionManager {
    pub fn new(config: RiskConfig) -> Self {
        PositionManager { config, position: None }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn side(&self) -> PositionSide {
        self.position.as_ref().map_or(PositionSide::Flat, |p| p.side)
    }

    /// Back to flat, discarding any open position (episode start)
    pub fn reset(&mut self) {
        self.position = None;
    }

    /// Check stops against `bar`, then apply `action` at the bar's close.
    pub fn apply_action(&mut self, action: Action, bar: &MarketBar) -> StepOutcome {
        if let Some(outcome) = self.check_exits(action, bar) {
            return outcome;
        }

        let side = self.side();
        let executed = if action.is_available(side) {
            action
        } else {
            debug!(
                requested = %action,
                side = %side,
                "InvalidActionRequest: downgraded to HOLD"
            );
            Action::Hold
        };

        let outcome = match executed {
            Action::OpenLong => self.open(PositionSide::Long, action, bar),
            Action::OpenShort => self.open(PositionSide::Short, action, bar),
            Action::Close => match self.close(bar.close, bar.timestamp, ExitReason::Signal) {
                Some(trade) => self.closed_outcome(action, Action::Close, trade),
                None => self.hold_outcome(action),
            },
            Action::Hold => self.hold_outcome(action),
        };

        if self.config.trailing_stop {
            self.ratchet_stop(bar.close);
        }

        outcome
    }

    /// Close any open position at `price` (end of data)
    pub fn force_close(
        &mut self,
        price: f64,
        time: DateTime<Utc>,
        reason: ExitReason,
    ) -> Option<Trade> {
        self.close(price, time, reason)
    }

    fn check_exits(&mut self, requested: Action, bar: &MarketBar) -> Option<StepOutcome> {
        let position = self.position.as_ref()?;

        // Stop-loss has precedence over take-profit on the same bar
        let (price, reason) = if position.stop_triggered(bar) {
            (position.stop_loss_price, ExitReason::StopLoss)
        } else if let Some(target) = position.target_triggered(bar) {
            (target, ExitReason::TakeProfit)
        } else {
            return None;
        };

        let trade = self.close(price, bar.timestamp, reason)?;
        Some(self.closed_outcome(requested, Action::Close, trade))
    }

    fn open(&mut self, side: PositionSide, requested: Action, bar: &MarketBar) -> StepOutcome {
        let entry = bar.close;
        let direction = side.direction();
        let position = Position {
            side,
            entry_price: entry,
            stop_loss_price: entry - direction * self.config.stop_loss_fraction * entry,
            take_profit_price: self
                .config
                .take_profit_fraction
                .map(|tp| entry + direction * tp * entry),
            entry_time: bar.timestamp,
        };
        debug!(
            side = %side,
            entry = entry,
            stop = position.stop_loss_price,
            "Position opened"
        );
        self.position = Some(position);

        StepOutcome {
            requested_action: requested,
            executed_action: requested,
            realized_pnl: 0.0,
            entry_price: Some(entry),
            exit_reason: None,
            side_after: side,
            trade: None,
        }
    }

    fn close(&mut self, price: f64, time: DateTime<Utc>, reason: ExitReason) -> Option<Trade> {
        let position = self.position.take()?;
        let trade = Trade {
            side: position.side,
            entry_price: position.entry_price,
            exit_price: price,
            entry_time: position.entry_time,
            exit_time: time,
            pnl: position.unrealized_pnl(price),
            exit_reason: reason,
        };
        debug!(
            side = %trade.side,
            entry = trade.entry_price,
            exit = trade.exit_price,
            pnl = trade.pnl,
            reason = %reason,
            "Position closed"
        );
        Some(trade)
    }

    fn ratchet_stop(&mut self, close: f64) {
        let fraction = self.config.stop_loss_fraction;
        if let Some(position) = self.position.as_mut() {
            match position.side {
                PositionSide::Long => {
                    let candidate = close - fraction * close;
                    if candidate > position.stop_loss_price {
                        position.stop_loss_price = candidate;
                    }
                }
                PositionSide::Short => {
                    let candidate = close + fraction * close;
                    if candidate < position.stop_loss_price {
                        position.stop_loss_price = candidate;
                    }
                }
                PositionSide::Flat => {}
            }
        }
    }

    fn closed_outcome(&self, requested: Action, executed: Action, trade: Trade) -> StepOutcome {
        StepOutcome {
            requested_action: requested,
            executed_action: executed,
            realized_pnl: trade.pnl,
            entry_price: Some(trade.entry_price),
            exit_reason: Some(trade.exit_reason),
            side_after: PositionSide::Flat,
            trade: Some(trade),
        }
    }

    fn hold_outcome(&self, requested: Action) -> StepOutcome {
        StepOutcome {
            requested_action: requested,
            executed_action: Action::Hold,
            realized_pnl: 0.0,
            entry_price: self.position.as_ref().map(|p| p.entry_price),
            exit_reason: None,
            side_after: self.side(),
            trade: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};

    fn bar(i: i64, high: f64, low: f64, close: f64) -> MarketBar {
        MarketBar {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(i),
            open: close,
            high,
            low,
            close,
            volume: 1.0,
            rsi: 50.0,
            ema: close,
            aroon_up: 50.0,
            aroon_down: 50.0,
            price_change_pct: 0.0,
        }
    }

    fn flat_bar(i: i64, close: f64) -> MarketBar {
        bar(i, close, close, close)
    }

    #[test]
    fn test_open_sets_entry_and_stop() {
        let mut pm = RiskConfig::default().with_stop_loss(0.03).build();
        let outcome = pm.apply_action(Action::OpenLong, &flat_bar(0, 100.0));
        assert_eq!(outcome.side_after, PositionSide::Long);
        let position = pm.position().unwrap();
        assert_relative_eq!(position.entry_price, 100.0);
        assert_relative_eq!(position.stop_loss_price, 97.0);

        let mut pm = RiskConfig::default().with_take_profit(0.05).build();
        pm.apply_action(Action::OpenShort, &flat_bar(0, 200.0));
        let position = pm.position().unwrap();
        assert_relative_eq!(position.stop_loss_price, 206.0);
        assert_relative_eq!(position.take_profit_price.unwrap(), 190.0);
    }

    #[test]
    fn test_stop_loss_overrides_hold() {
        let mut pm = RiskConfig::default().build();
        pm.apply_action(Action::OpenLong, &flat_bar(0, 100.0));
        pm.apply_action(Action::Hold, &flat_bar(1, 105.0));
        let outcome = pm.apply_action(Action::Hold, &flat_bar(2, 95.0));

        assert!(outcome.forced_close());
        assert_eq!(outcome.executed_action, Action::Close);
        assert_eq!(outcome.exit_reason, Some(ExitReason::StopLoss));
        assert_relative_eq!(outcome.realized_pnl, -3.0, epsilon = 1e-9);
        assert_eq!(pm.side(), PositionSide::Flat);
    }

    #[test]
    fn test_stop_outcome_carries_trade() {
        let mut pm = RiskConfig::default().with_stop_loss(0.5).build();
        let open = flat_bar(0, 100.0);
        pm.apply_action(Action::OpenLong, &open);
        let hit = bar(1, 60.0, 40.0, 45.0);
        let outcome = pm.apply_action(Action::Hold, &hit);

        let expected = StepOutcome {
            requested_action: Action::Hold,
            executed_action: Action::Close,
            realized_pnl: -50.0,
            entry_price: Some(100.0),
            exit_reason: Some(ExitReason::StopLoss),
            side_after: PositionSide::Flat,
            trade: Some(Trade {
                side: PositionSide::Long,
                entry_price: 100.0,
                exit_price: 50.0,
                entry_time: open.timestamp,
                exit_time: hit.timestamp,
                pnl: -50.0,
                exit_reason: ExitReason::StopLoss,
            }),
        };
        assert_eq!(outcome, expected);
    }

    #[test]
    fn test_short_stop_uses_high() {
        let mut pm = RiskConfig::default().build();
        pm.apply_action(Action::OpenShort, &flat_bar(0, 100.0));
        let outcome = pm.apply_action(Action::Hold, &bar(1, 104.0, 99.0, 100.0));
        assert_eq!(outcome.exit_reason, Some(ExitReason::StopLoss));
        assert_relative_eq!(outcome.realized_pnl, -3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_stop_checked_before_target() {
        let mut pm = RiskConfig::default().with_take_profit(0.02).build();
        pm.apply_action(Action::OpenLong, &flat_bar(0, 100.0));
        // Wide bar touches both the stop (97) and the target (102)
        let outcome = pm.apply_action(Action::Hold, &bar(1, 103.0, 96.0, 100.0));
        assert_eq!(outcome.exit_reason, Some(ExitReason::StopLoss));
    }

    #[test]
    fn test_take_profit_fills_at_target() {
        let mut pm = RiskConfig::default().with_take_profit(0.02).build();
        pm.apply_action(Action::OpenLong, &flat_bar(0, 100.0));
        let outcome = pm.apply_action(Action::Hold, &bar(1, 104.0, 99.0, 103.0));
        assert_eq!(outcome.exit_reason, Some(ExitReason::TakeProfit));
        assert_relative_eq!(outcome.realized_pnl, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_invalid_actions_become_hold() {
        let mut pm = RiskConfig::default().build();
        let outcome = pm.apply_action(Action::Close, &flat_bar(0, 100.0));
        assert_eq!(outcome.executed_action, Action::Hold);
        assert_eq!(pm.side(), PositionSide::Flat);

        pm.apply_action(Action::OpenLong, &flat_bar(1, 100.0));
        let outcome = pm.apply_action(Action::OpenShort, &flat_bar(2, 101.0));
        assert_eq!(outcome.executed_action, Action::Hold);
        assert_eq!(pm.side(), PositionSide::Long);
        // Entry is set once per position lifecycle
        assert_relative_eq!(pm.position().unwrap().entry_price, 100.0);
    }

    #[test]
    fn test_signal_close_realizes_pnl() {
        let mut pm = RiskConfig::default().build();
        pm.apply_action(Action::OpenShort, &flat_bar(0, 100.0));
        let outcome = pm.apply_action(Action::Close, &flat_bar(1, 98.0));
        assert_eq!(outcome.exit_reason, Some(ExitReason::Signal));
        assert!(!outcome.forced_close());
        assert_relative_eq!(outcome.realized_pnl, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_trailing_stop_only_tightens() {
        let mut pm = RiskConfig::default().with_trailing_stop(true).build();
        pm.apply_action(Action::OpenLong, &flat_bar(0, 100.0));
        pm.apply_action(Action::Hold, &flat_bar(1, 110.0));
        assert_relative_eq!(pm.position().unwrap().stop_loss_price, 106.7, epsilon = 1e-9);

        pm.apply_action(Action::Hold, &flat_bar(2, 108.0));
        assert_relative_eq!(pm.position().unwrap().stop_loss_price, 106.7, epsilon = 1e-9);

        let outcome = pm.apply_action(Action::Hold, &flat_bar(3, 105.0));
        assert_eq!(outcome.exit_reason, Some(ExitReason::StopLoss));
        assert!(outcome.realized_pnl > 0.0);
    }

    #[test]
    fn test_force_close_and_reset() {
        let mut pm = RiskConfig::default().build();
        assert!(pm.force_close(100.0, Utc::now(), ExitReason::EndOfData).is_none());

        pm.apply_action(Action::OpenLong, &flat_bar(0, 100.0));
        let trade = pm
            .force_close(101.0, Utc::now(), ExitReason::EndOfData)
            .unwrap();
        assert_relative_eq!(trade.pnl, 1.0);
        assert_eq!(pm.side(), PositionSide::Flat);

        pm.apply_action(Action::OpenLong, &flat_bar(1, 100.0));
        pm.reset();
        assert!(pm.position().is_none());
    }
}
