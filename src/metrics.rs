//! Performance metrics for an evaluated episode
//!
//! Trades are one unit each, so trade statistics are expressed as percent
//! returns on entry price rather than currency amounts.

use chrono::{DateTime, Utc};
use statrs::statistics::Statistics;

use crate::backtest::EpisodeResult;
use crate::{ExitReason, PerformanceMetrics, Trade};

/// Crypto markets trade around the clock
const SECONDS_PER_YEAR: f64 = 365.0 * 24.0 * 3600.0;
/// 5% annual risk-free rate
const RISK_FREE_RATE: f64 = 0.05;

/// Mark-to-market equity (starting at 1.0) after every step.
///
/// Realized returns compound; an open position contributes its unrealized
/// return at the step's close.
pub fn equity_curve(result: &EpisodeResult) -> Vec<(DateTime<Utc>, f64)> {
    let mut curve = Vec::with_capacity(result.steps.len());
    let mut realized = 1.0;
    let mut trades = result.trades.iter().peekable();

    for step in &result.steps {
        // Fold in every trade that has closed by this step
        while let Some(trade) = trades.peek() {
            if trade.exit_time <= step.timestamp {
                realized *= 1.0 + trade.return_fraction();
                trades.next();
            } else {
                break;
            }
        }

        let unrealized = trades
            .peek()
            .filter(|t| t.entry_time <= step.timestamp)
            .map_or(0.0, |t| {
                (step.close - t.entry_price) * t.side.direction() / t.entry_price
            });

        curve.push((step.timestamp, realized * (1.0 + unrealized)));
    }

    curve
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DrawdownStats {
    /// Fraction (0.1 == 10%)
    pub max_drawdown: f64,
    pub max_duration: usize,
    /// Bars from the deepest trough back to its prior peak
    pub time_to_recover: Option<usize>,
}

pub fn drawdown_stats(equity: &[f64]) -> DrawdownStats {
    let mut stats = DrawdownStats::default();
    let Some(&first) = equity.first() else {
        return stats;
    };

    let mut peak = first;
    let mut trough_idx = 0;
    let mut trough_peak = first;
    let mut underwater = 0usize;

    for (i, &value) in equity.iter().enumerate() {
        if value >= peak {
            peak = value;
            underwater = 0;
            continue;
        }
        underwater += 1;
        stats.max_duration = stats.max_duration.max(underwater);

        let dd = (peak - value) / peak;
        if dd > stats.max_drawdown {
            stats.max_drawdown = dd;
            trough_idx = i;
            trough_peak = peak;
        }
    }

    if stats.max_drawdown > 0.0 {
        stats.time_to_recover = equity[trough_idx..]
            .iter()
            .position(|&v| v >= trough_peak);
    }

    stats
}

/// Periods per year implied by the average bar spacing
fn periods_per_year(curve: &[(DateTime<Utc>, f64)]) -> f64 {
    match (curve.first(), curve.last()) {
        (Some(first), Some(last)) if curve.len() > 1 => {
            let seconds = (last.0 - first.0).num_seconds() as f64 / (curve.len() - 1) as f64;
            if seconds > 0.0 {
                SECONDS_PER_YEAR / seconds
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

fn trade_stats(trades: &[Trade], metrics: &mut PerformanceMetrics) {
    let returns: Vec<f64> = trades.iter().map(Trade::return_pct).collect();
    let wins: Vec<f64> = returns.iter().copied().filter(|&r| r > 0.0).collect();
    let losses: Vec<f64> = returns.iter().copied().filter(|&r| r <= 0.0).collect();

    metrics.total_trades = trades.len();
    metrics.winning_trades = wins.len();
    metrics.losing_trades = losses.len();
    metrics.stop_loss_exits = trades
        .iter()
        .filter(|t| t.exit_reason == ExitReason::StopLoss)
        .count();
    metrics.take_profit_exits = trades
        .iter()
        .filter(|t| t.exit_reason == ExitReason::TakeProfit)
        .count();

    if trades.is_empty() {
        return;
    }

    metrics.win_rate = wins.len() as f64 / trades.len() as f64 * 100.0;

    let gross_profits: f64 = wins.iter().sum();
    let gross_losses: f64 = losses.iter().map(|l| l.abs()).sum();
    metrics.profit_factor = if gross_losses > 0.0 {
        gross_profits / gross_losses
    } else if gross_profits > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };

    metrics.expectancy = returns.iter().mean();
    if !wins.is_empty() {
        metrics.avg_win = gross_profits / wins.len() as f64;
    }
    if !losses.is_empty() {
        metrics.avg_loss = gross_losses / losses.len() as f64;
    }
    metrics.largest_win = wins.iter().copied().fold(0.0, f64::max);
    metrics.largest_loss = losses.iter().copied().fold(0.0, f64::min);
}

/// Compute the full metric set for one (evaluation) episode
pub fn calculate_metrics(result: &EpisodeResult) -> PerformanceMetrics {
    let mut metrics = PerformanceMetrics::default();
    trade_stats(&result.trades, &mut metrics);

    if let (Some(first), Some(last)) = (result.steps.first(), result.steps.last()) {
        metrics.benchmark_return = (last.close / first.close - 1.0) * 100.0;
    }
    metrics.total_return = result.total_return() * 100.0;

    let curve = equity_curve(result);
    if curve.len() < 2 {
        return metrics;
    }

    let equity: Vec<f64> = curve.iter().map(|(_, e)| *e).collect();
    let drawdown = drawdown_stats(&equity);
    metrics.max_drawdown = drawdown.max_drawdown * 100.0;
    metrics.max_drawdown_duration = drawdown.max_duration;
    metrics.time_to_recover = drawdown.time_to_recover;

    let ppy = periods_per_year(&curve);
    if ppy <= 0.0 {
        return metrics;
    }
    let rf = RISK_FREE_RATE / ppy;

    let returns: Vec<f64> = equity.windows(2).map(|w| (w[1] - w[0]) / w[0]).collect();
    // Volatility from in-market returns only; flat periods would understate risk
    let active: Vec<f64> = returns.iter().copied().filter(|&r| r != 0.0).collect();
    let excess = returns.iter().mean() - rf;

    if active.len() > 1 {
        let std_dev = active.iter().std_dev();
        if std_dev > 0.0 {
            metrics.sharpe_ratio = excess / std_dev * ppy.sqrt();
        }
    }

    let downside: Vec<f64> = returns.iter().map(|&r| r.min(0.0).powi(2)).collect();
    let downside_dev = downside.iter().mean().sqrt();
    if downside_dev > 0.0 {
        metrics.sortino_ratio = excess / downside_dev * ppy.sqrt();
    }

    if drawdown.max_drawdown > 0.0 {
        let years = (curve.len() - 1) as f64 / ppy;
        if years > 0.0 {
            let annualized = (1.0 + metrics.total_return / 100.0).powf(1.0 / years) - 1.0;
            metrics.calmar_ratio = annualized / drawdown.max_drawdown;
        }
    }

    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::{EpisodeKind, StepRecord};
    use crate::encoder::StateKey;
    use crate::{Action, PositionSide};
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};

    fn t(i: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(i)
    }

    fn step(i: i64, close: f64) -> StepRecord {
        StepRecord {
            timestamp: t(i),
            close,
            state: StateKey::all()[0],
            chosen_action: Action::Hold,
            executed_action: Action::Hold,
            reward: 0.0,
            realized_pnl: 0.0,
            exit_reason: None,
            side_after: PositionSide::Flat,
            cumulative_return: 0.0,
        }
    }

    fn trade(entry: i64, exit: i64, entry_price: f64, exit_price: f64, reason: ExitReason) -> Trade {
        Trade {
            side: PositionSide::Long,
            entry_price,
            exit_price,
            entry_time: t(entry),
            exit_time: t(exit),
            pnl: exit_price - entry_price,
            exit_reason: reason,
        }
    }

    #[test]
    fn test_drawdown_stats() {
        let stats = drawdown_stats(&[1.0, 1.2, 0.9, 1.0, 1.3, 1.25]);
        assert_relative_eq!(stats.max_drawdown, 0.25, epsilon = 1e-12);
        assert_eq!(stats.max_duration, 2);
        assert_eq!(stats.time_to_recover, Some(2));

        let never = drawdown_stats(&[1.0, 0.8, 0.9]);
        assert_eq!(never.time_to_recover, None);

        assert_eq!(drawdown_stats(&[]), DrawdownStats::default());
    }

    #[test]
    fn test_equity_curve_marks_open_position() {
        let mut steps = vec![step(0, 100.0), step(1, 110.0), step(2, 105.0), step(3, 105.0)];
        steps[2].cumulative_return = 0.05;
        steps[3].cumulative_return = 0.05;
        let result = EpisodeResult {
            kind: EpisodeKind::Evaluation,
            episode: 0,
            epsilon: 0.0,
            steps,
            trades: vec![trade(0, 2, 100.0, 105.0, ExitReason::Signal)],
        };
        let curve: Vec<f64> = equity_curve(&result).into_iter().map(|(_, e)| e).collect();
        assert_relative_eq!(curve[0], 1.0);
        assert_relative_eq!(curve[1], 1.1, epsilon = 1e-12);
        assert_relative_eq!(curve[2], 1.05, epsilon = 1e-12);
        assert_relative_eq!(curve[3], 1.05, epsilon = 1e-12);
    }

    #[test]
    fn test_trade_statistics() {
        let mut steps: Vec<StepRecord> = (0..6).map(|i| step(i, 100.0)).collect();
        steps[5].cumulative_return = 0.02 * 0.97;
        let result = EpisodeResult {
            kind: EpisodeKind::Evaluation,
            episode: 0,
            epsilon: 0.0,
            steps,
            trades: vec![
                trade(0, 1, 100.0, 103.0, ExitReason::TakeProfit),
                trade(2, 3, 100.0, 97.0, ExitReason::StopLoss),
                trade(3, 4, 100.0, 102.0, ExitReason::Signal),
            ],
        };
        let m = calculate_metrics(&result);
        assert_eq!(m.total_trades, 3);
        assert_eq!(m.winning_trades, 2);
        assert_eq!(m.stop_loss_exits, 1);
        assert_eq!(m.take_profit_exits, 1);
        assert_relative_eq!(m.win_rate, 200.0 / 3.0, epsilon = 1e-9);
        assert_relative_eq!(m.profit_factor, 5.0 / 3.0, epsilon = 1e-9);
        assert_relative_eq!(m.expectancy, 2.0 / 3.0, epsilon = 1e-9);
        assert_relative_eq!(m.largest_loss, -3.0, epsilon = 1e-9);
        assert_relative_eq!(m.benchmark_return, 0.0);
    }

    #[test]
    fn test_no_trades() {
        let result = EpisodeResult {
            kind: EpisodeKind::Evaluation,
            episode: 0,
            epsilon: 0.0,
            steps: (0..10).map(|i| step(i, 100.0 + i as f64)).collect(),
            trades: vec![],
        };
        let m = calculate_metrics(&result);
        assert_eq!(m.total_trades, 0);
        assert_eq!(m.total_return, 0.0);
        assert_eq!(m.max_drawdown, 0.0);
        assert_eq!(m.sharpe_ratio, 0.0);
        assert_relative_eq!(m.benchmark_return, 9.0, epsilon = 1e-9);
    }
}
