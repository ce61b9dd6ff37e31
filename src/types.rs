//! Core data types used across the trading system

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for raw candle data
#[derive(Debug, Error)]
pub enum CandleValidationError {
    #[error("high ({high}) must be >= low ({low})")]
    HighLessThanLow { high: f64, low: f64 },

    #[error("volume ({0}) must be >= 0")]
    NegativeVolume(f64),

    #[error("close ({close}) must be between low ({low}) and high ({high})")]
    CloseOutOfRange { close: f64, low: f64, high: f64 },

    #[error("prices must be positive: open={open}, high={high}, low={low}, close={close}")]
    NonPositivePrice {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },
}

/// OHLCV candlestick data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub datetime: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Create a new candle with validation
    pub fn new(
        datetime: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, CandleValidationError> {
        let candle = Self {
            datetime,
            open,
            high,
            low,
            close,
            volume,
        };
        candle.validate()?;
        Ok(candle)
    }

    /// Validate the candle data
    pub fn validate(&self) -> Result<(), CandleValidationError> {
        if self.open <= 0.0 || self.high <= 0.0 || self.low <= 0.0 || self.close <= 0.0 {
            return Err(CandleValidationError::NonPositivePrice {
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }

        if self.high < self.low {
            return Err(CandleValidationError::HighLessThanLow {
                high: self.high,
                low: self.low,
            });
        }

        if self.volume < 0.0 {
            return Err(CandleValidationError::NegativeVolume(self.volume));
        }

        if self.close < self.low || self.close > self.high {
            return Err(CandleValidationError::CloseOutOfRange {
                close: self.close,
                low: self.low,
                high: self.high,
            });
        }

        Ok(())
    }
}

/// One time step of market data with its pre-computed indicators.
///
/// This is the only input the simulation loop consumes. Bars are produced
/// once by the feature stage (or loaded from a feature CSV) and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Relative strength index, 0..=100
    pub rsi: f64,
    /// Exponential moving average of close
    pub ema: f64,
    /// Aroon up, 0..=100
    pub aroon_up: f64,
    /// Aroon down, 0..=100
    pub aroon_down: f64,
    /// Close-to-close change in percent (1.5 == +1.5%)
    pub price_change_pct: f64,
}

impl MarketBar {
    /// Named numeric fields, used by validation to report the offending column
    pub fn fields(&self) -> [(&'static str, f64); 10] {
        [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
            ("rsi", self.rsi),
            ("ema", self.ema),
            ("aroon_up", self.aroon_up),
            ("aroon_down", self.aroon_down),
            ("price_change_pct", self.price_change_pct),
        ]
    }
}

/// Trading pair symbol
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol(pub String);

impl Symbol {
    pub fn new(s: impl Into<String>) -> Self {
        Symbol(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which way the single open position faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PositionSide {
    #[default]
    Flat,
    Long,
    Short,
}

impl PositionSide {
    /// +1 for long, -1 for short, 0 when flat
    pub fn direction(self) -> f64 {
        match self {
            PositionSide::Flat => 0.0,
            PositionSide::Long => 1.0,
            PositionSide::Short => -1.0,
        }
    }

    pub fn is_flat(self) -> bool {
        self == PositionSide::Flat
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionSide::Flat => write!(f, "FLAT"),
            PositionSide::Long => write!(f, "LONG"),
            PositionSide::Short => write!(f, "SHORT"),
        }
    }
}

/// Agent action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    OpenLong,
    OpenShort,
    Hold,
    Close,
}

impl Action {
    pub const ALL: [Action; 4] = [
        Action::OpenLong,
        Action::OpenShort,
        Action::Hold,
        Action::Close,
    ];

    /// Actions that are structurally valid from the given position side
    pub fn available(side: PositionSide) -> &'static [Action] {
        match side {
            PositionSide::Flat => &[Action::OpenLong, Action::OpenShort, Action::Hold],
            PositionSide::Long | PositionSide::Short => &[Action::Hold, Action::Close],
        }
    }

    pub fn is_available(self, side: PositionSide) -> bool {
        Action::available(side).contains(&self)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::OpenLong => write!(f, "OPEN_LONG"),
            Action::OpenShort => write!(f, "OPEN_SHORT"),
            Action::Hold => write!(f, "HOLD"),
            Action::Close => write!(f, "CLOSE"),
        }
    }
}

/// Why a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    /// Agent chose CLOSE
    Signal,
    StopLoss,
    TakeProfit,
    /// Still open after the last bar of the episode
    EndOfData,
}

impl ExitReason {
    /// True when the exit overrode whatever the agent chose
    pub fn is_forced(self) -> bool {
        matches!(self, ExitReason::StopLoss | ExitReason::TakeProfit)
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::Signal => write!(f, "Signal"),
            ExitReason::StopLoss => write!(f, "Stop Loss"),
            ExitReason::TakeProfit => write!(f, "Take Profit"),
            ExitReason::EndOfData => write!(f, "End of data"),
        }
    }
}

/// Completed trade record (one unit of the asset)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub side: PositionSide,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    /// Realized P&L in price units: (exit - entry) * direction
    pub pnl: f64,
    pub exit_reason: ExitReason,
}

impl Trade {
    /// Fractional return on entry price (0.03 == +3%)
    pub fn return_fraction(&self) -> f64 {
        if self.entry_price == 0.0 {
            return 0.0;
        }
        self.pnl / self.entry_price
    }

    /// Return in percent
    pub fn return_pct(&self) -> f64 {
        self.return_fraction() * 100.0
    }
}

/// Performance statistics for one evaluated episode
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Compounded strategy return, percent
    pub total_return: f64,
    /// Buy-and-hold return over the same bars, percent
    pub benchmark_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    /// Percent
    pub max_drawdown: f64,
    /// Longest stretch of bars spent below a prior equity peak
    pub max_drawdown_duration: usize,
    /// Bars from the deepest trough back to the prior peak (None if never recovered)
    pub time_to_recover: Option<usize>,
    pub win_rate: f64,
    pub profit_factor: f64,
    /// Average return per trade, percent
    pub expectancy: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub stop_loss_exits: usize,
    pub take_profit_exits: usize,
    /// Percent
    pub avg_win: f64,
    /// Percent
    pub avg_loss: f64,
    /// Percent
    pub largest_win: f64,
    /// Percent
    pub largest_loss: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candle_validation() {
        let now = Utc::now();
        assert!(Candle::new(now, 100.0, 105.0, 95.0, 102.0, 10.0).is_ok());
        assert!(matches!(
            Candle::new(now, 100.0, 95.0, 105.0, 100.0, 10.0),
            Err(CandleValidationError::HighLessThanLow { .. })
        ));
        assert!(matches!(
            Candle::new(now, 100.0, 105.0, 95.0, 110.0, 10.0),
            Err(CandleValidationError::CloseOutOfRange { .. })
        ));
        assert!(matches!(
            Candle::new(now, 0.0, 105.0, 95.0, 100.0, 10.0),
            Err(CandleValidationError::NonPositivePrice { .. })
        ));
    }

    #[test]
    fn test_available_actions() {
        assert_eq!(
            Action::available(PositionSide::Flat),
            &[Action::OpenLong, Action::OpenShort, Action::Hold]
        );
        assert!(Action::Close.is_available(PositionSide::Long));
        assert!(!Action::OpenLong.is_available(PositionSide::Long));
        assert!(!Action::Close.is_available(PositionSide::Flat));
        assert!(Action::Hold.is_available(PositionSide::Short));
    }

    #[test]
    fn test_trade_return() {
        let now = Utc::now();
        let trade = Trade {
            side: PositionSide::Short,
            entry_price: 100.0,
            exit_price: 90.0,
            entry_time: now,
            exit_time: now,
            pnl: 10.0,
            exit_reason: ExitReason::Signal,
        };
        assert!((trade.return_pct() - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_action_serde_names() {
        let json = serde_json::to_string(&Action::OpenLong).unwrap();
        assert_eq!(json, "\"open_long\"");
        let parsed: Action = serde_json::from_str("\"close\"").unwrap();
        assert_eq!(parsed, Action::Close);
    }
}
