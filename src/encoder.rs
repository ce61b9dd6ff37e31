//! State encoder
//!
//! Discretizes a market bar into a small, fixed key space the Q-table can be
//! indexed by. Every continuous input lands in exactly one bucket; values
//! outside the expected range clamp to the nearest end bucket.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::MarketBar;

/// RSI regime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RsiBucket {
    Oversold,
    Neutral,
    Overbought,
}

impl RsiBucket {
    pub const COUNT: usize = 3;
    pub const ALL: [RsiBucket; 3] = [RsiBucket::Oversold, RsiBucket::Neutral, RsiBucket::Overbought];

    pub fn from_rsi(rsi: f64, oversold: f64, overbought: f64) -> Self {
        if rsi < oversold {
            RsiBucket::Oversold
        } else if rsi > overbought {
            RsiBucket::Overbought
        } else {
            RsiBucket::Neutral
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }
}

/// Close relative to its EMA
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EmaTrend {
    Above,
    Below,
}

impl EmaTrend {
    pub const COUNT: usize = 2;
    pub const ALL: [EmaTrend; 2] = [EmaTrend::Above, EmaTrend::Below];

    pub fn from_close(close: f64, ema: f64) -> Self {
        if close >= ema {
            EmaTrend::Above
        } else {
            EmaTrend::Below
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }
}

/// Which Aroon line dominates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AroonRegime {
    UpDominant,
    DownDominant,
    Neutral,
}

impl AroonRegime {
    pub const COUNT: usize = 3;
    pub const ALL: [AroonRegime; 3] = [
        AroonRegime::UpDominant,
        AroonRegime::DownDominant,
        AroonRegime::Neutral,
    ];

    pub fn from_aroon(aroon_up: f64, aroon_down: f64, margin: f64) -> Self {
        let spread = aroon_up - aroon_down;
        if spread > margin {
            AroonRegime::UpDominant
        } else if spread < -margin {
            AroonRegime::DownDominant
        } else {
            AroonRegime::Neutral
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }
}

/// Signed magnitude of the recent price change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChangeBucket {
    StrongDown,
    Down,
    Flat,
    Up,
    StrongUp,
}

impl ChangeBucket {
    pub const COUNT: usize = 5;
    pub const ALL: [ChangeBucket; 5] = [
        ChangeBucket::StrongDown,
        ChangeBucket::Down,
        ChangeBucket::Flat,
        ChangeBucket::Up,
        ChangeBucket::StrongUp,
    ];

    /// `change_pct` is in percent; thresholds are positive band edges
    pub fn from_change_pct(change_pct: f64, small: f64, large: f64) -> Self {
        if change_pct <= -large {
            ChangeBucket::StrongDown
        } else if change_pct < -small {
            ChangeBucket::Down
        } else if change_pct >= large {
            ChangeBucket::StrongUp
        } else if change_pct > small {
            ChangeBucket::Up
        } else {
            ChangeBucket::Flat
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }
}

/// Discrete market state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateKey {
    pub rsi: RsiBucket,
    pub trend: EmaTrend,
    pub aroon: AroonRegime,
    pub change: ChangeBucket,
}

impl StateKey {
    pub const COUNT: usize =
        RsiBucket::COUNT * EmaTrend::COUNT * AroonRegime::COUNT * ChangeBucket::COUNT;

    /// Dense index in `0..StateKey::COUNT`
    pub fn index(&self) -> usize {
        let mut idx = self.rsi.index();
        idx = idx * EmaTrend::COUNT + self.trend.index();
        idx = idx * AroonRegime::COUNT + self.aroon.index();
        idx * ChangeBucket::COUNT + self.change.index()
    }

    /// Every key, ordered by `index()`
    pub fn all() -> Vec<StateKey> {
        let mut keys = Vec::with_capacity(Self::COUNT);
        for rsi in RsiBucket::ALL {
            for trend in EmaTrend::ALL {
                for aroon in AroonRegime::ALL {
                    for change in ChangeBucket::ALL {
                        keys.push(StateKey { rsi, trend, aroon, change });
                    }
                }
            }
        }
        keys
    }
}

impl std::fmt::Display for StateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}/{:?}/{:?}/{:?}", self.rsi, self.trend, self.aroon, self.change)
    }
}

/// Bucket boundaries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    #[serde(default = "default_rsi_oversold")]
    pub rsi_oversold: f64,
    #[serde(default = "default_rsi_overbought")]
    pub rsi_overbought: f64,
    /// Minimum aroon_up - aroon_down spread for a dominant regime
    #[serde(default = "default_aroon_margin")]
    pub aroon_margin: f64,
    /// Percent
    #[serde(default = "default_change_small_pct")]
    pub change_small_pct: f64,
    /// Percent
    #[serde(default = "default_change_large_pct")]
    pub change_large_pct: f64,
    /// Bars back used for the change bucket (1 = the bar's own change)
    #[serde(default = "default_change_lookback")]
    pub change_lookback: usize,
}

fn default_rsi_oversold() -> f64 { 30.0 }
fn default_rsi_overbought() -> f64 { 70.0 }
fn default_aroon_margin() -> f64 { 20.0 }
fn default_change_small_pct() -> f64 { 0.5 }
fn default_change_large_pct() -> f64 { 2.0 }
fn default_change_lookback() -> usize { 1 }

impl Default for EncoderConfig {
    fn default() -> Self {
        EncoderConfig {
            rsi_oversold: default_rsi_oversold(),
            rsi_overbought: default_rsi_overbought(),
            aroon_margin: default_aroon_margin(),
            change_small_pct: default_change_small_pct(),
            change_large_pct: default_change_large_pct(),
            change_lookback: default_change_lookback(),
        }
    }
}

impl EncoderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0 <= self.rsi_oversold
            && self.rsi_oversold < self.rsi_overbought
            && self.rsi_overbought <= 100.0)
        {
            return Err(ConfigError::InvalidEncoder(format!(
                "rsi thresholds {} / {}",
                self.rsi_oversold, self.rsi_overbought
            )));
        }
        if !(self.aroon_margin >= 0.0 && self.aroon_margin.is_finite()) {
            return Err(ConfigError::InvalidEncoder(format!(
                "aroon_margin {}",
                self.aroon_margin
            )));
        }
        if !(0.0 <= self.change_small_pct
            && self.change_small_pct < self.change_large_pct
            && self.change_large_pct.is_finite())
        {
            return Err(ConfigError::InvalidEncoder(format!(
                "change bands {} / {}",
                self.change_small_pct, self.change_large_pct
            )));
        }
        if self.change_lookback == 0 {
            return Err(ConfigError::InvalidEncoder("change_lookback 0".to_string()));
        }
        Ok(())
    }
}

/// Maps bars to state keys
#[derive(Debug, Clone, Default)]
pub struct StateEncoder {
    config: EncoderConfig,
}

impl StateEncoder {
    pub fn new(config: EncoderConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(StateEncoder { config })
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Encode `bar`. `history` holds the bars preceding it, oldest first.
    pub fn encode(&self, bar: &MarketBar, history: &[MarketBar]) -> StateKey {
        let c = &self.config;
        StateKey {
            rsi: RsiBucket::from_rsi(bar.rsi, c.rsi_oversold, c.rsi_overbought),
            trend: EmaTrend::from_close(bar.close, bar.ema),
            aroon: AroonRegime::from_aroon(bar.aroon_up, bar.aroon_down, c.aroon_margin),
            change: ChangeBucket::from_change_pct(
                self.change_pct(bar, history),
                c.change_small_pct,
                c.change_large_pct,
            ),
        }
    }

    fn change_pct(&self, bar: &MarketBar, history: &[MarketBar]) -> f64 {
        let lookback = self.config.change_lookback;
        if lookback > 1 && history.len() >= lookback {
            let base = history[history.len() - lookback].close;
            if base > 0.0 {
                return (bar.close - base) / base * 100.0;
            }
        }
        bar.price_change_pct
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bar(close: f64, rsi: f64, ema: f64, up: f64, down: f64, change: f64) -> MarketBar {
        MarketBar {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
            rsi,
            ema,
            aroon_up: up,
            aroon_down: down,
            price_change_pct: change,
        }
    }

    #[test]
    fn test_key_space_size() {
        let all = StateKey::all();
        assert_eq!(all.len(), 90);
        assert_eq!(StateKey::COUNT, 90);
        for (i, key) in all.iter().enumerate() {
            assert_eq!(key.index(), i);
        }
    }

    #[test]
    fn test_bucket_boundaries() {
        assert_eq!(RsiBucket::from_rsi(29.9, 30.0, 70.0), RsiBucket::Oversold);
        assert_eq!(RsiBucket::from_rsi(30.0, 30.0, 70.0), RsiBucket::Neutral);
        assert_eq!(RsiBucket::from_rsi(70.1, 30.0, 70.0), RsiBucket::Overbought);
        assert_eq!(EmaTrend::from_close(100.0, 100.0), EmaTrend::Above);
        assert_eq!(AroonRegime::from_aroon(80.0, 20.0, 20.0), AroonRegime::UpDominant);
        assert_eq!(AroonRegime::from_aroon(40.0, 20.0, 20.0), AroonRegime::Neutral);
        assert_eq!(AroonRegime::from_aroon(0.0, 100.0, 20.0), AroonRegime::DownDominant);
        assert_eq!(ChangeBucket::from_change_pct(-2.0, 0.5, 2.0), ChangeBucket::StrongDown);
        assert_eq!(ChangeBucket::from_change_pct(-1.0, 0.5, 2.0), ChangeBucket::Down);
        assert_eq!(ChangeBucket::from_change_pct(0.5, 0.5, 2.0), ChangeBucket::Flat);
        assert_eq!(ChangeBucket::from_change_pct(1.0, 0.5, 2.0), ChangeBucket::Up);
        assert_eq!(ChangeBucket::from_change_pct(2.0, 0.5, 2.0), ChangeBucket::StrongUp);
    }

    #[test]
    fn test_out_of_range_values_clamp() {
        let encoder = StateEncoder::default();
        let key = encoder.encode(&bar(100.0, 150.0, 90.0, 500.0, -10.0, 99.0), &[]);
        assert_eq!(key.rsi, RsiBucket::Overbought);
        assert_eq!(key.aroon, AroonRegime::UpDominant);
        assert_eq!(key.change, ChangeBucket::StrongUp);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let encoder = StateEncoder::default();
        let b = bar(100.0, 25.0, 101.0, 10.0, 90.0, -0.7);
        let first = encoder.encode(&b, &[]);
        assert_eq!(first, encoder.encode(&b, &[]));
        assert_eq!(
            first,
            StateKey {
                rsi: RsiBucket::Oversold,
                trend: EmaTrend::Below,
                aroon: AroonRegime::DownDominant,
                change: ChangeBucket::Down,
            }
        );
    }

    #[test]
    fn test_lookback_uses_history() {
        let config = EncoderConfig { change_lookback: 3, ..Default::default() };
        let encoder = StateEncoder::new(config).unwrap();
        let history = vec![
            bar(100.0, 50.0, 100.0, 50.0, 50.0, 0.0),
            bar(101.0, 50.0, 100.0, 50.0, 50.0, 1.0),
            bar(102.0, 50.0, 100.0, 50.0, 50.0, 1.0),
        ];
        // 100 -> 103 over three bars is +3%, even though the bar itself says 0
        let key = encoder.encode(&bar(103.0, 50.0, 100.0, 50.0, 50.0, 0.0), &history);
        assert_eq!(key.change, ChangeBucket::StrongUp);

        // Not enough history falls back to the bar's own change
        let key = encoder.encode(&bar(103.0, 50.0, 100.0, 50.0, 50.0, 0.0), &history[..1]);
        assert_eq!(key.change, ChangeBucket::Flat);
    }

    #[test]
    fn test_invalid_config() {
        let inverted = EncoderConfig { rsi_oversold: 80.0, ..Default::default() };
        assert!(matches!(
            StateEncoder::new(inverted),
            Err(ConfigError::InvalidEncoder(_))
        ));
    }
}
