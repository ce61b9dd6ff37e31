//! Feature preparation
//!
//! Turns raw candles into `MarketBar`s. Bars whose indicators are still
//! warming up are dropped so every emitted bar is complete.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::indicators;
use crate::{Candle, MarketBar};

/// Indicator periods
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,
    #[serde(default = "default_ema_period")]
    pub ema_period: usize,
    #[serde(default = "default_aroon_period")]
    pub aroon_period: usize,
}

fn default_rsi_period() -> usize { 14 }
fn default_ema_period() -> usize { 50 }
fn default_aroon_period() -> usize { 25 }

impl Default for FeatureConfig {
    fn default() -> Self {
        FeatureConfig {
            rsi_period: default_rsi_period(),
            ema_period: default_ema_period(),
            aroon_period: default_aroon_period(),
        }
    }
}

impl FeatureConfig {
    /// Every indicator needs a period of at least one bar
    pub fn validate(&self) -> Result<(), ConfigError> {
        let periods = [
            ("rsi_period", self.rsi_period),
            ("ema_period", self.ema_period),
            ("aroon_period", self.aroon_period),
        ];
        match periods.into_iter().find(|(_, period)| *period == 0) {
            Some((name, _)) => Err(ConfigError::InvalidFeaturePeriod(name)),
            None => Ok(()),
        }
    }

    /// Number of leading candles that cannot produce a complete bar
    pub fn warmup(&self) -> usize {
        (self.rsi_period.max(self.ema_period).saturating_sub(1))
            .max(self.aroon_period)
            .max(1)
    }
}

/// Compute indicators over `candles` and emit one bar per candle whose
/// indicators are all available.
pub fn build_market_bars(candles: &[Candle], config: &FeatureConfig) -> Vec<MarketBar> {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let highs: Vec<f64> = candles.iter().map(|c| c.high).collect();
    let lows: Vec<f64> = candles.iter().map(|c| c.low).collect();

    let rsi = indicators::rsi(&closes, config.rsi_period);
    let ema = indicators::ema(&closes, config.ema_period);
    let (aroon_up, aroon_down) = indicators::aroon(&highs, &lows, config.aroon_period);
    let change = indicators::pct_change(&closes);

    let bars: Vec<MarketBar> = candles
        .iter()
        .enumerate()
        .filter_map(|(i, c)| {
            Some(MarketBar {
                timestamp: c.datetime,
                open: c.open,
                high: c.high,
                low: c.low,
                close: c.close,
                volume: c.volume,
                rsi: (*rsi.get(i)?)?,
                ema: (*ema.get(i)?)?,
                aroon_up: (*aroon_up.get(i)?)?,
                aroon_down: (*aroon_down.get(i)?)?,
                price_change_pct: (*change.get(i)?)?,
            })
        })
        .collect();

    debug!(
        candles = candles.len(),
        bars = bars.len(),
        "Dropped {} warm-up candles",
        candles.len() - bars.len()
    );

    bars
}
