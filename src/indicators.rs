//! Technical indicators used by the state encoder
//!
//! RSI and EMA wrap the `ta` crate. Aroon and percent change are not in `ta`
//! and are computed here. Every function returns one entry per input value,
//! `None` while the indicator is still warming up.

use ta::indicators::{ExponentialMovingAverage, RelativeStrengthIndex};
use ta::Next;

/// Calculate Exponential Moving Average
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let mut indicator = match ExponentialMovingAverage::new(period) {
        Ok(i) => i,
        Err(_) => return vec![None; values.len()],
    };

    values
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            let ema_val = indicator.next(value);
            (i + 1 >= period).then_some(ema_val)
        })
        .collect()
}

/// Calculate Relative Strength Index (0..=100)
pub fn rsi(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let mut indicator = match RelativeStrengthIndex::new(period) {
        Ok(i) => i,
        Err(_) => return vec![None; values.len()],
    };

    values
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            let rsi_val = indicator.next(value);
            (i + 1 >= period && rsi_val.is_finite()).then_some(rsi_val)
        })
        .collect()
}

/// Calculate Aroon Up / Aroon Down (0..=100).
///
/// Looks at the last `period + 1` bars; 100 means the extreme is the current
/// bar, 0 means it is `period` bars old. On ties the most recent bar wins.
pub fn aroon(high: &[f64], low: &[f64], period: usize) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
    let n = high.len().min(low.len());
    let mut up = Vec::with_capacity(n);
    let mut down = Vec::with_capacity(n);

    if period == 0 {
        return (vec![None; n], vec![None; n]);
    }

    for i in 0..n {
        if i < period {
            up.push(None);
            down.push(None);
            continue;
        }

        let start = i - period;
        let mut high_idx = start;
        let mut low_idx = start;
        for j in start..=i {
            if high[j] >= high[high_idx] {
                high_idx = j;
            }
            if low[j] <= low[low_idx] {
                low_idx = j;
            }
        }

        let p = period as f64;
        up.push(Some(100.0 * (p - (i - high_idx) as f64) / p));
        down.push(Some(100.0 * (p - (i - low_idx) as f64) / p));
    }

    (up, down)
}

/// Close-to-close change in percent
pub fn pct_change(values: &[f64]) -> Vec<Option<f64>> {
    values
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            if i == 0 || values[i - 1] == 0.0 {
                None
            } else {
                Some((value - values[i - 1]) / values[i - 1] * 100.0)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_ema() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let result = ema(&values, 3);

        assert_eq!(result[0], None);
        assert_eq!(result[1], None);
        assert!(result[2].is_some());
        let ema_val = result[4].unwrap();
        assert!(ema_val > 3.0 && ema_val < 5.0);
    }

    #[test]
    fn test_rsi_bounds() {
        let values = vec![
            44.0, 44.25, 44.5, 43.75, 44.5, 44.25, 44.0, 43.5, 44.0, 44.5, 45.0, 45.25, 45.5, 45.0,
            44.75,
        ];
        let result = rsi(&values, 14);
        assert!(result[12].is_none());
        let last = result[14].unwrap();
        assert!((0.0..=100.0).contains(&last));

        let rising: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        assert!(rsi(&rising, 14)[29].unwrap() > 70.0);
    }

    #[test]
    fn test_aroon() {
        let high = vec![10.0, 11.0, 12.0, 13.0, 12.5, 12.0];
        let low = vec![9.0, 10.0, 11.0, 12.0, 11.5, 8.0];
        let (up, down) = aroon(&high, &low, 4);

        assert!(up[3].is_none());
        // At i=4 the high (13) was 1 bar ago, the low (9) 4 bars ago
        assert_relative_eq!(up[4].unwrap(), 75.0);
        assert_relative_eq!(down[4].unwrap(), 0.0);
        // New low on the current bar
        assert_relative_eq!(down[5].unwrap(), 100.0);
    }

    #[test]
    fn test_pct_change() {
        let result = pct_change(&[100.0, 101.0, 99.99]);
        assert_eq!(result[0], None);
        assert_relative_eq!(result[1].unwrap(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(result[2].unwrap(), -1.0, epsilon = 1e-9);
    }
}
