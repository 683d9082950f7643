//! Average True Range.
//!
//! True range for bar i uses the previous bar's close. ATR is the sum of the
//! last n true ranges divided by n. When any series has fewer than n values
//! the result is 0. Series of unequal length are aligned on their common
//! prefix.

use super::true_range;

pub const DEFAULT_PERIOD: usize = 14;

pub fn atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> f64 {
    if period == 0 || highs.len() < period || lows.len() < period || closes.len() < period {
        return 0.0;
    }

    let n = highs.len().min(lows.len()).min(closes.len());
    let tr_values: Vec<f64> = (1..n)
        .map(|i| true_range(highs[i], lows[i], closes[i - 1]))
        .collect();

    let start = tr_values.len().saturating_sub(period);
    tr_values[start..].iter().sum::<f64>() / period as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn atr_short_series_is_zero() {
        assert_eq!(atr(&[1.0, 2.0], &[0.5, 1.0], &[1.0, 1.5], 14), 0.0);
    }

    #[test]
    fn atr_constant_range() {
        let highs = [110.0; 6];
        let lows = [90.0; 6];
        let closes = [100.0; 6];
        assert_relative_eq!(atr(&highs, &lows, &closes, 3), 20.0);
    }

    #[test]
    fn atr_exact_length_divides_by_period() {
        // 3 bars give 2 true ranges, still averaged over 3
        let highs = [110.0, 110.0, 110.0];
        let lows = [90.0, 90.0, 90.0];
        let closes = [100.0, 100.0, 100.0];
        assert_relative_eq!(atr(&highs, &lows, &closes, 3), 40.0 / 3.0);
    }

    #[test]
    fn atr_gap_uses_previous_close() {
        let highs = [101.0, 121.0, 122.0];
        let lows = [99.0, 119.0, 120.0];
        let closes = [100.0, 120.0, 121.0];
        // tr1 = max(2, 21, 19) = 21; tr2 = max(2, 2, 0) = 2
        assert_relative_eq!(atr(&highs, &lows, &closes, 2), 11.5);
    }
}
