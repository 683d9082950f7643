//! MACD (Moving Average Convergence Divergence).
//!
//! MACD Line = EMA(fast) - EMA(slow) over the whole series.
//!
//! This is a single-point calculation: it has no history of MACD values, so
//! the signal line and histogram are always reported as 0. Callers that need
//! a real signal line keep their own MACD history (see the snapshot builder).
//!
//! Default parameters: fast=12, slow=26, signal=9
//! Fewer than `slow` values: all three fields are 0.

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdValue {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

pub fn macd(series: &[f64], fast: usize, slow: usize, _signal: usize) -> MacdValue {
    if series.len() < slow {
        return MacdValue {
            macd: 0.0,
            signal: 0.0,
            histogram: 0.0,
        };
    }

    let line = super::ema(series, fast) - super::ema(series, slow);
    MacdValue {
        macd: line,
        signal: 0.0,
        histogram: 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn macd_short_series_is_zero() {
        let series: Vec<f64> = (0..25).map(|i| i as f64).collect();
        let value = macd(&series, DEFAULT_FAST, DEFAULT_SLOW, DEFAULT_SIGNAL);
        assert_eq!(value.macd, 0.0);
        assert_eq!(value.signal, 0.0);
        assert_eq!(value.histogram, 0.0);
    }

    #[test]
    fn macd_line_is_fast_minus_slow() {
        let series: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let value = macd(&series, DEFAULT_FAST, DEFAULT_SLOW, DEFAULT_SIGNAL);
        let expected = super::super::ema(&series, 12) - super::super::ema(&series, 26);
        assert_relative_eq!(value.macd, expected);
        assert!(value.macd > 0.0, "uptrend should give a positive MACD line");
    }

    #[test]
    fn macd_signal_and_histogram_are_not_tracked() {
        let series: Vec<f64> = (0..60).map(|i| (i as f64).sin() * 10.0 + 50.0).collect();
        let value = macd(&series, 12, 26, 9);
        assert_eq!(value.signal, 0.0);
        assert_eq!(value.histogram, 0.0);
    }
}
