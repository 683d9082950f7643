//! Simple Moving Average.
//!
//! SMA(n) = mean of the last n values.
//! Short input (fewer than n values) returns the last value, or 0 when empty.

pub fn sma(series: &[f64], period: usize) -> f64 {
    if period == 0 || series.len() < period {
        return series.last().copied().unwrap_or(0.0);
    }
    series[series.len() - period..].iter().sum::<f64>() / period as f64
}
