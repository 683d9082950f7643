//! Exponential Moving Average.
//!
//! k = 2/(n+1), seeded with the first value, then EMA = (C - EMA) * k + EMA
//! over the whole series. Empty input returns 0; input shorter than n returns
//! the last value.

pub fn ema(series: &[f64], period: usize) -> f64 {
    let Some(&first) = series.first() else {
        return 0.0;
    };
    if series.len() < period {
        return series[series.len() - 1];
    }

    let k = 2.0 / (period as f64 + 1.0);
    series[1..]
        .iter()
        .fold(first, |ema, &price| (price - ema) * k + ema)
}
