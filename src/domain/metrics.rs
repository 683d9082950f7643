//! Return and risk statistics over price series.

use crate::domain::indicator::{mean, std_dev};

/// Sharpe annualization assumes one sample per calendar day.
const PERIODS_PER_YEAR: f64 = 365.0;

/// Number of most recent returns kept by [`returns`].
pub const RETURNS_WINDOW: usize = 10;

pub const DEFAULT_RISK_FREE_RATE: f64 = 0.02;
pub const DEFAULT_VOLATILITY_PERIOD: usize = 20;

/// Fractional period-over-period changes, capped to the last 10.
///
/// Fewer than `period + 1` prices yields `[0.0]`. A zero base price yields a
/// non-finite return, which later statistics propagate.
pub fn returns(prices: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || prices.len() < period + 1 {
        return vec![0.0];
    }

    let all: Vec<f64> = (period..prices.len())
        .map(|i| (prices[i] - prices[i - period]) / prices[i - period])
        .collect();
    let start = all.len().saturating_sub(RETURNS_WINDOW);
    all[start..].to_vec()
}

/// Population standard deviation of the one-period returns.
///
/// 0 when there are fewer than `period + 1` prices or fewer than two returns.
pub fn volatility(prices: &[f64], period: usize) -> f64 {
    if prices.len() < period + 1 {
        return 0.0;
    }
    let rets = returns(prices, 1);
    if rets.len() < 2 {
        return 0.0;
    }
    std_dev(&rets)
}

/// Annualized Sharpe ratio of daily returns.
///
/// (mean - rf/365) / std * sqrt(365); 0 for fewer than two returns or zero
/// dispersion.
pub fn sharpe(returns: &[f64], risk_free_rate: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let stddev = std_dev(returns);
    if stddev == 0.0 {
        return 0.0;
    }
    let daily_rf = risk_free_rate / PERIODS_PER_YEAR;
    (mean(returns) - daily_rf) / stddev * PERIODS_PER_YEAR.sqrt()
}

/// Largest peak-to-trough decline as a fraction of the peak.
pub fn max_drawdown(prices: &[f64]) -> f64 {
    if prices.len() < 2 {
        return 0.0;
    }

    let mut peak = prices[0];
    let mut max_dd = 0.0_f64;
    for &price in prices {
        if price > peak {
            peak = price;
        }
        if peak > 0.0 {
            let dd = (peak - price) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}
