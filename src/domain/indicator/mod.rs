//! Technical indicator library.
//!
//! Pure functions over ordered numeric series (oldest first). Every function
//! degrades to a documented fallback value on short input instead of failing;
//! the fallbacks are part of the contract and are relied on by alert
//! expressions that run before enough history has accumulated.

pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;
pub mod stats;

pub use atr::atr;
pub use bollinger::{bollinger, BollingerBands};
pub use ema::ema;
pub use macd::{macd, MacdValue};
pub use rsi::rsi;
pub use sma::sma;
pub use stats::{mean, median, std_dev, variance};

/// max(high - low, |high - prev_close|, |low - prev_close|)
pub fn true_range(high: f64, low: f64, prev_close: f64) -> f64 {
    let hl = high - low;
    let hc = (high - prev_close).abs();
    let lc = (low - prev_close).abs();
    hl.max(hc).max(lc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn true_range_hl_dominates() {
        // high-low=20, |high-100|=10, |low-100|=10 → 20
        assert!((true_range(110.0, 90.0, 100.0) - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn true_range_gap_up() {
        // high-low=20, |110-70|=40, |90-70|=20 → 40
        assert!((true_range(110.0, 90.0, 70.0) - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn true_range_gap_down() {
        // high-low=20, |110-130|=20, |90-130|=40 → 40
        assert!((true_range(110.0, 90.0, 130.0) - 40.0).abs() < f64::EPSILON);
    }
}
