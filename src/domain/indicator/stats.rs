//! Descriptive statistics over numeric series.
//!
//! Variance and standard deviation are population statistics and are 0 for
//! fewer than two values.

pub fn mean(series: &[f64]) -> f64 {
    if series.is_empty() {
        return 0.0;
    }
    series.iter().sum::<f64>() / series.len() as f64
}

/// `None` for an empty series.
pub fn median(series: &[f64]) -> Option<f64> {
    if series.is_empty() {
        return None;
    }
    let mut sorted = series.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

pub fn variance(series: &[f64]) -> f64 {
    if series.len() < 2 {
        return 0.0;
    }
    let m = mean(series);
    series.iter().map(|v| (v - m).powi(2)).sum::<f64>() / series.len() as f64
}

pub fn std_dev(series: &[f64]) -> f64 {
    variance(series).sqrt()
}
