//! Numeric summaries over recorded samples.
//!
//! All summaries of an empty sample set are zero, never NaN.

use serde::Serialize;

/// Mean, extremes and population standard deviation of a sample set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Summary {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
    pub count: usize,
}

impl Summary {
    pub fn of(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let count = samples.len();
        let avg = mean(samples);
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let variance = samples.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / count as f64;

        Self {
            avg,
            min,
            max,
            std_dev: variance.sqrt(),
            count,
        }
    }
}

/// Mean of a sample set, zero when empty.
pub fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        0.0
    } else {
        samples.iter().sum::<f64>() / samples.len() as f64
    }
}

/// `part / whole * 100`, zero when `whole` is zero.
pub fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// `amount / seconds`, zero for an empty or negative interval.
pub fn rate(amount: f64, seconds: f64) -> f64 {
    if seconds > 0.0 {
        amount / seconds
    } else {
        0.0
    }
}
