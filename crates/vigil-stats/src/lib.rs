//! Descriptive statistics over numeric measurement series.
//!
//! `vigil-stats` is the aggregation layer shared by the rule engine (for
//! helper values such as the coefficient of variation) and by offline
//! consumers summarizing stored samples or experiment measurements.
//!
//! Every function is total: an empty input yields `None` instead of a
//! panic. Functions that need at least two points return a documented
//! sentinel when given fewer.
//!
//! # Example
//!
//! ```rust
//! use vigil_stats::{coefficient_of_variation, std_dev, Summary};
//!
//! let latencies = [12.0, 15.0, 11.0, 14.0, 13.0];
//!
//! assert_eq!(std_dev(&[42.0]), Some(0.0));
//! assert!(coefficient_of_variation(&latencies).unwrap() > 0.0);
//!
//! let summary = Summary::from_values(&latencies).unwrap();
//! assert_eq!(summary.count, 5);
//! assert!(summary.p25.is_none()); // fewer than 10 points
//! ```

#![doc(html_root_url = "https://docs.rs/vigil-stats/0.1.0")]
#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Minimum number of points before quartiles and IQR are reported.
pub const PERCENTILE_MIN_SAMPLES: usize = 10;

/// Returns the arithmetic mean, or `None` for an empty series.
#[must_use]
pub fn mean(values: &[f64]) -> Option<f64> {
    let first = *values.first()?;
    if values.iter().all(|v| *v == first) {
        return Some(first);
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Returns the median, or `None` for an empty series.
///
/// Even-length series average the two middle values.
#[must_use]
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sorted = sorted(values);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Returns the sample standard deviation (denominator `n - 1`).
///
/// A single point has a standard deviation of `0`, as does any constant
/// series. Returns `None` for an empty series.
#[must_use]
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let first = *values.first()?;
    if values.len() < 2 || values.iter().all(|v| *v == first) {
        return Some(0.0);
    }
    let avg = mean(values)?;
    let sum_sq: f64 = values.iter().map(|v| (v - avg).powi(2)).sum();
    Some((sum_sq / (values.len() - 1) as f64).sqrt())
}

/// Returns the smallest value, or `None` for an empty series.
#[must_use]
pub fn min(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::min)
}

/// Returns the largest value, or `None` for an empty series.
#[must_use]
pub fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

/// Returns `std_dev / mean * 100`.
///
/// Defined as `0` when the mean is `0`. Returns `None` for an empty series.
#[must_use]
pub fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    let avg = mean(values)?;
    if avg == 0.0 {
        return Some(0.0);
    }
    Some(std_dev(values)? / avg * 100.0)
}

/// Returns the `p`-th percentile (0..=100) using linear interpolation
/// between closest ranks.
///
/// `p` is clamped into range. Returns `None` for an empty series.
#[must_use]
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sorted = sorted(values);
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    sorted
}

/// Descriptive statistics for one measurement series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Number of points.
    pub count: usize,
    /// Arithmetic mean.
    pub mean: f64,
    /// Median.
    pub median: f64,
    /// Sample standard deviation.
    pub std_dev: f64,
    /// Smallest value.
    pub min: f64,
    /// Largest value.
    pub max: f64,
    /// `max - min`.
    pub range: f64,
    /// Coefficient of variation, in percent.
    pub cv_percent: f64,
    /// 25th percentile, present with at least [`PERCENTILE_MIN_SAMPLES`] points.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p25: Option<f64>,
    /// 75th percentile, present with at least [`PERCENTILE_MIN_SAMPLES`] points.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p75: Option<f64>,
    /// Interquartile range, present with at least [`PERCENTILE_MIN_SAMPLES`] points.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iqr: Option<f64>,
}

impl Summary {
    /// Computes a summary, or `None` for an empty series.
    #[must_use]
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let min = min(values)?;
        let max = max(values)?;

        let (p25, p75, iqr) = if values.len() >= PERCENTILE_MIN_SAMPLES {
            let p25 = percentile(values, 25.0)?;
            let p75 = percentile(values, 75.0)?;
            (Some(p25), Some(p75), Some(p75 - p25))
        } else {
            (None, None, None)
        };

        Some(Self {
            count: values.len(),
            mean: mean(values)?,
            median: median(values)?,
            std_dev: std_dev(values)?,
            min,
            max,
            range: max - min,
            cv_percent: coefficient_of_variation(values)?,
            p25,
            p75,
            iqr,
        })
    }
}
