// AMIGrid Analytics - Anomaly detection and baselines
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Summary statistics.

use serde::{Deserialize, Serialize};

/// Arithmetic mean; `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n - 1). Zero for a single value.
pub fn sample_stddev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    if values.len() < 2 {
        return Some(0.0);
    }
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

/// Quantile of sorted data with linear interpolation between closest
/// ranks. `q` is clamped to `[0, 1]`.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Mean, median, p10, p90 and sample standard deviation of one series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleStats {
    pub mean: f64,
    pub median: f64,
    pub p10: f64,
    pub p90: f64,
    pub stddev: f64,
}

impl SampleStats {
    /// `None` for an empty series. Non-finite values are ignored.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        sorted.sort_by(|a, b| a.total_cmp(b));
        Some(Self {
            mean: mean(&sorted)?,
            median: quantile_sorted(&sorted, 0.5)?,
            p10: quantile_sorted(&sorted, 0.1)?,
            p90: quantile_sorted(&sorted, 0.9)?,
            stddev: sample_stddev(&sorted)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_empty() {
        assert!(mean(&[]).is_none());
        assert!(quantile_sorted(&[], 0.5).is_none());
        assert!(SampleStats::from_values(&[]).is_none());
        assert!(SampleStats::from_values(&[f64::NAN]).is_none());
    }

    #[test]
    fn test_single_value() {
        let s = SampleStats::from_values(&[42.0]).unwrap();
        assert_eq!(s.mean, 42.0);
        assert_eq!(s.median, 42.0);
        assert_eq!(s.p10, 42.0);
        assert_eq!(s.p90, 42.0);
        assert_eq!(s.stddev, 0.0);
    }

    #[test]
    fn test_interpolated_quantiles() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        assert_relative_eq!(quantile_sorted(&sorted, 0.5).unwrap(), 5.5);
        assert_relative_eq!(quantile_sorted(&sorted, 0.1).unwrap(), 1.9, epsilon = 1e-12);
        assert_relative_eq!(quantile_sorted(&sorted, 0.9).unwrap(), 9.1, epsilon = 1e-12);
        assert_relative_eq!(quantile_sorted(&sorted, 2.0).unwrap(), 10.0);
    }

    #[test]
    fn test_unsorted_input() {
        let s = SampleStats::from_values(&[4.0, 2.0, 8.0, 6.0]).unwrap();
        assert_relative_eq!(s.mean, 5.0);
        assert_relative_eq!(s.median, 5.0);
        // sqrt(20 / 3)
        assert_relative_eq!(s.stddev, (20.0f64 / 3.0).sqrt(), epsilon = 1e-12);
    }
}
