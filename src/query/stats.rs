//! Summary statistics for one numeric series

use arrow::array::Float64Array;
use serde::Serialize;

use crate::{Error, Result};

/// Quartiles plus the 95th percentile, keyed `"25"`, `"50"`, `"75"`, `"95"` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Percentiles {
    /// 25th percentile
    #[serde(rename = "25")]
    pub p25: f64,
    /// Median
    #[serde(rename = "50")]
    pub p50: f64,
    /// 75th percentile
    #[serde(rename = "75")]
    pub p75: f64,
    /// 95th percentile
    #[serde(rename = "95")]
    pub p95: f64,
}

/// Statistics of one variable after filtering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableStats {
    /// Column name
    pub variable: String,
    /// Number of non-null, non-NaN values
    pub count: usize,
    /// Arithmetic mean
    pub mean: f64,
    /// Population standard deviation
    pub std: f64,
    /// Smallest value
    pub min: f64,
    /// Largest value
    pub max: f64,
    /// Linearly interpolated percentiles
    pub percentiles: Percentiles,
}

impl VariableStats {
    /// Compute statistics over the valid values of `values`.
    ///
    /// # Errors
    /// Returns [`Error::EmptySeries`] if every value is null or NaN
    pub fn compute(variable: &str, values: &Float64Array) -> Result<Self> {
        let mut sorted: Vec<f64> = values
            .iter()
            .flatten()
            .filter(|v| !v.is_nan())
            .collect();
        if sorted.is_empty() {
            return Err(Error::EmptySeries(variable.to_string()));
        }
        sorted.sort_by(f64::total_cmp);

        #[allow(clippy::cast_precision_loss)]
        let n = sorted.len() as f64;
        let mean = sorted.iter().sum::<f64>() / n;
        let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        Ok(Self {
            variable: variable.to_string(),
            count: sorted.len(),
            mean,
            std: variance.sqrt(),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            percentiles: Percentiles {
                p25: percentile(&sorted, 25.0),
                p50: percentile(&sorted, 50.0),
                p75: percentile(&sorted, 75.0),
                p95: percentile(&sorted, 95.0),
            },
        })
    }
}

/// Percentile of an ascending, non-empty slice, interpolating linearly
/// between the two closest ranks.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub(crate) fn percentile(sorted: &[f64], pct: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_interpolates() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert!((percentile(&v, 50.0) - 2.5).abs() < 1e-12);
        assert!((percentile(&v, 25.0) - 1.75).abs() < 1e-12);
        assert!((percentile(&v, 0.0) - 1.0).abs() < 1e-12);
        assert!((percentile(&v, 100.0) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_compute_basic() {
        let values = Float64Array::from(vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        let stats = VariableStats::compute("x", &values).unwrap();

        assert_eq!(stats.count, 8);
        assert!((stats.mean - 5.0).abs() < 1e-12);
        assert!((stats.std - 2.0).abs() < 1e-12);
        assert!((stats.min - 2.0).abs() < f64::EPSILON);
        assert!((stats.max - 9.0).abs() < f64::EPSILON);
        assert!((stats.percentiles.p50 - 4.5).abs() < 1e-12);
    }

    #[test]
    fn test_nulls_and_nan_are_excluded() {
        let values = Float64Array::from(vec![Some(1.0), None, Some(f64::NAN), Some(3.0)]);
        let stats = VariableStats::compute("x", &values).unwrap();
        assert_eq!(stats.count, 2);
        assert!((stats.mean - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_all_null_is_empty_series() {
        let values = Float64Array::from(vec![None, Some(f64::NAN)]);
        let err = VariableStats::compute("x", &values).unwrap_err();
        assert!(matches!(err, Error::EmptySeries(ref v) if v == "x"));
    }

    #[test]
    fn test_percentile_keys_on_the_wire() {
        let values = Float64Array::from(vec![1.0]);
        let json = serde_json::to_value(VariableStats::compute("x", &values).unwrap()).unwrap();
        for key in ["25", "50", "75", "95"] {
            assert!(json["percentiles"].get(key).is_some(), "missing {key}");
        }
    }
}
