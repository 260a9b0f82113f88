//! Epoch statistics over aligned prediction / target sequences.

use crate::error::{EvalError, EvalResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Pearson correlation plus the joint bounds of both inputs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub corr: f64,
    /// Smallest value across both sequences.
    pub y_min: f64,
    /// Largest value across both sequences.
    pub y_max: f64,
}

/// Joint `(min, max)` over the finite values of two sequences. `None` when
/// neither holds a finite value.
#[must_use]
pub fn joint_bounds(a: &[f64], b: &[f64]) -> Option<(f64, f64)> {
    a.iter().chain(b).copied().filter(|v| v.is_finite()).fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

fn is_constant(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0].partial_cmp(&w[1]) == Some(Ordering::Equal))
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population Pearson correlation of `a` and `b`.
///
/// Means and deviations are taken over the full sequences and divided by `n`,
/// so the result is only meaningful on a fully merged epoch.
pub fn correlation(a: &[f64], b: &[f64]) -> EvalResult<Correlation> {
    if a.len() != b.len() {
        return Err(EvalError::MisalignedRecord(format!(
            "correlation inputs differ in length ({} vs {})",
            a.len(),
            b.len()
        )));
    }
    if a.len() < 2 {
        return Err(EvalError::DegenerateStatistic(format!(
            "correlation needs at least 2 samples, got {}",
            a.len()
        )));
    }

    let n = a.len() as f64;
    let (mean_a, mean_b) = (mean(a), mean(b));
    let (mut cov, mut var_a, mut var_b) = (0.0_f64, 0.0_f64, 0.0_f64);
    for (x, y) in a.iter().zip(b) {
        let (dx, dy) = (x - mean_a, y - mean_b);
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    let (cov, std_a, std_b) = (cov / n, (var_a / n).sqrt(), (var_b / n).sqrt());

    if is_constant(a) || is_constant(b) || !(std_a > 0.0 && std_b > 0.0) {
        return Err(EvalError::DegenerateStatistic(
            "zero variance in correlation input".to_string(),
        ));
    }

    let corr = cov / (std_a * std_b);
    if !corr.is_finite() {
        return Err(EvalError::DegenerateStatistic(format!("correlation is {corr}")));
    }

    let (y_min, y_max) = joint_bounds(a, b).unwrap_or((0.0, 0.0));
    Ok(Correlation { corr, y_min, y_max })
}

/// Mean absolute error between aligned sequences.
pub fn mean_absolute_error(prediction: &[f64], target: &[f64]) -> EvalResult<f64> {
    if prediction.len() != target.len() {
        return Err(EvalError::MisalignedRecord(format!(
            "{} predictions but {} targets",
            prediction.len(),
            target.len()
        )));
    }
    if prediction.is_empty() {
        return Err(EvalError::DegenerateStatistic("mean absolute error of no samples".to_string()));
    }
    let total: f64 = prediction.iter().zip(target).map(|(p, t)| (p - t).abs()).sum();
    let mae = total / prediction.len() as f64;
    if !mae.is_finite() {
        return Err(EvalError::NonFinite(format!("mean absolute error is {mae}")));
    }
    Ok(mae)
}

/// Position and value of the first NaN or infinite entry.
#[must_use]
pub fn first_non_finite(values: &[f64]) -> Option<(usize, f64)> {
    values.iter().copied().enumerate().find(|(_, v)| !v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    #[test]
    fn test_identical_sequences_correlate_perfectly() {
        let c = correlation(&[1.0, 2.0, 3.0, 4.0], &[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert!((c.corr - 1.0).abs() < EPS);
        assert_eq!((c.y_min, c.y_max), (1.0, 4.0));
    }

    #[test]
    fn test_reversed_sequence_correlates_negatively() {
        let c = correlation(&[1.0, 2.0, 3.0, 4.0], &[4.0, 3.0, 2.0, 1.0]).unwrap();
        assert!((c.corr + 1.0).abs() < EPS);
    }

    #[test]
    fn test_constant_target_is_degenerate() {
        let err = correlation(&[1.0, 2.0, 3.0, 4.0], &[2.0, 2.0, 2.0, 2.0]).unwrap_err();
        assert!(matches!(err, EvalError::DegenerateStatistic(_)));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_constant_non_representable_value_is_degenerate() {
        let err = correlation(&[0.1, 0.1, 0.1], &[1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, EvalError::DegenerateStatistic(_)));
    }

    #[test]
    fn test_single_sample_is_degenerate() {
        assert!(matches!(correlation(&[1.0], &[2.0]), Err(EvalError::DegenerateStatistic(_))));
    }

    #[test]
    fn test_length_mismatch_is_rejected() {
        assert!(matches!(correlation(&[1.0, 2.0], &[2.0]), Err(EvalError::MisalignedRecord(_))));
    }

    #[test]
    fn test_population_statistics() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [2.0, 4.0, 6.0, 9.0];
        let c = correlation(&a, &b).unwrap();
        let cov = ((-1.5 * -3.25) + (-0.5 * -1.25) + (0.5 * 0.75) + (1.5 * 3.75)) / 4.0;
        let std_a = (5.0f64 / 4.0).sqrt();
        let std_b =
            ((3.25f64.powi(2) + 1.25f64.powi(2) + 0.75f64.powi(2) + 3.75f64.powi(2)) / 4.0).sqrt();
        assert!((c.corr - cov / (std_a * std_b)).abs() < EPS);
        assert_eq!((c.y_min, c.y_max), (1.0, 9.0));
    }

    #[test]
    fn test_repeated_computation_is_bit_identical() {
        let a = [0.3, 1.7, 2.2, 5.9, 4.4];
        let b = [0.1, 2.0, 2.5, 5.0, 4.9];
        let first = correlation(&a, &b).unwrap();
        let second = correlation(&a, &b).unwrap();
        assert_eq!(first.corr.to_bits(), second.corr.to_bits());
        assert_eq!(first, second);
    }

    #[test]
    fn test_mean_absolute_error() {
        assert!((mean_absolute_error(&[1.0, 2.0], &[1.0, 4.0]).unwrap() - 1.5).abs() < EPS);
        assert!(mean_absolute_error(&[], &[]).is_err());
        assert!(mean_absolute_error(&[1.0], &[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_joint_bounds() {
        assert_eq!(joint_bounds(&[3.0, -1.0], &[7.5]), Some((-1.0, 7.5)));
        assert_eq!(joint_bounds(&[], &[]), None);
        assert_eq!(joint_bounds(&[1.0, f64::INFINITY], &[f64::NAN, 4.0]), Some((1.0, 4.0)));
        assert_eq!(joint_bounds(&[f64::NEG_INFINITY], &[f64::NAN]), None);
    }

    #[test]
    fn test_non_finite_mae_is_an_error() {
        let err = mean_absolute_error(&[f64::NAN, 2.0], &[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, EvalError::NonFinite(_)));
        assert!(!err.is_recoverable());
        assert!(mean_absolute_error(&[f64::INFINITY], &[1.0]).is_err());
    }

    #[test]
    fn test_first_non_finite() {
        assert_eq!(first_non_finite(&[1.0, 2.0]), None);
        assert_eq!(first_non_finite(&[1.0, f64::INFINITY, f64::NAN]), Some((1, f64::INFINITY)));
        assert!(first_non_finite(&[f64::NAN]).is_some_and(|(idx, v)| idx == 0 && v.is_nan()));
    }
}
