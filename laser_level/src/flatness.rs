//! Flatness analysis: residuals against the least-squares line through the
//! samples, and how much each point must be raised (shim) or lowered
//! (scrape) to meet the extreme points.

use serde::{Deserialize, Serialize};

use crate::sample::Sample;

/// Fewer samples than this leave the derived fields at zero.
pub const MIN_SAMPLES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionLine {
    pub slope: f64,
    pub intercept: f64,
    pub min_error: f64,
    pub max_error: f64,
}

impl RegressionLine {
    #[inline]
    pub fn at(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Fits `y = slope * x + intercept` from deviation sums.
pub fn fit_line(samples: &[Sample]) -> (f64, f64) {
    let n = samples.len() as f64;
    let mean_x = samples.iter().map(|s| s.x as f64).sum::<f64>() / n;
    let mean_y = samples.iter().map(|s| s.y).sum::<f64>() / n;

    let (sxx, sxy) = samples.iter().fold((0.0, 0.0), |(sxx, sxy), s| {
        let dx = s.x as f64 - mean_x;
        (sxx + dx * dx, sxy + dx * (s.y - mean_y))
    });

    let slope = if sxx == 0.0 { 0.0 } else { sxy / sxx };
    (slope, mean_y - slope * mean_x)
}

/// Updates `lin_y_error`, `shim` and `scrape` of every sample in place.
///
/// Returns `None` and zeroes the fields when there are fewer than
/// [`MIN_SAMPLES`] samples.
pub fn recalculate(samples: &mut [Sample]) -> Option<RegressionLine> {
    if samples.len() < MIN_SAMPLES {
        for sample in samples.iter_mut() {
            sample.lin_y_error = 0.0;
            sample.shim = 0.0;
            sample.scrape = 0.0;
        }
        return None;
    }

    let (slope, intercept) = fit_line(samples);
    let mut min_error = f64::INFINITY;
    let mut max_error = f64::NEG_INFINITY;
    for sample in samples.iter_mut() {
        sample.lin_y_error = sample.y - (slope * sample.x as f64 + intercept);
        min_error = min_error.min(sample.lin_y_error);
        max_error = max_error.max(sample.lin_y_error);
    }
    for sample in samples.iter_mut() {
        sample.shim = max_error - sample.lin_y_error;
        sample.scrape = sample.lin_y_error - min_error;
    }

    Some(RegressionLine {
        slope,
        intercept,
        min_error,
        max_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(ys: &[f64]) -> Vec<Sample> {
        ys.iter()
            .enumerate()
            .map(|(x, &y)| Sample::new(x, y))
            .collect()
    }

    #[test]
    fn colinear_samples_are_flat() {
        let mut s = samples(&[0.0, 1.0, 2.0]);
        let line = recalculate(&mut s).unwrap();
        assert!((line.slope - 1.0).abs() < 1e-12);
        assert!(line.intercept.abs() < 1e-12);
        for sample in &s {
            assert!(sample.lin_y_error.abs() < 1e-12);
            assert!(sample.shim.abs() < 1e-12);
            assert!(sample.scrape.abs() < 1e-12);
        }
    }

    #[test]
    fn line_survives_json() {
        let mut s = samples(&[0.0, 2.0, 1.0]);
        let line = recalculate(&mut s).unwrap();
        let text = common::serde::serialize(&line, common::SerdeFormat::Json).unwrap();
        assert!(text.contains("\"min_error\""));
        let back: RegressionLine =
            common::serde::deserialize(&text, common::SerdeFormat::Json).unwrap();
        assert_eq!(back, line);
    }

    #[test]
    fn bump_in_the_middle() {
        let mut s = samples(&[0.0, 1.0, 0.0]);
        let line = recalculate(&mut s).unwrap();
        assert_eq!(line.slope, 0.0);
        assert!((line.intercept - 1.0 / 3.0).abs() < 1e-12);

        let shim: Vec<f64> = s.iter().map(|s| s.shim).collect();
        let scrape: Vec<f64> = s.iter().map(|s| s.scrape).collect();
        for (got, want) in shim.iter().zip([1.0, 0.0, 1.0]) {
            assert!((got - want).abs() < 1e-12);
        }
        for (got, want) in scrape.iter().zip([0.0, 1.0, 0.0]) {
            assert!((got - want).abs() < 1e-12);
        }
        assert!(s[0].lin_y_error < 0.0);
        assert!(s[1].lin_y_error > 0.0);
    }

    #[test]
    fn too_few_samples_reset_fields() {
        let mut s = samples(&[0.0, 5.0]);
        s[0].shim = 3.0;
        s[1].lin_y_error = 2.0;
        assert!(recalculate(&mut s).is_none());
        assert!(s
            .iter()
            .all(|s| s.lin_y_error == 0.0 && s.shim == 0.0 && s.scrape == 0.0));
    }

    #[test]
    fn recalculate_is_idempotent() {
        let mut s = samples(&[0.013, -0.2, 0.31, 0.07, -0.05]);
        let first = recalculate(&mut s);
        let snapshot = s.clone();
        let second = recalculate(&mut s);
        assert_eq!(first, second);
        for (a, b) in snapshot.iter().zip(&s) {
            assert_eq!(a.lin_y_error.to_bits(), b.lin_y_error.to_bits());
            assert_eq!(a.shim.to_bits(), b.shim.to_bits());
            assert_eq!(a.scrape.to_bits(), b.scrape.to_bits());
        }
    }

    #[test]
    fn shared_x_gives_zero_slope() {
        let mut s = vec![Sample::new(4, 1.0), Sample::new(4, 2.0), Sample::new(4, 3.0)];
        let line = recalculate(&mut s).unwrap();
        assert_eq!(line.slope, 0.0);
        assert!((line.intercept - 2.0).abs() < 1e-12);
        assert!((s[2].shim).abs() < 1e-12);
        assert!((s[0].shim - 2.0).abs() < 1e-12);
    }
}
