//! Sub-pixel laser line localization on a 1-D profile.
//!
//! Fits `f(x) = A × exp(-((x - μ) / s)²)` with only μ free. `A` is the
//! profile maximum and `s` comes from the half-max spread of the profile,
//! `s = FWHM / (2·√ln2)`. The fit runs with Levenberg-Marquardt from the
//! middle of the profile first and, if that does not land on the peak,
//! once more from the half-max weighted centroid.

pub mod linear_solver;
pub mod lm_optimizer;

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};

use lm_optimizer::{LMConfig, LMModel, optimize};

/// A fit must explain at least this share of the profile energy (Σp²).
const MIN_EXPLAINED_ENERGY: f64 = 0.5;

pub const DEFAULT_FIT_ITERATIONS: usize = 800;
pub const DEFAULT_FALLBACK_ITERATIONS: usize = 1000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CentroidMethod {
    /// Levenberg-Marquardt Gaussian fit, ~0.05 px on clean lines.
    #[default]
    GaussianFit,
    /// Closed-form weighted mean above half maximum. Cheaper, biased by
    /// asymmetric noise.
    WeightedCentroid,
}

/// Which route produced a [`PeakFit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitPath {
    Fast,
    Fallback,
    WeightedCentroid,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakFit {
    /// Sub-pixel peak position in profile indices. May lie outside the
    /// profile for a line clipped at the sensor edge.
    pub position: f64,
    pub amplitude: f64,
    pub width: f64,
    pub iterations: usize,
    pub path: FitPath,
}

/// Gaussian with fixed amplitude and width; the center is the only
/// parameter.
#[derive(Debug)]
struct GaussianLine {
    amplitude: f64,
    width: f64,
}

impl LMModel<1> for GaussianLine {
    #[inline]
    fn evaluate(&self, x: f64, params: &[f64; 1]) -> f64 {
        let d = (x - params[0]) / self.width;
        self.amplitude * (-d * d).exp()
    }

    #[inline]
    fn jacobian_row(&self, x: f64, params: &[f64; 1]) -> [f64; 1] {
        let d = (x - params[0]) / self.width;
        [self.amplitude * (-d * d).exp() * 2.0 * d / self.width]
    }
}

/// Contiguous run of samples above half maximum around the brightest one.
#[derive(Debug, Clone, Copy, PartialEq)]
struct HalfMaxWindow {
    first: usize,
    last: usize,
    /// Interpolated half-max crossings.
    left: f64,
    right: f64,
    half: f64,
}

impl HalfMaxWindow {
    fn find(values: &[f64], peak_index: usize, amplitude: f64) -> Self {
        let half = amplitude / 2.0;

        let mut first = peak_index;
        while first > 0 && values[first - 1] > half {
            first -= 1;
        }
        let mut last = peak_index;
        while last + 1 < values.len() && values[last + 1] > half {
            last += 1;
        }

        let left = if first == 0 {
            -0.5
        } else {
            crossing(first - 1, values[first - 1], values[first], half)
        };
        let right = if last + 1 == values.len() {
            last as f64 + 0.5
        } else {
            crossing(last, values[last], values[last + 1], half)
        };

        Self {
            first,
            last,
            left,
            right,
            half,
        }
    }

    fn fwhm(&self) -> f64 {
        self.right - self.left
    }

    /// Mean index weighted by the intensity above half maximum.
    fn weighted_centroid(&self, values: &[f64]) -> f64 {
        let mut sum = 0.0;
        let mut weighted = 0.0;
        for (i, &v) in values
            .iter()
            .enumerate()
            .take(self.last + 1)
            .skip(self.first)
        {
            let w = (v - self.half).max(0.0);
            sum += w;
            weighted += w * i as f64;
        }
        if sum > 0.0 {
            weighted / sum
        } else {
            (self.first + self.last) as f64 / 2.0
        }
    }
}

/// Linear interpolation of the point between `i` and `i + 1` where the
/// profile crosses `level`.
fn crossing(i: usize, a: f64, b: f64, level: f64) -> f64 {
    let span = b - a;
    if span.abs() < f64::EPSILON {
        return i as f64 + 0.5;
    }
    i as f64 + (level - a) / span
}

#[derive(Debug, Clone, PartialEq)]
pub struct PeakLocator {
    pub method: CentroidMethod,
    pub fit: LMConfig,
    pub fallback_iterations: usize,
    pub fallback: bool,
}

impl Default for PeakLocator {
    fn default() -> Self {
        Self {
            method: CentroidMethod::GaussianFit,
            fit: LMConfig::with_max_iterations(DEFAULT_FIT_ITERATIONS),
            fallback_iterations: DEFAULT_FALLBACK_ITERATIONS,
            fallback: true,
        }
    }
}

impl PeakLocator {
    pub fn new(method: CentroidMethod, fit_iterations: usize, fallback_iterations: usize) -> Self {
        Self {
            method,
            fit: LMConfig::with_max_iterations(fit_iterations),
            fallback_iterations,
            fallback: true,
        }
    }

    pub fn with_fallback(mut self, fallback: bool) -> Self {
        self.fallback = fallback;
        self
    }

    /// Locates the laser line. `None` means "no fit" and the reading must
    /// be skipped.
    pub fn locate(&self, profile: &[f64]) -> Option<PeakFit> {
        let (peak_index, amplitude) = profile
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))?;
        if !amplitude.is_finite() || amplitude <= 0.0 {
            return None;
        }

        let window = HalfMaxWindow::find(profile, peak_index, amplitude);
        // No fall-off on either side: nothing to localize.
        if window.first == 0 && window.last + 1 == profile.len() {
            return None;
        }
        let width = window.fwhm() / (2.0 * std::f64::consts::LN_2.sqrt());
        if !width.is_finite() || width <= 0.0 {
            return None;
        }

        if self.method == CentroidMethod::WeightedCentroid {
            return Some(PeakFit {
                position: window.weighted_centroid(profile),
                amplitude,
                width,
                iterations: 0,
                path: FitPath::WeightedCentroid,
            });
        }

        let model = GaussianLine { amplitude, width };
        let xs: Vec<f64> = (0..profile.len()).map(|i| i as f64).collect();
        let energy: f64 = profile.iter().map(|v| v * v).sum();

        let midpoint = (profile.len() - 1) as f64 / 2.0;
        let fast = optimize(&model, &xs, profile, [midpoint], &self.fit);
        if fast.converged && fast.chi2 < MIN_EXPLAINED_ENERGY * energy {
            return Some(PeakFit {
                position: fast.params[0],
                amplitude,
                width,
                iterations: fast.iterations,
                path: FitPath::Fast,
            });
        }

        if !self.fallback {
            return None;
        }

        let seed = window.weighted_centroid(profile);
        let config = LMConfig {
            max_iterations: self.fallback_iterations,
            ..self.fit.clone()
        };
        let precise = optimize(&model, &xs, profile, [seed], &config);
        if precise.converged && precise.chi2 < MIN_EXPLAINED_ENERGY * energy {
            Some(PeakFit {
                position: precise.params[0],
                amplitude,
                width,
                iterations: fast.iterations + precise.iterations,
                path: FitPath::Fallback,
            })
        } else {
            None
        }
    }
}
