//! Frame to profile reduction.
//!
//! A frame is collapsed to one mean intensity per scan line, smoothed with
//! a uniform moving average ("valid" windowing, so the profile shrinks by
//! `2 * smoothing` samples) and rescaled to `[0, 255]`.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::frame::{Frame, ScanAxis};

/// Rows summed per rayon task when reducing columns.
const ROWS_PER_CHUNK: usize = 64;

pub const PROFILE_MAX: f64 = 255.0;

/// Normalized 1-D intensity profile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Profile {
    values: Vec<f64>,
}

impl Profile {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.values
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameReducer {
    pub smoothing: usize,
    pub axis: ScanAxis,
}

impl FrameReducer {
    pub fn new(smoothing: usize, axis: ScanAxis) -> Self {
        Self { smoothing, axis }
    }

    pub fn reduce(&self, frame: &Frame) -> Profile {
        let means = match self.axis {
            ScanAxis::Columns => column_means(frame),
            ScanAxis::Rows => row_means(frame),
        };
        let mut values = smooth(&means, self.smoothing);
        normalize(&mut values);
        Profile::new(values)
    }
}

pub fn column_means(frame: &Frame) -> Vec<f64> {
    let width = frame.width();
    let sums = frame
        .pixels()
        .par_chunks(width * ROWS_PER_CHUNK)
        .fold(
            || vec![0u64; width],
            |mut acc, rows| {
                for row in rows.chunks_exact(width) {
                    for (sum, &pixel) in acc.iter_mut().zip(row) {
                        *sum += pixel as u64;
                    }
                }
                acc
            },
        )
        .reduce(
            || vec![0u64; width],
            |mut a, b| {
                for (sum, other) in a.iter_mut().zip(b) {
                    *sum += other;
                }
                a
            },
        );

    let height = frame.height() as f64;
    sums.into_iter().map(|sum| sum as f64 / height).collect()
}

pub fn row_means(frame: &Frame) -> Vec<f64> {
    let width = frame.width();
    frame
        .pixels()
        .par_chunks(width)
        .map(|row| row.iter().map(|&p| p as u64).sum::<u64>() as f64 / width as f64)
        .collect()
}

/// Uniform moving average of length `2 * factor + 1`, valid windows only.
///
/// Returns an empty vector when the window is longer than the input.
pub fn smooth(values: &[f64], factor: usize) -> Vec<f64> {
    if factor == 0 {
        return values.to_vec();
    }
    let window = 2 * factor + 1;
    if values.len() < window {
        return Vec::new();
    }

    let len = window as f64;
    let mut out = Vec::with_capacity(values.len() - window + 1);
    let mut sum: f64 = values[..window].iter().sum();
    out.push(sum / len);
    for i in window..values.len() {
        sum += values[i] - values[i - window];
        out.push(sum / len);
    }
    out
}

/// Rescales in place to `[0, 255]`. Non-finite values become 0 and are
/// ignored when finding the range; a flat input maps to all zeros.
pub fn normalize(values: &mut [f64]) {
    let (min, max) = values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });

    if !min.is_finite() {
        values.fill(0.0);
        return;
    }

    let range = if max == min { 1.0 } else { max - min };
    for v in values.iter_mut() {
        *v = if v.is_finite() {
            ((*v - min) * PROFILE_MAX / range).clamp(0.0, PROFILE_MAX)
        } else {
            0.0
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: usize, height: usize, f: impl Fn(usize, usize) -> u8) -> Frame {
        let mut pixels = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                pixels.push(f(x, y));
            }
        }
        Frame::new(width, height, pixels).unwrap()
    }

    #[test]
    fn column_means_average_each_column() {
        let frame = frame(3, 2, |x, y| (x * 10 + y * 2) as u8);
        assert_eq!(column_means(&frame), vec![1.0, 11.0, 21.0]);
    }

    #[test]
    fn column_means_span_multiple_chunks() {
        let height = ROWS_PER_CHUNK * 3 + 5;
        let frame = frame(4, height, |x, y| if y % 2 == 0 { x as u8 } else { 100 });
        let means = column_means(&frame);
        let even = height.div_ceil(2) as f64;
        let odd = (height / 2) as f64;
        for (x, mean) in means.iter().enumerate() {
            let expected = (even * x as f64 + odd * 100.0) / height as f64;
            assert!((mean - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn row_means_average_each_row() {
        let frame = frame(4, 2, |x, y| (x + y * 100) as u8);
        assert_eq!(row_means(&frame), vec![1.5, 101.5]);
    }

    #[test]
    fn smoothing_zero_is_identity() {
        let values = vec![1.0, 5.0, 2.0];
        assert_eq!(smooth(&values, 0), values);
    }

    #[test]
    fn smoothing_uses_valid_windows() {
        let values = vec![0.0, 3.0, 6.0, 9.0, 12.0];
        let smoothed = smooth(&values, 1);
        assert_eq!(smoothed.len(), 3);
        assert!((smoothed[0] - 3.0).abs() < 1e-12);
        assert!((smoothed[1] - 6.0).abs() < 1e-12);
        assert!((smoothed[2] - 9.0).abs() < 1e-12);
    }

    #[test]
    fn smoothing_longer_than_input_is_empty() {
        assert!(smooth(&[1.0, 2.0, 3.0], 2).is_empty());
    }

    #[test]
    fn normalize_spans_full_range() {
        let mut values = vec![10.0, 20.0, 30.0];
        normalize(&mut values);
        assert_eq!(values, vec![0.0, 127.5, 255.0]);
    }

    #[test]
    fn normalize_flat_input_is_zero() {
        let mut values = vec![42.0; 5];
        normalize(&mut values);
        assert!(values.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn normalize_replaces_non_finite() {
        let mut values = vec![f64::NAN, 0.0, 2.0, f64::INFINITY];
        normalize(&mut values);
        assert_eq!(values, vec![0.0, 0.0, 255.0, 0.0]);
    }

    #[test]
    fn reduce_applies_all_stages() {
        let frame = frame(7, 3, |x, _| if x == 3 { 200 } else { 50 });
        let profile = FrameReducer::new(1, ScanAxis::Columns).reduce(&frame);
        assert_eq!(profile.len(), 5);
        let values = profile.values();
        assert_eq!(values[0], 0.0);
        assert_eq!(values[1], 255.0);
        assert_eq!(values[2], 255.0);
        assert_eq!(values[3], 255.0);
        assert_eq!(values[4], 0.0);
    }

    #[test]
    fn reduce_rows_axis() {
        let frame = frame(2, 5, |_, y| (y * 10) as u8);
        let profile = FrameReducer::new(0, ScanAxis::Rows).reduce(&frame);
        assert_eq!(profile.values(), &[0.0, 63.75, 127.5, 191.25, 255.0]);
    }
}
