use super::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn gaussian_profile(len: usize, center: f64, width: f64, amplitude: f64) -> Vec<f64> {
    (0..len)
        .map(|i| {
            let d = (i as f64 - center) / width;
            amplitude * (-d * d).exp()
        })
        .collect()
}

#[test]
fn centered_peak_is_found_on_fast_path() {
    let profile = gaussian_profile(100, 50.0, 10.0, 255.0);
    let fit = PeakLocator::default().locate(&profile).unwrap();
    assert!(fit.position >= 49.5 && fit.position <= 50.5);
    assert!((fit.position - 50.0).abs() < 1e-4);
    assert_eq!(fit.path, FitPath::Fast);
    assert_eq!(fit.amplitude, 255.0);
}

#[test]
fn width_follows_half_max_spread() {
    let profile = gaussian_profile(200, 100.0, 12.0, 255.0);
    let fit = PeakLocator::default().locate(&profile).unwrap();
    assert!((fit.width - 12.0).abs() < 0.1);
}

#[test]
fn off_center_peak_uses_fallback() {
    let profile = gaussian_profile(640, 100.2, 12.0, 255.0);
    let fit = PeakLocator::default().locate(&profile).unwrap();
    assert_eq!(fit.path, FitPath::Fallback);
    assert!((fit.position - 100.2).abs() < 0.05);
}

#[test]
fn off_center_peak_without_fallback_is_no_fit() {
    let profile = gaussian_profile(640, 100.2, 12.0, 255.0);
    let locator = PeakLocator::default().with_fallback(false);
    assert!(locator.locate(&profile).is_none());
}

#[test]
fn noisy_peak_stays_sub_pixel() {
    let mut rng = StdRng::seed_from_u64(42);
    let profile: Vec<f64> = gaussian_profile(640, 300.7, 15.0, 255.0)
        .into_iter()
        .map(|v| (v + rng.random_range(-3.0..3.0)).max(0.0))
        .collect();
    let fit = PeakLocator::default().locate(&profile).unwrap();
    assert!(
        (fit.position - 300.7).abs() < 0.2,
        "position {}",
        fit.position
    );
}

#[test]
fn small_amplitude_peak() {
    let profile = gaussian_profile(100, 63.4, 8.0, 200.0);
    let fit = PeakLocator::default().locate(&profile).unwrap();
    assert!((fit.position - 63.4).abs() < 1e-3);
}

#[test]
fn degenerate_profiles_are_no_fit() {
    let locator = PeakLocator::default();
    assert!(locator.locate(&[]).is_none());
    assert!(locator.locate(&[0.0; 16]).is_none());
    assert!(locator.locate(&[5.0; 16]).is_none());
    assert!(locator.locate(&[f64::NAN, f64::NAN]).is_none());
}

#[test]
fn weighted_centroid_method() {
    let profile = gaussian_profile(640, 412.3, 20.0, 255.0);
    let locator = PeakLocator::new(CentroidMethod::WeightedCentroid, 800, 1000);
    let fit = locator.locate(&profile).unwrap();
    assert_eq!(fit.path, FitPath::WeightedCentroid);
    assert_eq!(fit.iterations, 0);
    assert!((fit.position - 412.3).abs() < 0.05);
}

#[test]
fn half_max_window_interpolates_edges() {
    let values = [0.0, 50.0, 100.0, 50.0, 0.0];
    let window = HalfMaxWindow::find(&values, 2, 100.0);
    assert_eq!((window.first, window.last), (2, 2));
    assert!((window.left - 1.0).abs() < 1e-12);
    assert!((window.right - 3.0).abs() < 1e-12);
    assert!((window.weighted_centroid(&values) - 2.0).abs() < 1e-12);
}

#[test]
fn half_max_window_clipped_at_edge() {
    let values = [100.0, 80.0, 20.0, 0.0];
    let window = HalfMaxWindow::find(&values, 0, 100.0);
    assert_eq!((window.first, window.last), (0, 1));
    assert_eq!(window.left, -0.5);
    assert!((window.right - 1.5).abs() < 1e-12);
}
