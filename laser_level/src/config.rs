use std::path::Path;
use std::time::Duration;

use common::log_setup::LogConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cycle;
use crate::frame::ScanAxis;
use crate::peak::{self, CentroidMethod, PeakLocator};
use crate::reducer::FrameReducer;
use crate::session::{self, CalibrationState};
use crate::units::Units;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub smoothing: usize,
    pub scan_axis: ScanAxis,
    pub subsamples: usize,
    pub outlier_percent: f64,
    pub sensor_width_mm: f64,
    pub units: Units,
    pub centroid_method: CentroidMethod,
    pub fit_max_iterations: usize,
    pub fallback_max_iterations: usize,
    pub sample_timeout_secs: Option<f64>,
    pub cycle_period_secs: u64,
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            smoothing: 50,
            scan_axis: ScanAxis::Columns,
            subsamples: session::DEFAULT_SUBSAMPLES,
            outlier_percent: session::DEFAULT_OUTLIER_PERCENT,
            sensor_width_mm: session::DEFAULT_SENSOR_WIDTH_MM,
            units: Units::Micrometers,
            centroid_method: CentroidMethod::GaussianFit,
            fit_max_iterations: peak::DEFAULT_FIT_ITERATIONS,
            fallback_max_iterations: peak::DEFAULT_FALLBACK_ITERATIONS,
            sample_timeout_secs: None,
            cycle_period_secs: 60,
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Format follows the extension: `.toml`, `.yaml`/`.yml` or `.json`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let config: Config = common::serde::read_file(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_or_default(path: &Path) -> Self {
        match Config::load(path) {
            Ok(config) => config,
            Err(err) => {
                warn!("Using default config, {} not loaded: {err:#}", path.display());
                Config::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        common::serde::write_file(self, path)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.subsamples > 0, "subsamples must be at least 1");
        anyhow::ensure!(
            (0.0..100.0).contains(&self.outlier_percent),
            "outlier_percent must be within [0, 100), got {}",
            self.outlier_percent
        );
        anyhow::ensure!(
            self.sensor_width_mm.is_finite() && self.sensor_width_mm > 0.0,
            "sensor_width_mm must be positive, got {}",
            self.sensor_width_mm
        );
        if let Some(secs) = self.sample_timeout_secs {
            anyhow::ensure!(
                secs.is_finite() && secs > 0.0,
                "sample_timeout_secs must be positive, got {secs}"
            );
        }
        Ok(())
    }

    pub fn reducer(&self) -> FrameReducer {
        FrameReducer::new(self.smoothing, self.scan_axis)
    }

    pub fn locator(&self) -> PeakLocator {
        PeakLocator::new(
            self.centroid_method,
            self.fit_max_iterations,
            self.fallback_max_iterations,
        )
    }

    pub fn calibration(&self) -> CalibrationState {
        CalibrationState {
            zero: None,
            sensor_width: self.sensor_width_mm,
            data_width: 0,
            units: self.units,
            subsamples: self.subsamples,
            outlier_percent: self.outlier_percent,
        }
    }

    pub fn sample_timeout(&self) -> Option<Duration> {
        self.sample_timeout_secs.map(Duration::from_secs_f64)
    }

    pub fn cycle_period(&self) -> Duration {
        cycle::clamp_period(Duration::from_secs(self.cycle_period_secs))
    }
}
