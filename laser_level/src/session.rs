//! Calibration state, the sample list and the measurement state machine.
//!
//! [`MeasurementSession`] is plain synchronous state. It is driven by a
//! single owner, see [`crate::worker`].

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::accumulator::{Accumulated, SampleAccumulator};
use crate::error::{SessionError, SessionResult};
use crate::sample::{Sample, SampleSet};
use crate::units::Units;

pub const DEFAULT_SENSOR_WIDTH_MM: f64 = 5.9;
pub const DEFAULT_SUBSAMPLES: usize = 10;
pub const DEFAULT_OUTLIER_PERCENT: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationState {
    /// Pixel position recorded as physical zero.
    pub zero: Option<f64>,
    pub sensor_width: f64,
    /// Length of the processed profile, in pixels.
    pub data_width: usize,
    pub units: Units,
    pub subsamples: usize,
    pub outlier_percent: f64,
}

impl Default for CalibrationState {
    fn default() -> Self {
        Self {
            zero: None,
            sensor_width: DEFAULT_SENSOR_WIDTH_MM,
            data_width: 0,
            units: Units::default(),
            subsamples: DEFAULT_SUBSAMPLES,
            outlier_percent: DEFAULT_OUTLIER_PERCENT,
        }
    }
}

impl CalibrationState {
    /// Checks the settings a measurement depends on.
    pub fn validate(&self) -> SessionResult<()> {
        if self.subsamples == 0 {
            return Err(SessionError::InvalidSubsamples(self.subsamples));
        }
        if !(0.0..100.0).contains(&self.outlier_percent) {
            return Err(SessionError::InvalidOutlierPercent(self.outlier_percent));
        }
        if !self.sensor_width.is_finite() || self.sensor_width <= 0.0 {
            return Err(SessionError::InvalidSensorWidth(self.sensor_width));
        }
        Ok(())
    }

    /// Millimeters per profile pixel.
    pub fn mm_per_pixel(&self) -> SessionResult<f64> {
        if self.data_width == 0 {
            return Err(SessionError::Uncalibrated);
        }
        Ok(self.sensor_width / self.data_width as f64)
    }

    /// Converts a pixel centroid into millimeters from the zero reference.
    pub fn to_physical(&self, value: f64) -> SessionResult<f64> {
        let zero = self.zero.ok_or(SessionError::NotZeroed)?;
        Ok(self.mm_per_pixel()? * (value - zero))
    }
}

/// What a running measurement will do when it completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleIntent {
    Zero,
    Append,
    Replace { index: usize },
}

impl SampleIntent {
    pub fn from_flags(is_zero: bool, is_replace: bool, replace_index: usize) -> Self {
        match (is_zero, is_replace) {
            (true, _) => SampleIntent::Zero,
            (false, true) => SampleIntent::Replace {
                index: replace_index,
            },
            (false, false) => SampleIntent::Append,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleOutcome {
    Zeroed { zero: f64 },
    Measured { index: usize, value_mm: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleCompletion {
    pub intent: SampleIntent,
    pub outcome: SessionResult<SampleOutcome>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubSampleResult {
    Ignored,
    Progress { received: usize, total: usize },
    Complete(SampleCompletion),
}

#[derive(Debug, Default)]
pub struct MeasurementSession {
    calibration: CalibrationState,
    samples: SampleSet,
    accumulator: SampleAccumulator,
    pending: Option<SampleIntent>,
}

impl MeasurementSession {
    pub fn new(calibration: CalibrationState) -> Self {
        Self {
            calibration,
            ..Self::default()
        }
    }

    pub fn calibration(&self) -> &CalibrationState {
        &self.calibration
    }

    pub fn samples(&self) -> &SampleSet {
        &self.samples
    }

    pub fn is_collecting(&self) -> bool {
        self.accumulator.is_collecting()
    }

    pub fn pending_intent(&self) -> Option<SampleIntent> {
        self.pending
    }

    /// `(received, total)` sub-samples of the running measurement.
    pub fn progress(&self) -> Option<(usize, usize)> {
        self.accumulator.progress()
    }

    /// Starts a measurement. Only one may be in flight at a time.
    ///
    /// Zeroing discards the previous zero and every sample.
    pub fn start_sample(&mut self, intent: SampleIntent) -> SessionResult<()> {
        if self.accumulator.is_collecting() {
            return Err(SessionError::Busy);
        }
        self.calibration.validate()?;

        match intent {
            SampleIntent::Zero => {
                self.calibration.zero = None;
                self.samples.clear();
            }
            SampleIntent::Append => {
                self.require_zero()?;
            }
            SampleIntent::Replace { index } => {
                self.require_zero()?;
                self.samples.check_index(index)?;
            }
        }

        self.accumulator
            .start(self.calibration.subsamples, self.calibration.outlier_percent);
        self.pending = Some(intent);
        Ok(())
    }

    fn require_zero(&self) -> SessionResult<()> {
        match self.calibration.zero {
            Some(_) => Ok(()),
            None => Err(SessionError::NotZeroed),
        }
    }

    /// Feeds one centroid reading from the frame pipeline.
    pub fn sub_sample(&mut self, centroid: f64) -> SubSampleResult {
        match self.accumulator.sample_in(centroid) {
            Accumulated::Ignored => SubSampleResult::Ignored,
            Accumulated::Progress { received, total } => {
                SubSampleResult::Progress { received, total }
            }
            Accumulated::Ready { mean, .. } => match self.received_sample(mean) {
                Some(completion) => SubSampleResult::Complete(completion),
                None => SubSampleResult::Ignored,
            },
        }
    }

    /// Applies an aggregated centroid to the pending measurement.
    ///
    /// Returns `None` if nothing was pending.
    pub fn received_sample(&mut self, value: f64) -> Option<SampleCompletion> {
        let intent = self.pending.take()?;
        let outcome = match intent {
            SampleIntent::Zero => {
                self.calibration.zero = Some(value);
                info!("Zero reference set at {value:.3} px");
                Ok(SampleOutcome::Zeroed { zero: value })
            }
            SampleIntent::Append => self
                .calibration
                .to_physical(value)
                .map(|value_mm| SampleOutcome::Measured {
                    index: self.samples.append(value_mm),
                    value_mm,
                }),
            SampleIntent::Replace { index } => {
                self.calibration.to_physical(value).and_then(|value_mm| {
                    self.samples.replace(index, value_mm)?;
                    Ok(SampleOutcome::Measured { index, value_mm })
                })
            }
        };

        match &outcome {
            Ok(SampleOutcome::Measured { index, value_mm }) => {
                info!("Sample {index} measured: {}", self.calibration.units.format(*value_mm));
            }
            Ok(SampleOutcome::Zeroed { .. }) => {}
            Err(err) => warn!("Sample {intent:?} failed: {err}"),
        }

        Some(SampleCompletion { intent, outcome })
    }

    /// Abandons the running measurement, completing it with `TimedOut`.
    pub fn time_out(&mut self) -> Option<SampleCompletion> {
        if !self.accumulator.abort() {
            return None;
        }
        let intent = self.pending.take()?;
        warn!("Sample {intent:?} timed out");
        Some(SampleCompletion {
            intent,
            outcome: Err(SessionError::TimedOut),
        })
    }

    /// Removes a sample. Refused while a replace is in flight, since the
    /// target index would shift.
    pub fn delete_sample(&mut self, index: usize) -> SessionResult<Sample> {
        if matches!(self.pending, Some(SampleIntent::Replace { .. })) {
            return Err(SessionError::Busy);
        }
        self.samples.remove(index)
    }

    /// Records the profile length. Returns `true` if a set zero was
    /// invalidated because the pixel scale changed.
    pub fn set_data_width(&mut self, data_width: usize) -> bool {
        if data_width == self.calibration.data_width {
            return false;
        }
        let had_width = self.calibration.data_width != 0;
        self.calibration.data_width = data_width;
        had_width && self.invalidate_zero("profile width changed")
    }

    /// Returns `true` if a set zero was invalidated.
    pub fn set_sensor_width(&mut self, sensor_width: f64) -> SessionResult<bool> {
        if !sensor_width.is_finite() || sensor_width <= 0.0 {
            return Err(SessionError::InvalidSensorWidth(sensor_width));
        }
        if sensor_width == self.calibration.sensor_width {
            return Ok(false);
        }
        self.calibration.sensor_width = sensor_width;
        Ok(self.invalidate_zero("sensor width changed"))
    }

    /// Returns `true` if a set zero was invalidated.
    pub fn camera_changed(&mut self) -> bool {
        self.calibration.data_width = 0;
        self.invalidate_zero("camera changed")
    }

    pub fn set_subsamples(&mut self, subsamples: usize) -> SessionResult<()> {
        if subsamples == 0 {
            return Err(SessionError::InvalidSubsamples(subsamples));
        }
        self.calibration.subsamples = subsamples;
        Ok(())
    }

    pub fn set_outlier_percent(&mut self, outlier_percent: f64) -> SessionResult<()> {
        if !(0.0..100.0).contains(&outlier_percent) {
            return Err(SessionError::InvalidOutlierPercent(outlier_percent));
        }
        self.calibration.outlier_percent = outlier_percent;
        Ok(())
    }

    pub fn set_units(&mut self, units: Units) {
        self.calibration.units = units;
    }

    fn invalidate_zero(&mut self, reason: &str) -> bool {
        if self.calibration.zero.take().is_some() {
            warn!("Zero reference invalidated: {reason}");
            true
        } else {
            false
        }
    }
}
