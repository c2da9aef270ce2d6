use serde::{Deserialize, Serialize};

use crate::error::{SessionError, SessionResult};
use crate::flatness::{self, RegressionLine};

/// One aggregated measurement of the surface, in millimeters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Position along the surface, in acquisition order.
    pub x: usize,
    pub y: f64,
    /// Signed residual against the best-fit line.
    pub lin_y_error: f64,
    pub shim: f64,
    pub scrape: f64,
}

impl Sample {
    pub fn new(x: usize, y: f64) -> Self {
        Self {
            x,
            y,
            ..Self::default()
        }
    }
}

/// Ordered samples with flatness fields kept current after every change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleSet {
    samples: Vec<Sample>,
    line: Option<RegressionLine>,
}

impl SampleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Best-fit line of the current samples, once there are enough of them.
    pub fn regression(&self) -> Option<RegressionLine> {
        self.line
    }

    /// Appends at `x = len` and returns the new index.
    pub fn append(&mut self, y: f64) -> usize {
        let index = self.samples.len();
        self.samples.push(Sample::new(index, y));
        self.recalculate();
        index
    }

    /// Overwrites `y` in place; `x` and every other sample are untouched.
    pub fn replace(&mut self, index: usize, y: f64) -> SessionResult<()> {
        let len = self.samples.len();
        let sample = self
            .samples
            .get_mut(index)
            .ok_or(SessionError::SampleIndexOutOfRange { index, len })?;
        sample.y = y;
        self.recalculate();
        Ok(())
    }

    /// Removes a sample and renumbers the ones after it so `x` stays equal
    /// to the position.
    pub fn remove(&mut self, index: usize) -> SessionResult<Sample> {
        let len = self.samples.len();
        if index >= len {
            return Err(SessionError::SampleIndexOutOfRange { index, len });
        }
        let removed = self.samples.remove(index);
        for (i, sample) in self.samples.iter_mut().enumerate().skip(index) {
            sample.x = i;
        }
        self.recalculate();
        Ok(removed)
    }

    pub fn check_index(&self, index: usize) -> SessionResult<()> {
        if index < self.samples.len() {
            Ok(())
        } else {
            Err(SessionError::SampleIndexOutOfRange {
                index,
                len: self.samples.len(),
            })
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.line = None;
    }

    fn recalculate(&mut self) {
        self.line = flatness::recalculate(&mut self.samples);
    }
}
