use thiserror::Error;

/// Errors raised by the measurement session and its worker.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    #[error("A measurement is already in progress")]
    Busy,
    #[error("No zero reference is set; zero the sensor before sampling")]
    NotZeroed,
    #[error("Sensor is not calibrated: profile width is zero")]
    Uncalibrated,
    #[error("Sample index {index} is out of range for {len} samples")]
    SampleIndexOutOfRange { index: usize, len: usize },
    #[error("Sub-sample count must be at least 1, got {0}")]
    InvalidSubsamples(usize),
    #[error("Outlier percent must be within [0, 100), got {0}")]
    InvalidOutlierPercent(f64),
    #[error("Sensor width must be positive and finite, got {0}")]
    InvalidSensorWidth(f64),
    #[error("Measurement timed out before all sub-samples arrived")]
    TimedOut,
    #[error("No frames to measure")]
    NoFrames,
    #[error("Session worker is not running")]
    WorkerStopped,
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;
