//! Laser line measurement core.
//!
//! Camera frames are reduced to a 1-D intensity profile, the laser line is
//! located to sub-pixel precision, repeated readings are aggregated into
//! outlier-trimmed samples and the sample list is analysed for flatness.
//!
//! ```text
//! Frame -> FrameReducer -> Profile -> PeakLocator -> centroid
//!       -> SessionWorker (SampleAccumulator -> MeasurementSession)
//!       -> SampleSet (flatness) -> SessionSnapshot / SessionEvent
//! ```

pub mod accumulator;
pub mod config;
pub mod cycle;
pub mod error;
pub mod export;
pub mod flatness;
pub mod frame;
pub mod peak;
pub mod pipeline;
pub mod reducer;
pub mod remote;
pub mod sample;
pub mod session;
pub mod units;
pub mod worker;

pub use accumulator::{Accumulated, SampleAccumulator};
pub use config::Config;
pub use cycle::CyclicMeasurement;
pub use error::{SessionError, SessionResult};
pub use export::{ExportError, ExportRow};
pub use flatness::RegressionLine;
pub use frame::{Frame, FrameError, ScanAxis};
pub use peak::{CentroidMethod, FitPath, PeakFit, PeakLocator};
pub use pipeline::{AnalyserFrame, FramePipeline};
pub use reducer::{FrameReducer, Profile};
pub use remote::{RemoteCommand, RemoteReply};
pub use sample::{Sample, SampleSet};
pub use session::{
    CalibrationState, MeasurementSession, SampleCompletion, SampleIntent, SampleOutcome,
};
pub use units::Units;
pub use worker::{SessionEvent, SessionHandle, SessionSnapshot, SessionWorker};
