//! Frame pipeline: camera frames in, centroids out to the session worker.
//!
//! At most one frame is in flight. A frame offered while the previous one
//! is still being processed is dropped, never queued.

use std::sync::Arc;

use common::{Published, ReadyGate, ReadyPermit};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinHandle;
use tracing::{error, trace, warn};

use crate::error::{SessionError, SessionResult};
use crate::frame::Frame;
use crate::peak::{PeakFit, PeakLocator};
use crate::reducer::{FrameReducer, Profile};
use crate::session::{SampleCompletion, SampleIntent};
use crate::worker::SessionHandle;

/// What the analyser display needs for one processed frame.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyserFrame {
    pub profile: Profile,
    pub centroid: Option<PeakFit>,
    pub zero: Option<f64>,
    /// Centroid relative to zero in display units, once zeroed.
    pub label: Option<String>,
}

#[derive(Debug)]
pub struct FramePipeline {
    gate: ReadyGate,
    tx: Sender<(Frame, ReadyPermit)>,
    reducer: Arc<Published<FrameReducer>>,
    locator: Arc<Published<PeakLocator>>,
    session: SessionHandle,
    task: Option<JoinHandle<()>>,
}

impl FramePipeline {
    /// Spawns the pipeline task on the current tokio runtime. `callback`
    /// receives every processed frame.
    pub fn new<Callback>(
        reducer: FrameReducer,
        locator: PeakLocator,
        session: SessionHandle,
        callback: Callback,
    ) -> Self
    where
        Callback: Fn(AnalyserFrame) + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(1);
        let reducer = Arc::new(Published::new(reducer));
        let locator = Arc::new(Published::new(locator));

        let task = tokio::spawn({
            let reducer = Arc::clone(&reducer);
            let locator = Arc::clone(&locator);
            let session = session.clone();
            async move {
                pipeline_loop(rx, reducer, locator, session, callback).await;
            }
        });

        Self {
            gate: ReadyGate::new(),
            tx,
            reducer,
            locator,
            session,
            task: Some(task),
        }
    }

    /// Hands a frame to the pipeline. Returns `false` if it was dropped
    /// because the previous frame is still in flight.
    pub fn offer(&self, frame: Frame) -> bool {
        let Some(permit) = self.gate.try_acquire() else {
            trace!("Frame dropped: pipeline busy");
            return false;
        };
        match self.tx.try_send((frame, permit)) {
            Ok(()) => true,
            Err(err) => {
                warn!("Frame dropped: {err}");
                false
            }
        }
    }

    /// Validates raw pixels first; malformed frames are logged and dropped.
    pub fn offer_raw(&self, width: usize, height: usize, pixels: Vec<u8>) -> bool {
        match Frame::new(width, height, pixels) {
            Ok(frame) => self.offer(frame),
            Err(err) => {
                warn!("Malformed frame dropped: {err}");
                false
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.gate.is_ready()
    }

    /// Resolves once the pipeline can take another frame.
    pub async fn wait_ready(&self) {
        self.gate.wait_ready().await;
    }

    /// Runs one measurement on recorded frames, offering them in turn
    /// (repeating as needed) whenever the pipeline is ready.
    ///
    /// Returns only after the last offered frame has left the pipeline, so
    /// none of its readings reach a later measurement.
    pub async fn measure(
        &self,
        intent: SampleIntent,
        frames: &[Frame],
    ) -> SessionResult<SampleCompletion> {
        if frames.is_empty() {
            return Err(SessionError::NoFrames);
        }
        self.wait_ready().await;

        let measuring = self.session.measure(intent);
        tokio::pin!(measuring);
        let mut frames = frames.iter().cycle();

        let completion = loop {
            tokio::select! {
                biased;
                completion = &mut measuring => break completion,
                _ = self.wait_ready() => {
                    if let Some(frame) = frames.next() {
                        self.offer(frame.clone());
                    }
                }
            }
        };

        self.wait_ready().await;
        completion
    }

    /// Takes effect from the next frame.
    pub fn set_reducer(&self, reducer: FrameReducer) {
        self.reducer.publish(reducer);
    }

    pub fn reducer(&self) -> FrameReducer {
        *self.reducer.load()
    }

    pub fn set_locator(&self, locator: PeakLocator) {
        self.locator.publish(locator);
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for FramePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn pipeline_loop<Callback>(
    mut rx: Receiver<(Frame, ReadyPermit)>,
    reducer: Arc<Published<FrameReducer>>,
    locator: Arc<Published<PeakLocator>>,
    session: SessionHandle,
    callback: Callback,
) where
    Callback: Fn(AnalyserFrame) + Send + 'static,
{
    while let Some((frame, permit)) = rx.recv().await {
        let reducer = *reducer.load();
        let locator = locator.load();

        let processed = tokio::task::spawn_blocking(move || {
            let profile = reducer.reduce(&frame);
            let fit = locator.locate(profile.values());
            (profile, fit)
        })
        .await;

        let (profile, fit) = match processed {
            Ok(processed) => processed,
            Err(err) => {
                error!("Frame processing failed: {err}");
                continue;
            }
        };

        let data_width = profile.len();
        let sent = match fit {
            Some(fit) => session.sub_sample(fit.position, data_width),
            None => session.sub_sample_skipped(data_width),
        };
        if let Err(err) = sent {
            warn!("Centroid not delivered: {err}");
        }

        let snapshot = session.snapshot();
        let mut calibration = snapshot.calibration;
        calibration.data_width = data_width;
        let label = fit.and_then(|fit| {
            calibration
                .to_physical(fit.position)
                .ok()
                .map(|mm| calibration.units.format(mm))
        });

        callback(AnalyserFrame {
            profile,
            centroid: fit,
            zero: calibration.zero,
            label,
        });
        drop(permit);
    }
}

/// Maps a profile position to a display row, with row 0 at the top and
/// profile index 0 at the bottom.
pub fn display_row(position: f64, data_width: usize, height: usize) -> Option<i64> {
    if data_width == 0 || !position.is_finite() {
        return None;
    }
    let height = height as f64;
    Some((height - position * height / data_width as f64) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_row_flips_axis() {
        assert_eq!(display_row(0.0, 100, 400), Some(400));
        assert_eq!(display_row(25.0, 100, 400), Some(300));
        assert_eq!(display_row(100.0, 100, 400), Some(0));
        assert_eq!(display_row(10.0, 0, 400), None);
        assert_eq!(display_row(f64::NAN, 100, 400), None);
    }
}
