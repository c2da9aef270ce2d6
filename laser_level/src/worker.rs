//! Session actor.
//!
//! One tokio task owns the [`MeasurementSession`]. Everything else talks to
//! it through a [`SessionHandle`]: commands go in over an unbounded channel,
//! results come back on oneshot replies or as [`SessionEvent`]s, and the
//! current state is read from a published [`SessionSnapshot`].

use std::sync::Arc;
use std::time::Duration;

use common::Published;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, warn};

use crate::error::{SessionError, SessionResult};
use crate::flatness::RegressionLine;
use crate::sample::Sample;
use crate::session::{
    CalibrationState, MeasurementSession, SampleCompletion, SampleIntent, SampleOutcome,
    SubSampleResult,
};
use crate::units::Units;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SubSampleProgress { received: usize, total: usize },
    /// A frame produced no fit while collecting. `skipped` counts the
    /// misses of the current measurement.
    SubSampleSkipped { skipped: usize },
    SampleComplete(SampleCompletion),
    SamplesChanged,
    ZeroInvalidated,
    UnitsChanged(Units),
}

/// Immutable view of the session published after every change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub calibration: CalibrationState,
    pub samples: Vec<Sample>,
    pub regression: Option<RegressionLine>,
    /// Intent of the measurement in flight.
    pub collecting: Option<SampleIntent>,
}

impl SessionSnapshot {
    fn capture(session: &MeasurementSession) -> Self {
        Self {
            calibration: *session.calibration(),
            samples: session.samples().samples().to_vec(),
            regression: session.samples().regression(),
            collecting: session.pending_intent(),
        }
    }
}

#[derive(Debug)]
pub enum WorkerMessage {
    Exit,
    StartSample {
        intent: SampleIntent,
        reply: oneshot::Sender<SessionResult<()>>,
        done: Option<oneshot::Sender<SampleCompletion>>,
    },
    SubSample {
        centroid: f64,
        data_width: usize,
    },
    SubSampleSkipped {
        data_width: usize,
    },
    DeleteSample {
        index: usize,
        reply: oneshot::Sender<SessionResult<Sample>>,
    },
    SetUnits(Units),
    SetSensorWidth {
        sensor_width: f64,
        reply: oneshot::Sender<SessionResult<bool>>,
    },
    SetSubsamples {
        subsamples: usize,
        reply: oneshot::Sender<SessionResult<()>>,
    },
    SetOutlierPercent {
        outlier_percent: f64,
        reply: oneshot::Sender<SessionResult<()>>,
    },
    CameraChanged,
}

/// Cheap to clone; every clone talks to the same worker.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: UnboundedSender<WorkerMessage>,
    snapshot: Arc<Published<SessionSnapshot>>,
}

#[derive(Debug)]
pub struct SessionWorker {
    thread_handle: Option<JoinHandle<()>>,
    handle: SessionHandle,
}

impl SessionWorker {
    /// Spawns the worker on the current tokio runtime.
    ///
    /// With `sample_timeout` set, a measurement still collecting after that
    /// long completes with [`SessionError::TimedOut`].
    pub fn new<Callback>(
        calibration: CalibrationState,
        sample_timeout: Option<Duration>,
        callback: Callback,
    ) -> Self
    where
        Callback: Fn(SessionEvent) + Send + 'static,
    {
        let session = MeasurementSession::new(calibration);
        let snapshot = Arc::new(Published::new(SessionSnapshot::capture(&session)));
        let (tx, rx) = unbounded_channel::<WorkerMessage>();

        let thread_handle = tokio::spawn({
            let snapshot = Arc::clone(&snapshot);
            async move {
                worker_loop(rx, session, snapshot, sample_timeout, callback).await;
            }
        });

        Self {
            thread_handle: Some(thread_handle),
            handle: SessionHandle { tx, snapshot },
        }
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn exit(&mut self) {
        let _ = self.handle.tx.send(WorkerMessage::Exit);
        self.thread_handle.take();
    }
}

impl Drop for SessionWorker {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            error!(
                "SessionWorker dropped while the task is still running; call SessionWorker::exit() first"
            );
        }
    }
}

impl SessionHandle {
    fn send(&self, msg: WorkerMessage) -> SessionResult<()> {
        self.tx.send(msg).map_err(|_| SessionError::WorkerStopped)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> WorkerMessage,
    ) -> SessionResult<T> {
        let (reply, rx) = oneshot::channel();
        self.send(make(reply))?;
        rx.await.map_err(|_| SessionError::WorkerStopped)
    }

    /// Starts a measurement and returns once the worker accepted it.
    pub async fn start_sample(&self, intent: SampleIntent) -> SessionResult<()> {
        self.request(|reply| WorkerMessage::StartSample {
            intent,
            reply,
            done: None,
        })
        .await?
    }

    /// Starts a measurement and waits for it to complete.
    pub async fn measure(&self, intent: SampleIntent) -> SessionResult<SampleCompletion> {
        let (done, completed) = oneshot::channel();
        self.request(|reply| WorkerMessage::StartSample {
            intent,
            reply,
            done: Some(done),
        })
        .await??;
        completed.await.map_err(|_| SessionError::WorkerStopped)
    }

    /// Non-blocking; called from the frame pipeline.
    pub fn sub_sample(&self, centroid: f64, data_width: usize) -> SessionResult<()> {
        self.send(WorkerMessage::SubSample {
            centroid,
            data_width,
        })
    }

    /// Reports a frame that produced no fit.
    pub fn sub_sample_skipped(&self, data_width: usize) -> SessionResult<()> {
        self.send(WorkerMessage::SubSampleSkipped { data_width })
    }

    pub async fn delete_sample(&self, index: usize) -> SessionResult<Sample> {
        self.request(|reply| WorkerMessage::DeleteSample { index, reply })
            .await?
    }

    pub fn set_units(&self, units: Units) -> SessionResult<()> {
        self.send(WorkerMessage::SetUnits(units))
    }

    /// Returns `true` if the zero reference was invalidated.
    pub async fn set_sensor_width(&self, sensor_width: f64) -> SessionResult<bool> {
        self.request(|reply| WorkerMessage::SetSensorWidth {
            sensor_width,
            reply,
        })
        .await?
    }

    pub async fn set_subsamples(&self, subsamples: usize) -> SessionResult<()> {
        self.request(|reply| WorkerMessage::SetSubsamples { subsamples, reply })
            .await?
    }

    pub async fn set_outlier_percent(&self, outlier_percent: f64) -> SessionResult<()> {
        self.request(|reply| WorkerMessage::SetOutlierPercent {
            outlier_percent,
            reply,
        })
        .await?
    }

    pub fn camera_changed(&self) -> SessionResult<()> {
        self.send(WorkerMessage::CameraChanged)
    }

    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        self.snapshot.load()
    }
}

/// Per-measurement bookkeeping that lives beside the session.
#[derive(Debug, Default)]
struct InFlight {
    deadline: Option<Instant>,
    skipped: usize,
    done: Option<oneshot::Sender<SampleCompletion>>,
}

fn publish(snapshot: &Published<SessionSnapshot>, session: &MeasurementSession) {
    snapshot.publish(SessionSnapshot::capture(session));
}

/// Replies and events go out after the snapshot is published, so anyone
/// reacting to them reads the new state.
async fn worker_loop<Callback>(
    mut rx: UnboundedReceiver<WorkerMessage>,
    mut session: MeasurementSession,
    snapshot: Arc<Published<SessionSnapshot>>,
    sample_timeout: Option<Duration>,
    callback: Callback,
) where
    Callback: Fn(SessionEvent) + Send + 'static,
{
    let mut in_flight = InFlight::default();

    loop {
        let msg = match in_flight.deadline {
            Some(deadline) => tokio::select! {
                msg = rx.recv() => msg,
                _ = sleep_until(deadline) => {
                    in_flight.deadline = None;
                    if let Some(completion) = session.time_out() {
                        publish(&snapshot, &session);
                        finish(&mut in_flight, completion, &callback);
                    }
                    continue;
                }
            },
            None => rx.recv().await,
        };
        let Some(msg) = msg else { break };

        match msg {
            WorkerMessage::Exit => break,

            WorkerMessage::StartSample {
                intent,
                reply,
                done,
            } => {
                let had_samples = !session.samples().is_empty();
                let result = session.start_sample(intent);
                publish(&snapshot, &session);
                match &result {
                    Ok(()) => {
                        debug!("Measurement started: {intent:?}");
                        in_flight = InFlight {
                            deadline: sample_timeout.map(|timeout| Instant::now() + timeout),
                            skipped: 0,
                            done,
                        };
                        if had_samples && session.samples().is_empty() {
                            callback(SessionEvent::SamplesChanged);
                        }
                    }
                    Err(err) => warn!("Measurement {intent:?} rejected: {err}"),
                }
                let _ = reply.send(result);
            }

            WorkerMessage::SubSample {
                centroid,
                data_width,
            } => {
                let invalidated = session.set_data_width(data_width);
                let total = session.progress().map_or(0, |(_, total)| total);
                let result = session.sub_sample(centroid);
                publish(&snapshot, &session);
                if invalidated {
                    callback(SessionEvent::ZeroInvalidated);
                }
                match result {
                    SubSampleResult::Ignored => {}
                    SubSampleResult::Progress { received, total } => {
                        debug!("Sub-sample {received}/{total}: {centroid:.3} px");
                        callback(SessionEvent::SubSampleProgress { received, total });
                    }
                    SubSampleResult::Complete(completion) => {
                        callback(SessionEvent::SubSampleProgress {
                            received: total,
                            total,
                        });
                        finish(&mut in_flight, completion, &callback);
                    }
                }
            }

            WorkerMessage::SubSampleSkipped { data_width } => {
                let invalidated = session.set_data_width(data_width);
                publish(&snapshot, &session);
                if invalidated {
                    callback(SessionEvent::ZeroInvalidated);
                }
                if session.is_collecting() {
                    in_flight.skipped += 1;
                    debug!("Sub-sample skipped, no fit ({} so far)", in_flight.skipped);
                    callback(SessionEvent::SubSampleSkipped {
                        skipped: in_flight.skipped,
                    });
                }
            }

            WorkerMessage::DeleteSample { index, reply } => {
                let result = session.delete_sample(index);
                publish(&snapshot, &session);
                if result.is_ok() {
                    callback(SessionEvent::SamplesChanged);
                }
                let _ = reply.send(result);
            }

            WorkerMessage::SetUnits(units) => {
                session.set_units(units);
                publish(&snapshot, &session);
                callback(SessionEvent::UnitsChanged(units));
            }

            WorkerMessage::SetSensorWidth {
                sensor_width,
                reply,
            } => {
                let result = session.set_sensor_width(sensor_width);
                publish(&snapshot, &session);
                if result == Ok(true) {
                    callback(SessionEvent::ZeroInvalidated);
                }
                let _ = reply.send(result);
            }

            WorkerMessage::SetSubsamples { subsamples, reply } => {
                let result = session.set_subsamples(subsamples);
                publish(&snapshot, &session);
                let _ = reply.send(result);
            }

            WorkerMessage::SetOutlierPercent {
                outlier_percent,
                reply,
            } => {
                let result = session.set_outlier_percent(outlier_percent);
                publish(&snapshot, &session);
                let _ = reply.send(result);
            }

            WorkerMessage::CameraChanged => {
                let invalidated = session.camera_changed();
                publish(&snapshot, &session);
                if invalidated {
                    callback(SessionEvent::ZeroInvalidated);
                }
            }
        }
    }

    debug!("Session worker stopped");
}

fn finish<Callback>(in_flight: &mut InFlight, completion: SampleCompletion, callback: &Callback)
where
    Callback: Fn(SessionEvent),
{
    let changed = matches!(completion.outcome, Ok(SampleOutcome::Measured { .. }));
    if let Some(done) = in_flight.done.take() {
        let _ = done.send(completion.clone());
    }
    *in_flight = InFlight::default();
    callback(SessionEvent::SampleComplete(completion));
    if changed {
        callback(SessionEvent::SamplesChanged);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    fn calibration() -> CalibrationState {
        CalibrationState {
            subsamples: 3,
            outlier_percent: 0.0,
            ..CalibrationState::default()
        }
    }

    fn spawn(
        sample_timeout: Option<Duration>,
    ) -> (SessionWorker, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = SessionWorker::new(calibration(), sample_timeout, move |event| {
            let _ = tx.send(event);
        });
        (worker, rx)
    }

    async fn next_completion(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SampleCompletion {
        loop {
            let event = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
            if let SessionEvent::SampleComplete(completion) = event {
                return completion;
            }
        }
    }

    #[tokio::test]
    async fn zero_and_measure() {
        let (mut worker, mut events) = spawn(None);
        let handle = worker.handle();

        handle.start_sample(SampleIntent::Zero).await.unwrap();
        for _ in 0..3 {
            handle.sub_sample(500.0, 1920).unwrap();
        }
        let zeroed = next_completion(&mut events).await;
        assert_eq!(zeroed.outcome, Ok(SampleOutcome::Zeroed { zero: 500.0 }));

        let measuring = tokio::spawn({
            let handle = handle.clone();
            async move { handle.measure(SampleIntent::Append).await }
        });
        // Sub-samples sent before the start is processed are ignored.
        while handle.snapshot().collecting.is_none() {
            tokio::task::yield_now().await;
        }
        for _ in 0..3 {
            handle.sub_sample(600.0, 1920).unwrap();
        }
        let completion = timeout(WAIT, measuring).await.unwrap().unwrap().unwrap();
        let Ok(SampleOutcome::Measured { index, value_mm }) = completion.outcome else {
            panic!("unexpected {completion:?}");
        };
        assert_eq!(index, 0);
        assert!((value_mm - 0.30729).abs() < 1e-5);

        timeout(WAIT, async {
            while handle.snapshot().samples.len() != 1 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        worker.exit();
    }

    #[tokio::test]
    async fn start_while_collecting_is_busy() {
        let (mut worker, _events) = spawn(None);
        let handle = worker.handle();
        handle.start_sample(SampleIntent::Zero).await.unwrap();
        assert_eq!(
            handle.start_sample(SampleIntent::Zero).await,
            Err(SessionError::Busy)
        );
        worker.exit();
    }

    #[tokio::test]
    async fn append_without_zero_is_rejected() {
        let (mut worker, _events) = spawn(None);
        let handle = worker.handle();
        assert_eq!(
            handle.measure(SampleIntent::Append).await,
            Err(SessionError::NotZeroed)
        );
        worker.exit();
    }

    #[tokio::test]
    async fn skipped_frames_are_reported() {
        let (mut worker, mut events) = spawn(None);
        let handle = worker.handle();
        handle.sub_sample_skipped(640).unwrap();
        handle.start_sample(SampleIntent::Zero).await.unwrap();
        handle.sub_sample_skipped(640).unwrap();
        handle.sub_sample_skipped(640).unwrap();

        let mut skipped = Vec::new();
        while skipped.len() < 2 {
            let event = timeout(WAIT, events.recv()).await.unwrap().unwrap();
            if let SessionEvent::SubSampleSkipped { skipped: n } = event {
                skipped.push(n);
            }
        }
        assert_eq!(skipped, vec![1, 2]);
        worker.exit();
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_completes_measurement() {
        let (mut worker, mut events) = spawn(Some(Duration::from_secs(2)));
        let handle = worker.handle();
        handle.start_sample(SampleIntent::Zero).await.unwrap();
        handle.sub_sample(1.0, 100).unwrap();

        let completion = next_completion(&mut events).await;
        assert_eq!(completion.outcome, Err(SessionError::TimedOut));

        // Idle again: a new measurement is accepted.
        handle.start_sample(SampleIntent::Zero).await.unwrap();
        worker.exit();
    }

    #[tokio::test]
    async fn sensor_width_change_invalidates_zero() {
        let (mut worker, mut events) = spawn(None);
        let handle = worker.handle();
        handle.start_sample(SampleIntent::Zero).await.unwrap();
        for _ in 0..3 {
            handle.sub_sample(10.0, 100).unwrap();
        }
        next_completion(&mut events).await;

        assert_eq!(handle.set_sensor_width(7.0).await, Ok(true));
        assert_eq!(
            handle.set_sensor_width(-1.0).await,
            Err(SessionError::InvalidSensorWidth(-1.0))
        );
        loop {
            let event = timeout(WAIT, events.recv()).await.unwrap().unwrap();
            if event == SessionEvent::ZeroInvalidated {
                break;
            }
        }
        assert_eq!(handle.snapshot().calibration.zero, None);
        worker.exit();
    }

    #[tokio::test]
    async fn stopped_worker_reports_error() {
        let (mut worker, _events) = spawn(None);
        let handle = worker.handle();
        worker.exit();
        timeout(WAIT, async {
            while handle.sub_sample(1.0, 10).is_ok() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(
            handle.start_sample(SampleIntent::Zero).await,
            Err(SessionError::WorkerStopped)
        );
    }
}
