//! Periodic measurement trigger: sample when zeroed, zero otherwise.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};

use crate::session::SampleIntent;
use crate::worker::SessionHandle;

pub const MIN_PERIOD: Duration = Duration::from_secs(10);
pub const MAX_PERIOD: Duration = Duration::from_secs(3600);

#[derive(Debug)]
pub struct CyclicMeasurement {
    task: Option<JoinHandle<()>>,
}

impl CyclicMeasurement {
    /// Starts the cycle on the current tokio runtime. The first trigger
    /// fires one `period` after the start.
    pub fn start(handle: SessionHandle, period: Duration) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let intent = next_intent(&handle);
                match handle.start_sample(intent).await {
                    Ok(()) => info!("Cyclic measurement: {intent:?}"),
                    Err(err) => warn!("Cyclic measurement skipped: {err}"),
                }
            }
        });

        Self { task: Some(task) }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for CyclicMeasurement {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Clamps a requested period to the supported range.
pub fn clamp_period(period: Duration) -> Duration {
    period.clamp(MIN_PERIOD, MAX_PERIOD)
}

fn next_intent(handle: &SessionHandle) -> SampleIntent {
    if handle.snapshot().calibration.zero.is_some() {
        SampleIntent::Append
    } else {
        SampleIntent::Zero
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::CalibrationState;
    use crate::worker::{SessionEvent, SessionWorker};
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    #[test]
    fn period_is_clamped() {
        assert_eq!(clamp_period(Duration::from_secs(1)), MIN_PERIOD);
        assert_eq!(clamp_period(Duration::from_secs(60)), Duration::from_secs(60));
        assert_eq!(clamp_period(Duration::from_secs(7200)), MAX_PERIOD);
    }

    #[tokio::test(start_paused = true)]
    async fn zeroes_first_then_samples() {
        let (tx, mut events) = mpsc::unbounded_channel();
        let calibration = CalibrationState {
            subsamples: 1,
            outlier_percent: 0.0,
            ..CalibrationState::default()
        };
        let mut worker = SessionWorker::new(calibration, None, move |event| {
            let _ = tx.send(event);
        });
        let handle = worker.handle();
        let mut cycle = CyclicMeasurement::start(handle.clone(), Duration::from_secs(60));
        assert!(cycle.is_running());

        let mut intents = Vec::new();
        while intents.len() < 2 {
            // Feed one frame per second until the cycle has started something.
            let event = loop {
                handle.sub_sample(42.0, 100).unwrap();
                match timeout(Duration::from_secs(1), events.recv()).await {
                    Ok(Some(SessionEvent::SampleComplete(completion))) => break completion,
                    Ok(Some(_)) | Err(_) => continue,
                    Ok(None) => panic!("worker stopped"),
                }
            };
            assert!(event.outcome.is_ok());
            intents.push(event.intent);
        }
        assert_eq!(intents, vec![SampleIntent::Zero, SampleIntent::Append]);

        cycle.stop();
        assert!(!cycle.is_running());
        worker.exit();
    }
}
