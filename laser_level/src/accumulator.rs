//! Aggregation of sub-sample centroids into one outlier-trimmed mean.

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Accumulated {
    /// No accumulation is running; the value was dropped.
    Ignored,
    Progress { received: usize, total: usize },
    /// Last sub-sample of the cycle. The accumulator is idle again.
    Ready {
        received: usize,
        total: usize,
        mean: f64,
    },
}

#[derive(Debug, Default)]
enum State {
    #[default]
    Idle,
    Collecting {
        total: usize,
        outlier_fraction: f64,
        values: Vec<f64>,
    },
}

#[derive(Debug, Default)]
pub struct SampleAccumulator {
    state: State,
}

impl SampleAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begins a new cycle, discarding anything collected so far. A `total`
    /// of 0 counts as 1.
    pub fn start(&mut self, total: usize, outlier_percent: f64) {
        let total = total.max(1);
        self.state = State::Collecting {
            total,
            outlier_fraction: outlier_percent / 100.0,
            values: Vec::with_capacity(total),
        };
    }

    pub fn is_collecting(&self) -> bool {
        matches!(self.state, State::Collecting { .. })
    }

    /// Returns `(received, total)` while collecting.
    pub fn progress(&self) -> Option<(usize, usize)> {
        match &self.state {
            State::Idle => None,
            State::Collecting { total, values, .. } => Some((values.len(), *total)),
        }
    }

    /// Stops the running cycle without producing a mean.
    pub fn abort(&mut self) -> bool {
        let was_collecting = self.is_collecting();
        self.state = State::Idle;
        was_collecting
    }

    pub fn sample_in(&mut self, value: f64) -> Accumulated {
        let State::Collecting {
            total,
            outlier_fraction,
            values,
        } = &mut self.state
        else {
            return Accumulated::Ignored;
        };

        values.push(value);
        let received = values.len();
        let total = *total;
        if received < total {
            return Accumulated::Progress { received, total };
        }

        let mean = trimmed_mean(values, *outlier_fraction);
        self.state = State::Idle;
        Accumulated::Ready {
            received,
            total,
            mean,
        }
    }
}

/// Sorts `values` and averages what remains after dropping
/// `floor(n * fraction / 2)` values from each end. A trim that would leave
/// nothing is skipped.
pub fn trimmed_mean(values: &mut [f64], outlier_fraction: f64) -> f64 {
    let n = values.len();
    if n == 0 {
        return f64::NAN;
    }
    values.sort_by(f64::total_cmp);

    let mut k = (n as f64 * outlier_fraction / 2.0).floor().max(0.0) as usize;
    if 2 * k >= n {
        k = 0;
    }
    let kept = &values[k..n - k];
    kept.iter().sum::<f64>() / kept.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(acc: &mut SampleAccumulator, values: &[f64]) -> Vec<Accumulated> {
        values.iter().map(|&v| acc.sample_in(v)).collect()
    }

    #[test]
    fn idle_ignores_values() {
        let mut acc = SampleAccumulator::new();
        assert_eq!(acc.sample_in(1.0), Accumulated::Ignored);
        assert!(!acc.is_collecting());
    }

    #[test]
    fn trims_one_from_each_end() {
        let mut acc = SampleAccumulator::new();
        acc.start(10, 20.0);
        let events = feed(&mut acc, &[10.0, 1.0, 9.0, 2.0, 8.0, 3.0, 7.0, 4.0, 6.0, 5.0]);

        for (i, event) in events.iter().take(9).enumerate() {
            assert_eq!(
                *event,
                Accumulated::Progress {
                    received: i + 1,
                    total: 10
                }
            );
        }
        assert_eq!(
            events[9],
            Accumulated::Ready {
                received: 10,
                total: 10,
                mean: 5.5
            }
        );
        assert!(!acc.is_collecting());
    }

    #[test]
    fn ready_fires_once_per_cycle() {
        let mut acc = SampleAccumulator::new();
        acc.start(2, 0.0);
        let events = feed(&mut acc, &[1.0, 3.0, 5.0]);
        let ready = events
            .iter()
            .filter(|e| matches!(e, Accumulated::Ready { .. }))
            .count();
        assert_eq!(ready, 1);
        assert_eq!(events[2], Accumulated::Ignored);
    }

    #[test]
    fn zero_trim_keeps_everything() {
        let mut values = [1.0, 2.0, 6.0];
        assert_eq!(trimmed_mean(&mut values, 0.3), 3.0);
    }

    #[test]
    fn over_trim_clamps_to_no_trim() {
        // k = floor(2 * 0.99) = 1, 2k >= n
        let mut values = [2.0, 4.0];
        assert_eq!(trimmed_mean(&mut values, 0.99 * 2.0), 3.0);
    }

    #[test]
    fn restart_discards_partial_cycle() {
        let mut acc = SampleAccumulator::new();
        acc.start(3, 0.0);
        acc.sample_in(100.0);
        acc.start(1, 0.0);
        assert_eq!(
            acc.sample_in(7.0),
            Accumulated::Ready {
                received: 1,
                total: 1,
                mean: 7.0
            }
        );
    }

    #[test]
    fn zero_total_waits_for_one_value() {
        let mut acc = SampleAccumulator::new();
        acc.start(0, 0.0);
        assert_eq!(acc.progress(), Some((0, 1)));
        assert_eq!(
            acc.sample_in(4.0),
            Accumulated::Ready {
                received: 1,
                total: 1,
                mean: 4.0
            }
        );
        assert!(!acc.is_collecting());
    }

    #[test]
    fn abort_returns_to_idle() {
        let mut acc = SampleAccumulator::new();
        acc.start(3, 0.0);
        acc.sample_in(1.0);
        assert_eq!(acc.progress(), Some((1, 3)));
        assert!(acc.abort());
        assert!(!acc.abort());
        assert_eq!(acc.sample_in(1.0), Accumulated::Ignored);
    }
}
