//! Stage settle detection.
//!
//! One algorithm for every motion backend; backends differ only in their
//! `SettleCfg` and in how a position is read.
//!
//! A sample is accepted into the window only while it is within tolerance of
//! the target; any other sample (or a failed read) clears the window. The axis
//! is settled once the window holds `duration / poll` samples whose spread is
//! within tolerance.
use std::collections::VecDeque;
use std::time::Duration;

use irradiant_traits::Clock;

use crate::config::SettleCfg;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SettleOutcome {
    Settled,
    TimedOut {
        /// Last position read, if the read succeeded.
        position: Option<f64>,
        /// `|position - target|`, when a position was read.
        distance: Option<f64>,
        /// Spread of the accepted window at the time of giving up.
        range: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SettleReport {
    pub target_nm: f64,
    pub outcome: SettleOutcome,
    pub elapsed: Duration,
    /// Position reads performed.
    pub polls: usize,
}

impl SettleReport {
    pub fn is_settled(&self) -> bool {
        matches!(self.outcome, SettleOutcome::Settled)
    }
}

fn spread(window: &VecDeque<f64>) -> f64 {
    let (lo, hi) = window
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if window.is_empty() { 0.0 } else { hi - lo }
}

/// Poll `read_position` until the axis is stable at `target_nm` or the
/// configured timeout elapses. Never returns an error; a timeout is reported
/// in the outcome.
pub fn wait_until_settled<C, F>(clock: &C, target_nm: f64, cfg: &SettleCfg, mut read_position: F) -> SettleReport
where
    C: Clock + ?Sized,
    F: FnMut() -> Option<f64>,
{
    let n = cfg.window_len();
    let tol = cfg.tolerance_nm;
    let mut window: VecDeque<f64> = VecDeque::with_capacity(n);
    let epoch = clock.now();
    let mut polls = 0usize;
    let mut last: Option<f64> = None;

    loop {
        let elapsed = clock.elapsed(epoch);
        if elapsed >= cfg.timeout {
            let distance = last.map(|p| (p - target_nm).abs());
            let range = spread(&window);
            tracing::warn!(
                target_nm,
                position_nm = ?last,
                distance_nm = ?distance,
                range_nm = range,
                tolerance_nm = tol,
                elapsed_ms = elapsed.as_millis() as u64,
                "settle timeout"
            );
            return SettleReport {
                target_nm,
                outcome: SettleOutcome::TimedOut {
                    position: last,
                    distance,
                    range,
                },
                elapsed,
                polls,
            };
        }

        let pos = read_position();
        polls += 1;
        last = pos;
        match pos {
            Some(p) if (p - target_nm).abs() <= tol => {
                if window.len() == n {
                    window.pop_front();
                }
                window.push_back(p);
            }
            _ => window.clear(),
        }

        if window.len() == n && spread(&window) <= tol {
            let elapsed = clock.elapsed(epoch);
            tracing::debug!(
                target_nm,
                polls,
                elapsed_ms = elapsed.as_millis() as u64,
                "settled"
            );
            return SettleReport {
                target_nm,
                outcome: SettleOutcome::Settled,
                elapsed,
                polls,
            };
        }
        clock.sleep(cfg.poll);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use irradiant_traits::test_clock::TestClock;

    fn cfg() -> SettleCfg {
        SettleCfg {
            poll: Duration::from_millis(10),
            duration: Duration::from_millis(50),
            tolerance_nm: 5.0,
            timeout: Duration::from_millis(500),
        }
    }

    #[test]
    fn settles_after_window_of_good_samples() {
        let clock = TestClock::new();
        let report = wait_until_settled(&clock, 100.0, &cfg(), || Some(101.0));
        assert!(report.is_settled());
        assert_eq!(report.polls, 5);
        assert_eq!(report.elapsed, Duration::from_millis(40));
    }

    #[test]
    fn overshoot_resets_window() {
        let clock = TestClock::new();
        let mut seq = [100.0, 100.0, 100.0, 120.0].into_iter();
        let report = wait_until_settled(&clock, 100.0, &cfg(), || Some(seq.next().unwrap_or(99.0)));
        assert!(report.is_settled());
        // 4 samples, then the window restarts and needs 5 more
        assert_eq!(report.polls, 9);
    }

    #[test]
    fn failed_reads_clear_window_and_time_out() {
        let clock = TestClock::new();
        let report = wait_until_settled(&clock, 0.0, &cfg(), || None);
        match report.outcome {
            SettleOutcome::TimedOut {
                position, distance, ..
            } => {
                assert_eq!(position, None);
                assert_eq!(distance, None);
            }
            SettleOutcome::Settled => panic!("should not settle"),
        }
        assert_eq!(report.elapsed, Duration::from_millis(500));
    }

    #[test]
    fn reaching_the_timeout_fails_even_if_the_window_would_fill_next_poll() {
        // N = 5 but only four polls fit before 40 ms
        let c = SettleCfg {
            timeout: Duration::from_millis(40),
            ..cfg()
        };
        let clock = TestClock::new();
        let report = wait_until_settled(&clock, 100.0, &c, || Some(100.0));
        assert!(!report.is_settled());
        assert_eq!(report.polls, 4);
        assert_eq!(report.elapsed, Duration::from_millis(40));
    }

    #[test]
    fn timeout_reports_distance_to_target() {
        let clock = TestClock::new();
        let report = wait_until_settled(&clock, 0.0, &cfg(), || Some(40.0));
        assert_eq!(
            report.outcome,
            SettleOutcome::TimedOut {
                position: Some(40.0),
                distance: Some(40.0),
                range: 0.0
            }
        );
    }
}
