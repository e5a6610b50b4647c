//! Simulated stage axis.
//!
//! Position follows a first-order approach toward the last commanded target,
//! which is enough to exercise settle detection without a physical stage.
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use irradiant_traits::{AxisDirection, Clock, MonotonicClock, Stage};

use crate::error::HwError;
use crate::util::wait_until_with_timeout;

/// Distance from zero at which a homing run counts as finished.
const HOME_WINDOW_NM: f64 = 1.0;

#[derive(Debug, Clone, Copy)]
struct Motion {
    from: f64,
    target: f64,
    since: Instant,
}

pub struct SimulatedStage {
    axis: String,
    direction: AxisDirection,
    time_constant: Duration,
    clock: Arc<dyn Clock + Send + Sync>,
    motion: Mutex<Motion>,
    closed: Mutex<bool>,
}

impl SimulatedStage {
    pub fn new(axis: impl Into<String>) -> Self {
        Self::with_clock(axis, Arc::new(MonotonicClock::new()))
    }

    pub fn with_clock(axis: impl Into<String>, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        let since = clock.now();
        Self {
            axis: axis.into(),
            direction: AxisDirection::default(),
            time_constant: Duration::from_millis(2),
            clock,
            motion: Mutex::new(Motion {
                from: 0.0,
                target: 0.0,
                since,
            }),
            closed: Mutex::new(false),
        }
    }

    pub fn with_direction(mut self, direction: AxisDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Time constant of the exponential approach; zero jumps instantly.
    pub fn with_time_constant(mut self, tau: Duration) -> Self {
        self.time_constant = tau;
        self
    }

    /// Place the axis at `position_nm` with no motion in progress.
    pub fn at(self, position_nm: f64) -> Self {
        if let Ok(mut m) = self.motion.lock() {
            m.from = position_nm;
            m.target = position_nm;
            m.since = self.clock.now();
        }
        self
    }

    fn position_of(&self, m: &Motion) -> f64 {
        let tau = self.time_constant.as_secs_f64();
        if tau <= 0.0 {
            return m.target;
        }
        let t = self.clock.elapsed(m.since).as_secs_f64();
        m.target + (m.from - m.target) * (-t / tau).exp()
    }

    fn ensure_open(&self) -> Result<(), HwError> {
        match self.closed.lock() {
            Ok(closed) if *closed => Err(HwError::Closed),
            Ok(_) => Ok(()),
            Err(_) => Err(HwError::Transport("stage state poisoned".into())),
        }
    }
}

impl Stage for SimulatedStage {
    fn axis(&self) -> &str {
        &self.axis
    }

    fn direction(&self) -> AxisDirection {
        self.direction
    }

    fn position(&self) -> Option<f64> {
        self.ensure_open().ok()?;
        let m = self.motion.lock().ok()?;
        Some(self.position_of(&m))
    }

    fn desired_position(&self) -> f64 {
        self.motion.lock().map(|m| m.target).unwrap_or(0.0)
    }

    fn command_move(&self, target_nm: f64) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.ensure_open()?;
        let mut m = self
            .motion
            .lock()
            .map_err(|_| HwError::Transport("stage state poisoned".into()))?;
        let current = self.position_of(&m);
        *m = Motion {
            from: current,
            target: target_nm,
            since: self.clock.now(),
        };
        tracing::trace!(axis = %self.axis, target_nm, from_nm = current, "simulated move");
        Ok(())
    }

    fn stop(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut m = self
            .motion
            .lock()
            .map_err(|_| HwError::Transport("stage state poisoned".into()))?;
        let current = self.position_of(&m);
        *m = Motion {
            from: current,
            target: current,
            since: self.clock.now(),
        };
        Ok(())
    }

    fn home(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.command_move(0.0)?;
        let budget = self.time_constant.saturating_mul(50).max(Duration::from_millis(10));
        let poll = (self.time_constant / 4).max(Duration::from_micros(100));
        wait_until_with_timeout(
            &*self.clock,
            || {
                self.position()
                    .is_some_and(|p| p.abs() <= HOME_WINDOW_NM)
            },
            budget,
            poll,
        )
        .map_err(|_| HwError::Timeout)?;
        tracing::info!(axis = %self.axis, "reference finding finished (simulated)");
        Ok(())
    }

    fn close(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut closed = self
            .closed
            .lock()
            .map_err(|_| HwError::Transport("stage state poisoned".into()))?;
        *closed = true;
        Ok(())
    }
}
