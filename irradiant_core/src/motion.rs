//! Limit-checked stage axis with settle detection.
use std::sync::Arc;

use irradiant_traits::{AxisDirection, Clock, MonotonicClock, Stage};

use crate::config::{AxisLimits, SettleCfg};
use crate::error::{PrintError, Result};
use crate::hw_error::report;
use crate::settle::{SettleReport, wait_until_settled};

pub type SharedStage = Arc<dyn Stage + Send + Sync>;

/// A stage axis plus the limits and settle parameters that apply to it.
///
/// Cloning shares the underlying stage.
#[derive(Clone)]
pub struct Axis {
    stage: SharedStage,
    limits: AxisLimits,
    settle: SettleCfg,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl std::fmt::Debug for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Axis")
            .field("axis", &self.stage.axis())
            .field("limits", &self.limits)
            .field("settle", &self.settle)
            .finish_non_exhaustive()
    }
}

impl Axis {
    pub fn new(stage: SharedStage, limits: AxisLimits, settle: SettleCfg) -> Self {
        Self::with_clock(stage, limits, settle, Arc::new(MonotonicClock::new()))
    }

    pub fn with_clock(
        stage: SharedStage,
        limits: AxisLimits,
        settle: SettleCfg,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            stage,
            limits,
            settle,
            clock,
        }
    }

    pub fn name(&self) -> &str {
        self.stage.axis()
    }

    pub fn direction(&self) -> AxisDirection {
        self.stage.direction()
    }

    pub fn limits(&self) -> AxisLimits {
        self.limits
    }

    pub fn settle_cfg(&self) -> &SettleCfg {
        &self.settle
    }

    pub fn clock(&self) -> &Arc<dyn Clock + Send + Sync> {
        &self.clock
    }

    pub fn position(&self) -> Option<f64> {
        self.stage.position()
    }

    pub fn desired_position(&self) -> f64 {
        self.stage.desired_position()
    }

    /// Reject `target_nm` unless it lies inside this axis's limits.
    pub fn check_target(&self, target_nm: f64) -> std::result::Result<(), PrintError> {
        if self.limits.contains(target_nm) {
            Ok(())
        } else {
            Err(PrintError::OutOfRange {
                axis: self.name().to_string(),
                target_nm,
                min_nm: self.limits.min_nm,
                max_nm: self.limits.max_nm,
            })
        }
    }

    /// Move to an absolute target.
    ///
    /// Out-of-range targets fail with `OutOfRange` before anything is sent.
    /// With `wait_for_settled` the call blocks in settle detection; a settle
    /// timeout is returned in the report, not as an error. `tolerance_nm`
    /// overrides the configured settle tolerance for this move.
    pub fn move_to(
        &self,
        target_nm: f64,
        tolerance_nm: Option<f64>,
        wait_for_settled: bool,
    ) -> Result<Option<SettleReport>> {
        self.check_target(target_nm).map_err(eyre::Report::new)?;
        tracing::debug!(axis = self.name(), target_nm, "move");
        self.stage
            .command_move(target_nm)
            .map_err(|e| report(&*e))
            .map_err(|e| e.wrap_err(format!("{} move to {target_nm} nm", self.name())))?;
        if !wait_for_settled {
            return Ok(None);
        }
        let mut cfg = self.settle;
        if let Some(tol) = tolerance_nm {
            cfg.tolerance_nm = tol;
        }
        let stage = &self.stage;
        Ok(Some(wait_until_settled(&*self.clock, target_nm, &cfg, || {
            stage.position()
        })))
    }

    pub fn stop(&self) -> Result<()> {
        self.stage.stop().map_err(|e| report(&*e))
    }

    pub fn home(&self) -> Result<()> {
        self.stage
            .home()
            .map_err(|e| report(&*e))
            .map_err(|e| e.wrap_err(format!("{} home", self.name())))
    }

    pub fn close(&self) -> Result<()> {
        self.stage.close().map_err(|e| report(&*e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use irradiant_hardware::SimulatedStage;
    use irradiant_traits::test_clock::TestClock;
    use std::time::Duration;

    fn axis(clock: &TestClock) -> (Arc<SimulatedStage>, Axis) {
        let stage = Arc::new(
            SimulatedStage::with_clock("Z", Arc::new(clock.clone()))
                .with_time_constant(Duration::from_millis(1)),
        );
        let a = Axis::with_clock(
            stage.clone(),
            AxisLimits {
                min_nm: -1000.0,
                max_nm: 1000.0,
            },
            SettleCfg {
                poll: Duration::from_millis(1),
                duration: Duration::from_millis(5),
                tolerance_nm: 1.0,
                timeout: Duration::from_millis(200),
            },
            Arc::new(clock.clone()),
        );
        (stage, a)
    }

    #[test]
    fn out_of_range_target_sends_nothing() {
        let clock = TestClock::new();
        let (stage, a) = axis(&clock);
        let err = a.move_to(5000.0, None, true).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PrintError>(),
            Some(PrintError::OutOfRange { .. })
        ));
        assert_eq!(stage.desired_position(), 0.0);
    }

    #[test]
    fn move_waits_for_settle() {
        let clock = TestClock::new();
        let (_stage, a) = axis(&clock);
        let report = a.move_to(500.0, None, true).unwrap().expect("report");
        assert!(report.is_settled());
        assert!((a.position().unwrap() - 500.0).abs() <= 1.0);
    }

    #[test]
    fn move_without_wait_returns_immediately() {
        let clock = TestClock::new();
        let (_stage, a) = axis(&clock);
        assert!(a.move_to(-200.0, None, false).unwrap().is_none());
        assert_eq!(a.desired_position(), -200.0);
        assert_eq!(clock.offset(), Duration::ZERO);
    }

    #[test]
    fn closed_stage_maps_to_device_fault() {
        let clock = TestClock::new();
        let (_stage, a) = axis(&clock);
        a.close().unwrap();
        let err = a.move_to(10.0, None, false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PrintError>(),
            Some(PrintError::DeviceFault(_))
        ));
    }
}
