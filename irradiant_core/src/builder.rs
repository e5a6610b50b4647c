//! Builder for `Executor`.
//!
//! `try_build()` is the single place where runtime settings are checked
//! before a job can touch hardware.
use std::sync::Arc;

use crossbeam_channel as xch;
use irradiant_traits::{Clock, MonotonicClock};

use crate::config::{AxisLimits, OutputCfg, SettleCfg};
use crate::error::{BuildError, Result};
use crate::job::{Executor, JobEvent, SharedOutput};
use crate::motion::{Axis, SharedStage};

#[derive(Default)]
pub struct ExecutorBuilder {
    stage: Option<SharedStage>,
    limits: Option<AxisLimits>,
    settle: Option<SettleCfg>,
    output: Option<SharedOutput>,
    output_cfg: Option<OutputCfg>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    events: Option<xch::Sender<JobEvent>>,
}

impl ExecutorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(mut self, stage: SharedStage) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn limits(mut self, limits: AxisLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    pub fn settle(mut self, settle: SettleCfg) -> Self {
        self.settle = Some(settle);
        self
    }

    /// Attach an output device. Without one, jobs run dry (motion only).
    pub fn output(mut self, output: SharedOutput) -> Self {
        self.output = Some(output);
        self
    }

    pub fn output_cfg(mut self, cfg: OutputCfg) -> Self {
        self.output_cfg = Some(cfg);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn events(mut self, tx: xch::Sender<JobEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn try_build(self) -> Result<Executor> {
        let stage = self
            .stage
            .ok_or_else(|| eyre::Report::new(BuildError::MissingStage))?;
        let limits = self
            .limits
            .ok_or_else(|| eyre::Report::new(BuildError::MissingLimits))?;
        let settle = self.settle.unwrap_or_default();
        let output_cfg = self.output_cfg.unwrap_or_default();

        if !(limits.min_nm.is_finite() && limits.max_nm.is_finite() && limits.min_nm < limits.max_nm) {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "axis limits must satisfy min_nm < max_nm",
            )));
        }
        if settle.poll.is_zero() {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "settle poll interval must be > 0",
            )));
        }
        if !(settle.tolerance_nm.is_finite() && settle.tolerance_nm > 0.0) {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "settle tolerance must be > 0",
            )));
        }
        if output_cfg.check_interval.is_zero() {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "output check interval must be > 0",
            )));
        }
        if !(output_cfg.timeout_multiplier >= 1.0) {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "output timeout multiplier must be >= 1",
            )));
        }
        if output_cfg.amplitudes.iter().any(|a| !(a.is_finite() && *a > 0.0)) {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "channel amplitudes must be > 0",
            )));
        }

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        let axis = Axis::with_clock(stage, limits, settle, clock);
        let executor = Executor::new(axis, self.output, output_cfg);
        Ok(match self.events {
            Some(tx) => executor.with_events(tx),
            None => executor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use irradiant_hardware::SimulatedStage;

    #[test]
    fn missing_stage_and_limits_are_reported() {
        let err = ExecutorBuilder::new().try_build().err().expect("no stage");
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::MissingStage)
        ));
        let err = ExecutorBuilder::new()
            .stage(Arc::new(SimulatedStage::new("Z")))
            .try_build()
            .err()
            .expect("no limits");
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::MissingLimits)
        ));
    }

    #[test]
    fn inverted_limits_rejected() {
        let err = ExecutorBuilder::new()
            .stage(Arc::new(SimulatedStage::new("Z")))
            .limits(AxisLimits {
                min_nm: 5.0,
                max_nm: -5.0,
            })
            .try_build()
            .err()
            .expect("bad limits");
        assert!(err.to_string().contains("min_nm < max_nm"));
    }
}
