//! Hardware assembly from the typed config.

use std::sync::{Arc, Mutex};

use eyre::WrapErr;
use irradiant_config::Config;
use irradiant_core::error::{BuildError, PrintError, Result};
use irradiant_core::hw_error::map_hw_error;
use irradiant_core::{AxisLimits, Executor, ExecutorBuilder, JobEvent, OutputCfg, SettleCfg, SharedOutput, SharedStage};
use irradiant_hardware::{SimulatedDaq, StageBackend, open_stage};

/// Open the configured stage axis, falling back to a simulated one when allowed.
pub fn open_configured_stage(cfg: &Config) -> Result<SharedStage> {
    let name = cfg.stage.backend.as_str();
    let backend = StageBackend::from_name(name)
        .ok_or_else(|| eyre::Report::new(PrintError::Validation(format!("unknown stage backend '{name}'"))))?;
    let stage = open_stage(backend, &cfg.stage.axis, cfg.stage.fallback_to_simulated)
        .map_err(|e| eyre::Report::new(map_hw_error(&e)))
        .wrap_err_with(|| format!("open {name} stage for axis {}", cfg.stage.axis))?;
    Ok(stage)
}

pub fn axis_limits(cfg: &Config) -> Result<AxisLimits> {
    cfg.limits_for(&cfg.stage.axis)
        .map(|l| AxisLimits::from(&l))
        .ok_or_else(|| eyre::Report::new(BuildError::MissingLimits))
        .wrap_err_with(|| format!("axis {}", cfg.stage.axis))
}

/// The analog output device. Vendor DAQ bindings are not bundled, so this is
/// always the simulated device.
pub fn open_output() -> SharedOutput {
    tracing::info!("using simulated analog output");
    Arc::new(Mutex::new(SimulatedDaq::new()))
}

/// Build an executor for the configured axis. `output = None` runs dry.
pub fn build_executor(
    cfg: &Config,
    output: Option<SharedOutput>,
    events: Option<crossbeam_channel::Sender<JobEvent>>,
) -> Result<Executor> {
    let mut builder = ExecutorBuilder::new()
        .stage(open_configured_stage(cfg)?)
        .limits(axis_limits(cfg)?)
        .settle(SettleCfg::from(&cfg.settling_for_stage()))
        .output_cfg(OutputCfg::from(&cfg.daq));
    if let Some(out) = output {
        builder = builder.output(out);
    }
    if let Some(tx) = events {
        builder = builder.events(tx);
    }
    builder.try_build()
}
