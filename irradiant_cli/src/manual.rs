//! Manual commands: axis moves, constant laser output and the self-check.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use irradiant_config::Config;
use irradiant_core::error::{PrintError, Result};
use irradiant_core::{
    ConstantOutputHandle, Lut, LutSettings, MovementLock, OutputCfg, SettleOutcome, try_move_by, try_move_to,
};
use irradiant_traits::{Channel, Clock, MonotonicClock, StopFlag};

use crate::hw;
use crate::print::stop_on_ctrlc;

pub fn run_move(cfg: &Config, to: Option<f64>, by: Option<f64>, settle: bool, json: bool) -> Result<()> {
    let executor = hw::build_executor(cfg, None, None)?;
    let axis = executor.axis();
    let lock = MovementLock::new();
    let report = match (to, by) {
        (Some(target), None) => try_move_to(&lock, axis, target, settle)?,
        (None, Some(delta)) => try_move_by(&lock, axis, delta, settle)?,
        _ => {
            return Err(eyre::Report::new(PrintError::Validation(
                "provide exactly one of --to or --by".into(),
            )));
        }
    };
    let position = axis.position();
    let settled = report.map(|r| r.is_settled());
    if json {
        println!(
            "{}",
            serde_json::json!({
                "axis": axis.name(),
                "target_nm": axis.desired_position(),
                "position_nm": position,
                "settled": settled,
            })
        );
        return Ok(());
    }
    match report.map(|r| r.outcome) {
        Some(SettleOutcome::Settled) => println!(
            "{} settled at {:.1} nm",
            axis.name(),
            position.unwrap_or(f64::NAN)
        ),
        Some(SettleOutcome::TimedOut { distance, .. }) => println!(
            "{} did not settle (last distance {:?} nm)",
            axis.name(),
            distance
        ),
        None => println!("{} moving to {:.1} nm", axis.name(), axis.desired_position()),
    }
    Ok(())
}

pub fn run_laser(cfg: &Config, channel: Channel, volts: f64, for_ms: Option<u64>) -> Result<()> {
    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(MonotonicClock::new());
    let handle = ConstantOutputHandle::spawn(
        hw::open_output(),
        clock.clone(),
        OutputCfg::from(&cfg.daq),
        channel,
        volts,
    )?;
    let stop: StopFlag = handle.stop_flag();
    stop_on_ctrlc(stop.clone());
    println!("{channel} at {volts} V; press Ctrl-C to release");

    let started = clock.now();
    while !stop.is_set() {
        if for_ms.is_some_and(|ms| clock.elapsed(started) >= Duration::from_millis(ms)) {
            break;
        }
        clock.sleep(Duration::from_millis(10));
    }
    handle.join()?;
    println!("{channel} released (0 V)");
    Ok(())
}

pub fn run_self_check(cfg: &Config, base_dir: &Path, json: bool) -> Result<()> {
    let rows = cfg.lut_rows(base_dir)?;
    let lut = Lut::from_rows(&rows, LutSettings::from(&cfg.lut)).map_err(eyre::Report::new)?;
    let executor = hw::build_executor(cfg, None, None)?;
    let axis = executor.axis();
    let limits = axis.limits();
    let position = axis.position();
    if json {
        println!(
            "{}",
            serde_json::json!({
                "status": "ok",
                "backend": cfg.stage.backend.as_str(),
                "axis": axis.name(),
                "position_nm": position,
                "limits_nm": [limits.min_nm, limits.max_nm],
                "lut_points": lut.len(),
            })
        );
    } else {
        println!(
            "OK: {} stage axis {} at {:?} nm, limits [{}, {}] nm, LUT {} points",
            cfg.stage.backend.as_str(),
            axis.name(),
            position,
            limits.min_nm,
            limits.max_nm,
            lut.len()
        );
    }
    Ok(())
}
