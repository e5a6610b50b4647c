//! `irradiant print`: load the dose matrix and LUT, run the job on its own
//! thread, report progress, then return the axis to where it started.

use std::path::Path;
use std::sync::Arc;

use eyre::WrapErr;
use irradiant_config::{Config, load_dose_matrix_json};
use irradiant_core::error::{PrintError, Result};
use irradiant_core::{
    DoseMatrix, JobEvent, JobHandle, JobOutcome, JobSummary, Lut, LutSettings, MovementLock,
    PrintJob, PrintParams, ScanGeometry, try_move_to,
};
use irradiant_traits::StopFlag;

use crate::cli::PrintArgs;
use crate::hw;

fn load_matrix(args: &PrintArgs) -> Result<DoseMatrix> {
    match (&args.matrix, args.dense, args.shape) {
        (Some(path), _, _) => {
            let file = load_dose_matrix_json(path)?;
            DoseMatrix::try_from(file)
                .map_err(eyre::Report::new)
                .wrap_err_with(|| format!("dose matrix {}", path.display()))
        }
        (None, Some(value), Some(shape)) => DoseMatrix::filled(shape, value).map_err(eyre::Report::new),
        _ => Err(eyre::Report::new(PrintError::Validation(
            "provide --matrix FILE or --dense V --shape R,C,L".into(),
        ))),
    }
}

fn params_with_overrides(cfg: &Config, args: &PrintArgs) -> PrintParams {
    let mut params = PrintParams::from(&cfg.print);
    if let Some(um) = args.z_step_um {
        params.z_step_nm = um * 1000.0;
    }
    if let Some(us) = args.dwell_us {
        params.dwell_us = us;
    }
    if let Some(um) = args.fov_x_um {
        params.fov_x_um = um;
    }
    if let Some(um) = args.fov_y_um {
        params.fov_y_um = um;
    }
    if args.invert {
        params.invert_layer_order = true;
    }
    params
}

fn summary_json(outcome: &str, s: &JobSummary, end_nm: Option<f64>) -> serde_json::Value {
    serde_json::json!({
        "outcome": outcome,
        "total_layers": s.total_layers,
        "dropped_layers": s.dropped_layers,
        "layers_done": s.layers_done,
        "samples_streamed": s.samples_streamed,
        "settle_timeouts": s.settle_timeouts,
        "start_position_nm": s.start_position_nm,
        "end_position_nm": end_nm,
        "dry_run": s.dry_run,
    })
}

/// Install a Ctrl-C handler that sets `stop`. Only the first call per
/// process succeeds; later calls are logged and ignored.
pub fn stop_on_ctrlc(stop: StopFlag) {
    if let Err(e) = ctrlc::set_handler(move || stop.set()) {
        tracing::warn!(error = %e, "could not install Ctrl-C handler");
    }
}

pub fn run_print(cfg: &Config, base_dir: &Path, args: &PrintArgs, json: bool) -> Result<()> {
    let matrix = load_matrix(args)?;
    let rows = cfg.lut_rows(base_dir)?;
    let lut = Lut::from_rows(&rows, LutSettings::from(&cfg.lut)).map_err(eyre::Report::new)?;
    let params = params_with_overrides(cfg, args);
    let job = PrintJob {
        matrix: Arc::new(matrix),
        lut: Arc::new(lut),
        geometry: ScanGeometry::from(&cfg.scan),
        params,
    };

    let output = if args.dry_run { None } else { Some(hw::open_output()) };
    let (tx, rx) = crossbeam_channel::unbounded();
    let executor = hw::build_executor(cfg, output, Some(tx))?;
    let axis = executor.axis().clone();
    let start_nm = axis.position();

    let lock = MovementLock::new();
    let handle = JobHandle::spawn(executor, job, &lock)?;
    stop_on_ctrlc(handle.stop_flag());

    // The sender lives in the job thread; the loop ends when the job does.
    for ev in rx.iter() {
        match ev {
            JobEvent::Prepared { layers, dropped, samples } => {
                tracing::debug!(layers, dropped, samples, "frames ready");
                if !json {
                    println!("Exposing {layers} layer(s), {dropped} empty layer(s) skipped, {samples} samples");
                }
            }
            JobEvent::LayerDone { layer, samples } if !json => {
                println!("layer {layer} done ({samples} samples)");
            }
            _ => {}
        }
    }
    let result = handle.join();

    let end_nm = match start_nm {
        _ if args.no_return => axis.position(),
        None => {
            tracing::warn!("start position unknown; not returning");
            axis.position()
        }
        Some(start_nm) => match try_move_to(&lock, &axis, start_nm, true) {
            Ok(_) => axis.position(),
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), start_nm, "return to start failed");
                None
            }
        },
    };

    let outcome = result?;
    let (label, summary) = match &outcome {
        JobOutcome::Completed(s) => ("completed", s),
        JobOutcome::Cancelled(s) => ("stopped", s),
    };
    if json {
        println!("{}", summary_json(label, summary, end_nm));
    } else {
        println!(
            "Print {label}: {}/{} layer(s) exposed, {} dropped, {} settle timeout(s){}",
            summary.layers_done,
            summary.total_layers - summary.dropped_layers,
            summary.dropped_layers,
            summary.settle_timeouts,
            if summary.dry_run { " (dry run)" } else { "" }
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn args() -> PrintArgs {
        PrintArgs {
            dense: None,
            shape: None,
            matrix: None,
            z_step_um: None,
            dwell_us: None,
            fov_x_um: None,
            fov_y_um: None,
            invert: false,
            dry_run: false,
            no_return: false,
        }
    }

    #[test]
    fn dense_matrix_needs_shape() {
        let mut a = args();
        a.dense = Some(0.5);
        let err = load_matrix(&a).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PrintError>(),
            Some(PrintError::Validation(_))
        ));
        a.shape = Some([2, 3, 4]);
        let m = load_matrix(&a).unwrap();
        assert_eq!(m.shape(), [2, 3, 4]);
    }

    #[test]
    fn missing_matrix_file_is_reported() {
        let mut a = args();
        a.matrix = Some(PathBuf::from("/nonexistent/dose.json"));
        let err = load_matrix(&a).unwrap_err();
        assert!(format!("{err:#}").contains("dose matrix"));
    }

    #[test]
    fn overrides_replace_config_values() {
        let cfg = irradiant_config::load_toml(include_str!("../../etc/irradiant.toml")).unwrap();
        let mut a = args();
        a.z_step_um = Some(3.0);
        a.dwell_us = Some(10.0);
        a.invert = true;
        let p = params_with_overrides(&cfg, &a);
        assert!((p.z_step_nm - 3000.0).abs() < 1e-9);
        assert!((p.dwell_us - 10.0).abs() < 1e-12);
        assert!((p.fov_x_um - 650.0).abs() < 1e-12);
        assert!(p.invert_layer_order);
    }
}
