//! Print job executor.
//!
//! `Idle → Preparing → (Moving → Streaming)* → Idle`, ending early in
//! `Cancelled` when the stop flag is seen before a layer's move, or `Failed`
//! on any device error. A settle timeout is logged and the layer is exposed
//! anyway.
use std::sync::{Arc, Mutex};

use crossbeam_channel as xch;
use irradiant_traits::{AnalogOutput, StopFlag};

use crate::config::{OutputCfg, PrintParams, ScanGeometry};
use crate::error::{PrintError, Result};
use crate::frames::{DoseMatrix, FrameSet, extract_frames};
use crate::lut::Lut;
use crate::motion::Axis;
use crate::output::{StreamOutcome, execute_multichannel, lock_device};
use crate::settle::SettleReport;
use eyre::WrapErr;

pub type SharedOutput = Arc<Mutex<dyn AnalogOutput + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Preparing,
    Moving { layer: usize },
    Streaming { layer: usize },
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    State(JobState),
    /// Frames computed; `layers` will be exposed.
    Prepared { layers: usize, dropped: usize, samples: usize },
    Settled { layer: usize, report: SettleReport },
    LayerDone { layer: usize, samples: usize },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobSummary {
    pub total_layers: usize,
    pub dropped_layers: usize,
    pub layers_done: usize,
    pub samples_streamed: usize,
    pub settle_timeouts: usize,
    /// Stage position when the job started; the caller may return here.
    pub start_position_nm: f64,
    /// No output device was attached; motion ran without streaming.
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(JobSummary),
    Cancelled(JobSummary),
}

impl JobOutcome {
    pub fn summary(&self) -> &JobSummary {
        match self {
            JobOutcome::Completed(s) | JobOutcome::Cancelled(s) => s,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, JobOutcome::Cancelled(_))
    }
}

/// Immutable inputs of one job.
#[derive(Debug, Clone)]
pub struct PrintJob {
    pub matrix: Arc<DoseMatrix>,
    pub lut: Arc<Lut>,
    pub geometry: ScanGeometry,
    pub params: PrintParams,
}

/// Runs print jobs against one Z axis and an optional output device.
#[derive(Clone)]
pub struct Executor {
    axis: Axis,
    output: Option<SharedOutput>,
    output_cfg: OutputCfg,
    events: Option<xch::Sender<JobEvent>>,
}

impl Executor {
    pub fn new(axis: Axis, output: Option<SharedOutput>, output_cfg: OutputCfg) -> Self {
        Self {
            axis,
            output,
            output_cfg,
            events: None,
        }
    }

    /// Publish job progress on `tx`. A disconnected receiver is ignored.
    pub fn with_events(mut self, tx: xch::Sender<JobEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn axis(&self) -> &Axis {
        &self.axis
    }

    fn emit(&self, ev: JobEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(ev);
        }
    }

    fn enter(&self, state: JobState) {
        tracing::trace!(?state, "job state");
        self.emit(JobEvent::State(state));
    }

    /// Run `job` to completion on the calling thread.
    ///
    /// The caller must hold the movement lock for the whole call.
    pub fn run(&self, job: &PrintJob, stop: &StopFlag) -> Result<JobOutcome> {
        let res = self.run_inner(job, stop);
        match &res {
            Ok(JobOutcome::Completed(s)) => {
                tracing::info!(layers = s.layers_done, samples = s.samples_streamed, "job completed");
                self.enter(JobState::Idle);
            }
            Ok(JobOutcome::Cancelled(s)) => {
                tracing::info!(layers = s.layers_done, "job cancelled");
                self.enter(JobState::Cancelled);
            }
            Err(e) => {
                tracing::error!(error = %e, "job failed");
                self.enter(JobState::Failed);
            }
        }
        res
    }

    /// Plan the exposed layers and the absolute target of each, rejecting the
    /// job if any target is outside the axis limits.
    pub fn prepare(&self, job: &PrintJob, start_nm: f64) -> Result<(FrameSet, Vec<f64>)> {
        let set = extract_frames(
            &job.matrix,
            &job.lut,
            &job.geometry,
            &job.params,
            self.axis.direction(),
        )
        .map_err(eyre::Report::new)?;
        let targets: Vec<f64> = set.layers.iter().map(|p| start_nm + p.z_offset_nm).collect();
        for (plan, target) in set.layers.iter().zip(&targets) {
            self.axis
                .check_target(*target)
                .map_err(eyre::Report::new)
                .wrap_err_with(|| format!("layer {} target", plan.layer))?;
        }
        Ok((set, targets))
    }

    fn run_inner(&self, job: &PrintJob, stop: &StopFlag) -> Result<JobOutcome> {
        self.enter(JobState::Preparing);
        let start_nm = self.axis.position().ok_or_else(|| {
            eyre::Report::new(PrintError::Device(format!(
                "failed to read initial {} position",
                self.axis.name()
            )))
        })?;
        let (set, targets) = self.prepare(job, start_nm)?;

        let mut summary = JobSummary {
            total_layers: set.total_layers,
            dropped_layers: set.dropped_layers,
            start_position_nm: start_nm,
            dry_run: self.output.is_none(),
            ..JobSummary::default()
        };
        tracing::info!(
            layers = set.layers.len(),
            dropped = set.dropped_layers,
            samples = set.total_samples(),
            sample_rate_hz = set.sample_rate_hz,
            blanking = set.layout.blanking,
            start_nm,
            "job prepared"
        );
        self.emit(JobEvent::Prepared {
            layers: set.layers.len(),
            dropped: set.dropped_layers,
            samples: set.total_samples(),
        });
        if summary.dry_run {
            tracing::warn!("no output device attached; layers will be moved but not exposed");
        }

        for (plan, &target) in set.layers.iter().zip(&targets) {
            let layer = plan.layer;
            let samples = set.layer_samples(plan);
            if stop.is_set() {
                return Ok(JobOutcome::Cancelled(summary));
            }

            self.enter(JobState::Moving { layer });
            let report = self
                .axis
                .move_to(target, None, true)
                .wrap_err_with(|| format!("layer {layer} move"))?;
            if let Some(report) = report {
                if !report.is_settled() {
                    summary.settle_timeouts += 1;
                    tracing::warn!(layer, target_nm = target, "stage did not settle; exposing anyway");
                }
                self.emit(JobEvent::Settled { layer, report });
            }

            self.enter(JobState::Streaming { layer });
            match &self.output {
                Some(out) => {
                    // buffers for this layer only; dropped before the next move
                    let frame = set.build_frame(plan, &job.matrix, &job.lut);
                    let mut dev = lock_device(&**out)?;
                    let outcome = execute_multichannel(
                        &mut *dev,
                        &**self.axis.clock(),
                        &self.output_cfg,
                        set.sample_rate_hz,
                        frame.channels(),
                        stop,
                    )
                    .wrap_err_with(|| format!("layer {layer} output"))?;
                    if outcome == StreamOutcome::Stopped {
                        return Ok(JobOutcome::Cancelled(summary));
                    }
                    summary.samples_streamed += frame.len();
                }
                None => {
                    tracing::debug!(layer, samples, "dry run: streaming skipped");
                }
            }
            summary.layers_done += 1;
            tracing::info!(layer, ordinal = plan.ordinal, target_nm = target, samples, "layer done");
            self.emit(JobEvent::LayerDone { layer, samples });
        }
        Ok(JobOutcome::Completed(summary))
    }
}

