#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Exposure engine (hardware-agnostic).
//!
//! All hardware interaction goes through `irradiant_traits::Stage` and
//! `irradiant_traits::AnalogOutput`.
//!
//! ## Pipeline
//!
//! - **LUT** (`lut`): dose fraction to modulator level
//! - **Waveforms** (`waveform`): mirror raster, line steps, per-layer Z level
//! - **Frames** (`frames`): padding, latency offset, empty layer and line removal
//! - **Settling** (`settle`): windowed stability check shared by every stage backend
//! - **Arbiter** (`arbiter`): non-blocking movement lock
//! - **Output** (`output`): clocked four-channel streaming with guaranteed 0 V reset
//! - **Job** (`job`): the per-layer move/settle/stream state machine
//! - **Workers** (`workers`): job, constant output, jog and position threads
//!
//! ## Units
//!
//! Positions are nanometres. Channel buffers hold normalized drive levels;
//! the output stage multiplies by each channel's amplitude and clips.

pub mod arbiter;
pub mod builder;
pub mod config;
pub mod conversions;
pub mod error;
pub mod frames;
pub mod hw_error;
pub mod job;
pub mod lut;
pub mod motion;
pub mod output;
pub mod settle;
pub mod util;
pub mod waveform;
pub mod workers;

pub use arbiter::{MovementGuard, MovementLock, try_move_by, try_move_to};
pub use builder::ExecutorBuilder;
pub use config::{
    AxisLimits, EdgePolicy, JogCfg, LutSettings, OutputCfg, PrintParams, ScanGeometry, SettleCfg,
    ThreadingCfg,
};
pub use error::{BuildError, PrintError, Result};
pub use frames::{DoseMatrix, Frame, FrameSet, LayerPlan, extract_frames};
pub use job::{Executor, JobEvent, JobOutcome, JobState, JobSummary, PrintJob, SharedOutput};
pub use lut::Lut;
pub use motion::{Axis, SharedStage};
pub use output::{StreamOutcome, execute_multichannel, output_constant};
pub use settle::{SettleOutcome, SettleReport, wait_until_settled};
pub use workers::{ConstantOutputHandle, JobHandle, JogAxes, JogInput, JogSample, JogWorker, PositionMonitor};
