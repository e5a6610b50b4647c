//! Simulated analog-output device.
//!
//! Records every loaded buffer and static write so callers and tests can
//! inspect exactly what would have reached the hardware. Playback "completes"
//! once `samples / rate` of clock time has elapsed after `start()`.
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use irradiant_traits::{AnalogOutput, Channel, Clock, MonotonicClock};

use crate::error::HwError;

#[derive(Debug, Clone)]
pub struct LoadedBuffer {
    pub sample_rate_hz: f64,
    pub channels: Vec<Channel>,
    pub data: Vec<Vec<f64>>,
}

impl LoadedBuffer {
    pub fn samples(&self) -> usize {
        self.data.first().map_or(0, Vec::len)
    }

    pub fn channel(&self, ch: Channel) -> Option<&[f64]> {
        let i = self.channels.iter().position(|c| *c == ch)?;
        self.data.get(i).map(Vec::as_slice)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DaqLog {
    pub buffers: Vec<LoadedBuffer>,
    pub static_writes: Vec<(Channel, f64)>,
    pub starts: usize,
    pub stops: usize,
    /// Current static level per channel, indexed by `Channel::index()`.
    pub levels: [f64; 4],
}

/// Cloneable read handle onto a simulated device's activity log.
#[derive(Debug, Clone, Default)]
pub struct DaqLogHandle(Arc<Mutex<DaqLog>>);

impl DaqLogHandle {
    pub fn snapshot(&self) -> DaqLog {
        self.0.lock().map(|g| g.clone()).unwrap_or_default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut DaqLog) -> R) -> Result<R, HwError> {
        let mut g = self
            .0
            .lock()
            .map_err(|_| HwError::Transport("daq log poisoned".into()))?;
        Ok(f(&mut g))
    }
}

#[derive(Debug, Clone, Copy)]
struct Task {
    duration: Duration,
    started: Option<Instant>,
}

/// Injected misbehaviour for exercising failure paths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DaqFault {
    #[default]
    None,
    /// `start()` fails with a transport error.
    FailOnStart,
    /// Playback never reports done.
    NeverDone,
    /// Static writes fail (cleanup path).
    FailStaticWrites,
}

pub struct SimulatedDaq {
    clock: Arc<dyn Clock + Send + Sync>,
    task: Option<Task>,
    log: DaqLogHandle,
    fault: DaqFault,
}

impl Default for SimulatedDaq {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDaq {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(MonotonicClock::new()))
    }

    pub fn with_clock(clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self {
            clock,
            task: None,
            log: DaqLogHandle::default(),
            fault: DaqFault::None,
        }
    }

    pub fn with_fault(mut self, fault: DaqFault) -> Self {
        self.fault = fault;
        self
    }

    pub fn log(&self) -> DaqLogHandle {
        self.log.clone()
    }
}

impl AnalogOutput for SimulatedDaq {
    fn load(
        &mut self,
        sample_rate_hz: f64,
        channels: &[Channel],
        data: &[&[f64]],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !(sample_rate_hz.is_finite() && sample_rate_hz > 0.0) {
            return Err(HwError::InvalidBuffer(format!("sample rate {sample_rate_hz} Hz")).into());
        }
        if channels.len() != data.len() {
            return Err(HwError::InvalidBuffer(format!(
                "{} channels but {} buffers",
                channels.len(),
                data.len()
            ))
            .into());
        }
        let samples = data.first().map_or(0, |d| d.len());
        if data.iter().any(|d| d.len() != samples) {
            return Err(HwError::InvalidBuffer("channel buffers differ in length".into()).into());
        }
        let buffer = LoadedBuffer {
            sample_rate_hz,
            channels: channels.to_vec(),
            data: data.iter().map(|d| d.to_vec()).collect(),
        };
        self.log.with(|log| log.buffers.push(buffer))?;
        self.task = Some(Task {
            duration: Duration::from_secs_f64(samples as f64 / sample_rate_hz),
            started: None,
        });
        tracing::trace!(samples, sample_rate_hz, "simulated output loaded");
        Ok(())
    }

    fn start(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.fault == DaqFault::FailOnStart {
            return Err(HwError::Transport("simulated start failure".into()).into());
        }
        let task = self.task.as_mut().ok_or(HwError::NotStarted)?;
        task.started = Some(self.clock.now());
        self.log.with(|log| log.starts += 1)?;
        Ok(())
    }

    fn is_done(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        let task = self.task.ok_or(HwError::NotStarted)?;
        let started = task.started.ok_or(HwError::NotStarted)?;
        if self.fault == DaqFault::NeverDone {
            return Ok(false);
        }
        Ok(self.clock.elapsed(started) >= task.duration)
    }

    fn stop(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.task = None;
        self.log.with(|log| log.stops += 1)?;
        Ok(())
    }

    fn write_static(
        &mut self,
        channels: &[Channel],
        volts: &[f64],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.fault == DaqFault::FailStaticWrites {
            return Err(HwError::Transport("simulated static write failure".into()).into());
        }
        if channels.len() != volts.len() {
            return Err(HwError::InvalidBuffer("channel/value count mismatch".into()).into());
        }
        self.log.with(|log| {
            for (ch, v) in channels.iter().zip(volts) {
                log.static_writes.push((*ch, *v));
                log.levels[ch.index()] = *v;
            }
        })?;
        Ok(())
    }
}
