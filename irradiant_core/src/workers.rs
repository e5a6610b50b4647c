//! Background threads: print job, constant output, jog producer and
//! position display refresh.
//!
//! Each worker owns exactly one thread, stops cooperatively through a flag,
//! and joins it on drop so no thread outlives its handle.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use irradiant_traits::{Channel, Clock, StopFlag};

use crate::arbiter::MovementLock;
use crate::config::{JogCfg, OutputCfg};
use crate::error::{PrintError, Result};
use crate::job::{Executor, JobOutcome, PrintJob, SharedOutput};
use crate::motion::{Axis, SharedStage};
use crate::output::{check_constant, output_constant};

fn join_thread<T>(handle: JoinHandle<Result<T>>, what: &str) -> Result<T> {
    handle.join().unwrap_or_else(|_| {
        Err(eyre::Report::new(PrintError::State(format!(
            "{what} thread panicked"
        ))))
    })
}

/// Wait up to `timeout` for `handle` to finish, polling with `clock`.
fn wait_finished<T, C: Clock + ?Sized>(handle: &JoinHandle<T>, clock: &C, timeout: Duration) -> bool {
    let epoch = clock.now();
    while !handle.is_finished() {
        if clock.elapsed(epoch) >= timeout {
            return false;
        }
        clock.sleep(Duration::from_millis(5));
    }
    true
}

/// A print job running on its own thread while holding the movement lock.
pub struct JobHandle {
    stop: StopFlag,
    handle: Option<JoinHandle<Result<JobOutcome>>>,
}

impl JobHandle {
    /// Start `job` unless another producer holds the movement lock, in which
    /// case this fails immediately with `PrintError::Busy`.
    pub fn spawn(executor: Executor, job: PrintJob, lock: &MovementLock) -> Result<Self> {
        let guard = lock.acquire_or_busy().map_err(eyre::Report::new)?;
        let stop = StopFlag::new();
        let thread_stop = stop.clone();
        let handle = std::thread::Builder::new()
            .name("print-job".into())
            .spawn(move || {
                let _guard = guard;
                executor.run(&job, &thread_stop)
            })
            .map_err(|e| eyre::Report::new(PrintError::State(format!("spawn job thread: {e}"))))?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    /// Request cancellation; observed at the next poll boundary.
    pub fn stop(&self) {
        self.stop.set();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait up to `timeout` for the job thread to finish.
    pub fn wait<C: Clock + ?Sized>(&self, clock: &C, timeout: Duration) -> bool {
        self.handle
            .as_ref()
            .is_none_or(|h| wait_finished(h, clock, timeout))
    }

    pub fn join(mut self) -> Result<JobOutcome> {
        match self.handle.take() {
            Some(h) => join_thread(h, "job"),
            None => Err(eyre::Report::new(PrintError::State("job already joined".into()))),
        }
    }
}

impl Drop for JobHandle {
    fn drop(&mut self) {
        if let Some(h) = self.handle.take() {
            self.stop.set();
            if h.join().is_err() {
                tracing::warn!("job thread panicked during shutdown");
            }
        }
    }
}

/// A constant voltage held on one channel by a background thread.
pub struct ConstantOutputHandle {
    stop: StopFlag,
    handle: Option<JoinHandle<Result<()>>>,
}

impl ConstantOutputHandle {
    /// Validate `volts` against the channel amplitude, then hold it until
    /// `stop()` is called.
    pub fn spawn(
        output: SharedOutput,
        clock: Arc<dyn Clock + Send + Sync>,
        cfg: OutputCfg,
        channel: Channel,
        volts: f64,
    ) -> Result<Self> {
        check_constant(&cfg, channel, volts).map_err(eyre::Report::new)?;
        let stop = StopFlag::new();
        let thread_stop = stop.clone();
        let handle = std::thread::Builder::new()
            .name("constant-output".into())
            .spawn(move || output_constant(&*output, &*clock, &cfg, channel, volts, &thread_stop))
            .map_err(|e| eyre::Report::new(PrintError::State(format!("spawn output thread: {e}"))))?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.set();
    }

    /// Stop (if not already) and wait for the channel to be zeroed.
    pub fn join(mut self) -> Result<()> {
        self.stop.set();
        match self.handle.take() {
            Some(h) => join_thread(h, "constant output"),
            None => Ok(()),
        }
    }
}

impl Drop for ConstantOutputHandle {
    fn drop(&mut self) {
        if let Some(h) = self.handle.take() {
            self.stop.set();
            if h.join().is_err() {
                tracing::warn!("constant output thread panicked during shutdown");
            }
        }
    }
}

/// One reading of a manual motion input, each axis deflection in [-1, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct JogSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Fine mode: scales every step by `JogCfg::fine_multiplier`.
    pub fine: bool,
}

/// Source of jog deflections (joystick, keyboard, ...).
pub trait JogInput {
    /// Current deflection, or `None` when the input is unavailable.
    fn poll(&mut self) -> Option<JogSample>;
}

/// Stage steps (nm) for one jog tick. Deflections inside the deadzone are
/// ignored; Y is inverted so pushing forward moves the stage away.
pub fn jog_deltas(sample: &JogSample, cfg: &JogCfg) -> [f64; 3] {
    let dz = |v: f64| {
        if v.abs() < cfg.deadzone {
            0.0
        } else {
            v.clamp(-1.0, 1.0)
        }
    };
    let m = if sample.fine { cfg.fine_multiplier } else { 1.0 };
    [
        dz(sample.x) * cfg.scale_xy_nm * m,
        -dz(sample.y) * cfg.scale_xy_nm * m,
        dz(sample.z) * cfg.scale_z_nm * m,
    ]
}

/// Axes a jog producer may move; missing axes are ignored.
#[derive(Debug, Clone, Default)]
pub struct JogAxes {
    pub x: Option<Axis>,
    pub y: Option<Axis>,
    pub z: Option<Axis>,
}

#[derive(Debug, Default)]
struct JogCounters {
    moved: AtomicUsize,
    skipped_busy: AtomicUsize,
}

/// Continuous manual-input producer.
///
/// Each tick reads the input and, when there is a step to make, try-locks the
/// movement lock. A busy lock skips the tick; nothing queues.
pub struct JogWorker {
    shutdown: Arc<AtomicBool>,
    counters: Arc<JogCounters>,
    handle: Option<JoinHandle<()>>,
}

impl JogWorker {
    pub fn spawn<I, C>(mut input: I, axes: JogAxes, lock: MovementLock, cfg: JogCfg, clock: C) -> Self
    where
        I: JogInput + Send + 'static,
        C: Clock + Send + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(JogCounters::default());
        let thread_shutdown = shutdown.clone();
        let thread_counters = counters.clone();

        let handle = std::thread::spawn(move || {
            while !thread_shutdown.load(Ordering::Relaxed) {
                if let Some(sample) = input.poll() {
                    let deltas = jog_deltas(&sample, &cfg);
                    if deltas.iter().any(|d| *d != 0.0) {
                        match lock.try_acquire() {
                            Some(_guard) => {
                                for (axis, delta) in [&axes.x, &axes.y, &axes.z].into_iter().zip(deltas) {
                                    let Some(axis) = axis else { continue };
                                    if delta == 0.0 {
                                        continue;
                                    }
                                    let target = axis.desired_position() + delta;
                                    if let Err(e) = axis.move_to(target, None, false) {
                                        tracing::warn!(axis = axis.name(), target_nm = target, error = %e, "jog move rejected");
                                    }
                                }
                                thread_counters.moved.fetch_add(1, Ordering::Relaxed);
                            }
                            None => {
                                tracing::trace!("movement lock busy; jog tick skipped");
                                thread_counters.skipped_busy.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                    }
                }
                if thread_shutdown.load(Ordering::Relaxed) {
                    break;
                }
                clock.sleep(cfg.poll);
            }
            tracing::trace!("jog thread exiting cleanly");
        });

        Self {
            shutdown,
            counters,
            handle: Some(handle),
        }
    }

    /// Ticks that moved at least one axis.
    pub fn moved_ticks(&self) -> usize {
        self.counters.moved.load(Ordering::Relaxed)
    }

    /// Ticks skipped because another producer held the movement lock.
    pub fn skipped_ticks(&self) -> usize {
        self.counters.skipped_busy.load(Ordering::Relaxed)
    }
}

impl Drop for JogWorker {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(h) = self.handle.take() {
            if h.join().is_err() {
                tracing::warn!("jog thread panicked during shutdown");
            }
        }
    }
}

/// Periodic lock-free position cache for display refresh.
///
/// Reads never block on the stage; `latest()` returns the last good reading.
pub struct PositionMonitor {
    bits: Arc<AtomicU64>,
    valid: Arc<AtomicBool>,
    last_ok: Arc<AtomicU64>,
    epoch: Instant,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PositionMonitor {
    pub fn spawn<C: Clock + Send + Sync + 'static>(stage: SharedStage, period: Duration, clock: C) -> Self {
        let bits = Arc::new(AtomicU64::new(0));
        let valid = Arc::new(AtomicBool::new(false));
        let last_ok = Arc::new(AtomicU64::new(0));
        let shutdown = Arc::new(AtomicBool::new(false));
        let epoch = clock.now();
        let (t_bits, t_valid, t_last_ok, t_shutdown) =
            (bits.clone(), valid.clone(), last_ok.clone(), shutdown.clone());

        let handle = std::thread::spawn(move || {
            loop {
                if t_shutdown.load(Ordering::Relaxed) {
                    break;
                }
                if let Some(p) = stage.position() {
                    t_bits.store(p.to_bits(), Ordering::Relaxed);
                    t_valid.store(true, Ordering::Release);
                    t_last_ok.store(clock.ms_since(epoch), Ordering::Relaxed);
                }
                if t_shutdown.load(Ordering::Relaxed) {
                    break;
                }
                clock.sleep(period);
            }
            tracing::trace!("position monitor exiting cleanly");
        });

        Self {
            bits,
            valid,
            last_ok,
            epoch,
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn latest(&self) -> Option<f64> {
        if self.valid.load(Ordering::Acquire) {
            Some(f64::from_bits(self.bits.load(Ordering::Relaxed)))
        } else {
            None
        }
    }

    /// Milliseconds since the last successful read, measured at `now_ms`
    /// on the monitor's clock.
    pub fn stalled_for(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_ok.load(Ordering::Relaxed))
    }

    /// `stalled_for` against real time.
    pub fn stalled_for_now(&self) -> u64 {
        let ms = Instant::now().saturating_duration_since(self.epoch).as_millis();
        self.stalled_for(ms.min(u128::from(u64::MAX)) as u64)
    }
}

impl Drop for PositionMonitor {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(h) = self.handle.take() {
            if h.join().is_err() {
                tracing::warn!("position monitor panicked during shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(JogSample { x: 0.05, y: 0.0, z: 0.0, fine: false }, [0.0, 0.0, 0.0])]
    #[case(JogSample { x: 0.5, y: 0.0, z: 0.0, fine: false }, [250_000.0, 0.0, 0.0])]
    #[case(JogSample { x: 0.0, y: 1.0, z: 0.0, fine: false }, [0.0, -500_000.0, 0.0])]
    #[case(JogSample { x: 0.0, y: 0.0, z: -1.0, fine: true }, [0.0, 0.0, -5_000.0])]
    fn jog_deltas_apply_deadzone_scale_and_fine_mode(#[case] s: JogSample, #[case] expect: [f64; 3]) {
        let d = jog_deltas(&s, &JogCfg::default());
        for (a, b) in d.iter().zip(expect) {
            assert!((a - b).abs() < 1e-6, "{d:?} != {expect:?}");
        }
    }
}
