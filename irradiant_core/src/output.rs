//! Multi-channel clocked output and constant-voltage output.
//!
//! Every channel touched here is driven back to 0 V on every exit path,
//! including errors and early stops. Cleanup failures are logged and never
//! replace the primary result.
use std::sync::Mutex;
use std::time::Duration;

use irradiant_traits::{AnalogOutput, Channel, Clock, StopFlag};

use crate::config::OutputCfg;
use crate::error::{PrintError, Result};
use crate::hw_error::report;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed,
    /// The stop flag was observed before playback finished.
    Stopped,
}

/// Scale normalized levels by `amplitude` volts and clip to `±amplitude`.
pub fn scale_and_clip(levels: &[f64], amplitude: f64) -> Vec<f64> {
    levels
        .iter()
        .map(|v| (v * amplitude).clamp(-amplitude, amplitude))
        .collect()
}

/// Stops the task (optionally) and zeroes `channels` when dropped.
struct ZeroOnExit<'a, D: AnalogOutput + ?Sized> {
    daq: &'a mut D,
    channels: &'a [Channel],
    stop_task: bool,
}

impl<D: AnalogOutput + ?Sized> Drop for ZeroOnExit<'_, D> {
    fn drop(&mut self) {
        if self.stop_task {
            if let Err(e) = self.daq.stop() {
                tracing::warn!(error = %e, "failed to stop output task during cleanup");
            }
        }
        let zeros = vec![0.0; self.channels.len()];
        if let Err(e) = self.daq.write_static(self.channels, &zeros) {
            tracing::warn!(error = %e, "failed to reset outputs to 0 V");
        }
    }
}

/// Stream four aligned buffers (`Channel::ALL` order) at `sample_rate_hz`.
///
/// While the nominal duration elapses the stop flag is polled every
/// `cfg.check_interval`; the device then has `nominal × timeout_multiplier`
/// more to report completion before this fails with `Timeout`.
pub fn execute_multichannel<D, C>(
    daq: &mut D,
    clock: &C,
    cfg: &OutputCfg,
    sample_rate_hz: f64,
    channels: [&[f64]; 4],
    stop: &StopFlag,
) -> Result<StreamOutcome>
where
    D: AnalogOutput + ?Sized,
    C: Clock + ?Sized,
{
    let samples = channels[0].len();
    if channels.iter().any(|c| c.len() != samples) {
        let lens: Vec<usize> = channels.iter().map(|c| c.len()).collect();
        return Err(eyre::Report::new(PrintError::Validation(format!(
            "channel buffers must be equal length, got {lens:?}"
        ))));
    }
    if samples == 0 {
        return Err(eyre::Report::new(PrintError::Validation(
            "channel buffers are empty".into(),
        )));
    }
    if !(sample_rate_hz.is_finite() && sample_rate_hz > 0.0) {
        return Err(eyre::Report::new(PrintError::Validation(format!(
            "sample rate must be > 0 Hz, got {sample_rate_hz}"
        ))));
    }

    let scaled: Vec<Vec<f64>> = Channel::ALL
        .iter()
        .zip(channels)
        .map(|(ch, data)| scale_and_clip(data, cfg.amplitude(*ch)))
        .collect();
    let refs: Vec<&[f64]> = scaled.iter().map(Vec::as_slice).collect();

    let guard = ZeroOnExit {
        daq,
        channels: &Channel::ALL,
        stop_task: true,
    };
    guard
        .daq
        .load(sample_rate_hz, &Channel::ALL, &refs)
        .map_err(|e| report(&*e).wrap_err("load output buffer"))?;
    guard
        .daq
        .start()
        .map_err(|e| report(&*e).wrap_err("start output task"))?;

    let nominal = Duration::from_secs_f64(samples as f64 / sample_rate_hz);
    tracing::debug!(samples, sample_rate_hz, nominal_ms = nominal.as_millis() as u64, "streaming");
    let started = clock.now();
    while clock.elapsed(started) < nominal {
        if stop.is_set() {
            tracing::info!(elapsed_ms = clock.ms_since(started), "output stopped by request");
            return Ok(StreamOutcome::Stopped);
        }
        clock.sleep(cfg.check_interval);
    }

    let cap = nominal.mul_f64(cfg.timeout_multiplier.max(1.0));
    let waiting = clock.now();
    loop {
        let done = guard
            .daq
            .is_done()
            .map_err(|e| report(&*e).wrap_err("query output task"))?;
        if done {
            break;
        }
        if stop.is_set() {
            tracing::info!("output stopped by request while finishing");
            return Ok(StreamOutcome::Stopped);
        }
        if clock.elapsed(waiting) >= cap {
            tracing::error!(
                samples,
                waited_ms = clock.ms_since(waiting),
                "output task did not complete"
            );
            return Err(eyre::Report::new(PrintError::Timeout(format!(
                "output task not done {} ms after nominal end",
                cap.as_millis()
            ))));
        }
        clock.sleep(cfg.check_interval);
    }
    tracing::trace!(elapsed_ms = clock.ms_since(started), "stream complete");
    Ok(StreamOutcome::Completed)
}

/// Hold `volts` on `channel` until `stop` is set, then drive it to 0 V.
///
/// The device lock is taken only for the writes, not while holding.
pub fn output_constant<D, C>(
    daq: &Mutex<D>,
    clock: &C,
    cfg: &OutputCfg,
    channel: Channel,
    volts: f64,
    stop: &StopFlag,
) -> Result<()>
where
    D: AnalogOutput + ?Sized,
    C: Clock + ?Sized,
{
    check_constant(cfg, channel, volts).map_err(eyre::Report::new)?;
    {
        let mut dev = lock_device(daq)?;
        if let Err(e) = dev.write_static(&[channel], &[volts]) {
            if let Err(z) = dev.write_static(&[channel], &[0.0]) {
                tracing::warn!(%channel, error = %z, "failed to reset output to 0 V");
            }
            return Err(report(&*e).wrap_err(format!("set {channel} to {volts} V")));
        }
    }
    tracing::info!(%channel, volts, "holding constant output");

    while !stop.is_set() {
        clock.sleep(cfg.check_interval);
    }

    let mut dev = lock_device(daq)?;
    if let Err(e) = dev.write_static(&[channel], &[0.0]) {
        tracing::warn!(%channel, error = %e, "failed to reset output to 0 V");
    }
    tracing::info!(%channel, "constant output released");
    Ok(())
}

/// Reject a constant level beyond the channel's amplitude.
pub fn check_constant(cfg: &OutputCfg, channel: Channel, volts: f64) -> std::result::Result<(), PrintError> {
    let amp = cfg.amplitude(channel);
    if volts.is_finite() && volts.abs() <= amp {
        Ok(())
    } else {
        Err(PrintError::Validation(format!(
            "{channel} voltage {volts} V outside ±{amp} V"
        )))
    }
}

pub(crate) fn lock_device<D: ?Sized>(daq: &Mutex<D>) -> Result<std::sync::MutexGuard<'_, D>> {
    daq.lock()
        .map_err(|_| eyre::Report::new(PrintError::State("output device lock poisoned".into())))
}
