//! Small numeric helpers shared by the signal builders.

/// Number of microseconds in one second.
pub const MICROS_PER_SEC: f64 = 1_000_000.0;

/// Sample rate for a per-sample dwell time.
#[inline]
pub fn sample_rate_hz(dwell_us: f64) -> f64 {
    MICROS_PER_SEC / dwell_us
}

/// Samples covering the mirror flyback, rounded down.
#[inline]
pub fn blanking_samples(mirror_recovery_us: f64, dwell_us: f64) -> usize {
    if !(dwell_us > 0.0) || !(mirror_recovery_us > 0.0) {
        return 0;
    }
    (mirror_recovery_us / dwell_us).floor() as usize
}

/// `n` evenly spaced values from `start` to `end` inclusive.
/// A single point yields `start`.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { end } else { start + step * i as f64 })
                .collect()
        }
    }
}
