//! Movement lock shared by every motion producer.
//!
//! There is no waiting: a producer either gets the lock right away or is
//! told the device is busy. Manual and jog moves skip; a job start fails.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{PrintError, Result};
use crate::motion::Axis;
use crate::settle::SettleReport;

#[derive(Debug, Clone, Default)]
pub struct MovementLock {
    held: Arc<AtomicBool>,
}

impl MovementLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock if it is free. The guard may be moved to another thread.
    pub fn try_acquire(&self) -> Option<MovementGuard> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| MovementGuard {
                held: self.held.clone(),
            })
    }

    /// Like `try_acquire`, reporting contention as `PrintError::Busy`.
    pub fn acquire_or_busy(&self) -> std::result::Result<MovementGuard, PrintError> {
        self.try_acquire().ok_or(PrintError::Busy)
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Proof of holding the movement lock; released on drop.
#[derive(Debug)]
#[must_use = "the movement lock is released as soon as the guard is dropped"]
pub struct MovementGuard {
    held: Arc<AtomicBool>,
}

impl Drop for MovementGuard {
    fn drop(&mut self) {
        self.held.store(false, Ordering::Release);
    }
}

/// Absolute move under the movement lock, held only for this call.
pub fn try_move_to(
    lock: &MovementLock,
    axis: &Axis,
    target_nm: f64,
    wait_for_settled: bool,
) -> Result<Option<SettleReport>> {
    let _guard = lock.acquire_or_busy().map_err(eyre::Report::new)?;
    axis.move_to(target_nm, None, wait_for_settled)
}

/// Relative move from the last commanded position, under the movement lock.
pub fn try_move_by(
    lock: &MovementLock,
    axis: &Axis,
    delta_nm: f64,
    wait_for_settled: bool,
) -> Result<Option<SettleReport>> {
    let _guard = lock.acquire_or_busy().map_err(eyre::Report::new)?;
    let target = axis.desired_position() + delta_nm;
    axis.move_to(target, None, wait_for_settled)
}
