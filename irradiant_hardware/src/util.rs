use std::time::Duration;

use irradiant_traits::Clock;

use crate::error::{HwError, Result};

/// Wait until `is_ready` returns true or `timeout` expires, sleeping
/// `poll_interval` between checks to avoid spinning.
pub fn wait_until_with_timeout<C: Clock + ?Sized>(
    clock: &C,
    mut is_ready: impl FnMut() -> bool,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<()> {
    let epoch = clock.now();
    while !is_ready() {
        if clock.elapsed(epoch) >= timeout {
            return Err(HwError::DoneTimeout);
        }
        clock.sleep(poll_interval);
    }
    Ok(())
}
