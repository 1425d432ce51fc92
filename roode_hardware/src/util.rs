use std::time::{Duration, Instant};

use crate::error::{HwError, Result};

/// Poll `ready` until it reports true, or fail with `DataReadyTimeout` once
/// `timeout` expires. Sleeps `poll_interval` between polls to keep the bus quiet.
/// Errors from `ready` abort the wait immediately.
pub fn poll_until_ready(
    mut ready: impl FnMut() -> Result<bool>,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    while !ready()? {
        if Instant::now() >= deadline {
            return Err(HwError::DataReadyTimeout);
        }
        std::thread::sleep(poll_interval);
    }
    Ok(())
}
