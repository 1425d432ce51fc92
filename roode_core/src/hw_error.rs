//! Maps `Box<dyn Error>` from trait boundaries to typed `RoodeError`.
//!
//! The traits in `roode_traits` use `Box<dyn Error + Send + Sync>`; this module
//! converts those to our typed error enum, with an optional feature-gated path
//! for `roode_hardware::HwError` downcasting.

use crate::error::RoodeError;

/// Map a trait-boundary error to a typed `RoodeError`.
///
/// Known hardware error types are downcast first, then the message is checked
/// for a timeout. Timeouts are acquisition misses; everything else is a fault.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> RoodeError {
    #[cfg(feature = "hardware-errors")]
    {
        use roode_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout | HwError::DataReadyTimeout => RoodeError::Timeout,
                other => RoodeError::HardwareFault(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") || s.to_lowercase().contains("timed out") {
        RoodeError::Timeout
    } else {
        RoodeError::Hardware(s)
    }
}
