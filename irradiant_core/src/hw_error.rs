//! Maps `Box<dyn Error>` from trait boundaries to typed `PrintError`.
//!
//! `Stage` and `AnalogOutput` return `Box<dyn Error + Send + Sync>`; this
//! module converts those to the typed enum, with a feature-gated path for
//! `irradiant_hardware::HwError` downcasting.

use crate::error::PrintError;

/// Map a trait-boundary error to a typed `PrintError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> PrintError {
    #[cfg(feature = "hardware-errors")]
    {
        use irradiant_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout | HwError::DoneTimeout => PrintError::Timeout(hw.to_string()),
                HwError::InvalidBuffer(msg) => PrintError::Validation(msg.clone()),
                HwError::Transport(msg) => PrintError::Device(msg.clone()),
                other => PrintError::DeviceFault(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        PrintError::Timeout(s)
    } else {
        PrintError::Device(s)
    }
}

/// Wrap a boxed trait error into an `eyre::Report` carrying a typed `PrintError`.
pub(crate) fn report(e: &(dyn std::error::Error + 'static)) -> eyre::Report {
    eyre::Report::new(map_hw_error(e))
}
