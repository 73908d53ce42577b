//! Maps `Box<dyn Error>` from trait boundaries to a categorized `SensorError`.
//!
//! The traits in `ecoscale_traits` use `Box<dyn Error + Send + Sync>`; this module
//! decides whether a failure is retryable inside a burst or means the transducer is
//! gone, with an optional feature-gated path for `ecoscale_hardware::HwError`.

use crate::error::SensorError;

/// Categorize a trait-boundary error.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_sensor_error(e: &(dyn std::error::Error + 'static)) -> SensorError {
    #[cfg(feature = "hardware-errors")]
    {
        use ecoscale_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout | HwError::DataReadyTimeout | HwError::Io(_) => {
                    SensorError::Transient(hw.to_string())
                }
                HwError::Gpio(_) | HwError::Absent | HwError::Serial(_) => {
                    SensorError::Unavailable(hw.to_string())
                }
            };
        }
    }

    let s = e.to_string();
    let lower = s.to_lowercase();
    if lower.contains("unavailable") || lower.contains("not found") || lower.contains("gpio") {
        SensorError::Unavailable(s)
    } else {
        SensorError::Transient(s)
    }
}
