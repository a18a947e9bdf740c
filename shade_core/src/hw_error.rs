//! Maps `Box<dyn Error>` from trait boundaries to typed `ShadeError`.
//!
//! The traits in `shade_traits` use `Box<dyn Error + Send + Sync>`; this
//! module converts those to `ShadeError::HardwareFault`, with an optional
//! feature-gated path for `shade_hardware::HwError` downcasting.

use crate::error::ShadeError;

/// Map a trait-boundary error to a typed `ShadeError`.
///
/// Known hardware error types get a normalized message; anything else keeps
/// its own text.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> ShadeError {
    #[cfg(feature = "hardware-errors")]
    {
        use shade_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout | HwError::DataReadyTimeout => {
                    ShadeError::HardwareFault("position sensor timeout".into())
                }
                HwError::DriverFault(msg) => ShadeError::HardwareFault(format!("coil driver: {msg}")),
                other => ShadeError::HardwareFault(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        ShadeError::HardwareFault("position sensor timeout".into())
    } else {
        ShadeError::HardwareFault(s)
    }
}

/// `map_err` adapter for `HwResult` values.
pub(crate) fn hw(e: Box<dyn std::error::Error + Send + Sync>) -> ShadeError {
    map_hw_error(e.as_ref())
}
