//! Maps `Box<dyn Error>` from trait boundaries to typed `DriveError`.
//!
//! The traits in `rcdrive_traits` use `Box<dyn Error + Send + Sync>`; this
//! module converts those to our typed error enum, with an optional
//! feature-gated path for `rcdrive_hardware::HwError` downcasting.

use crate::error::DriveError;

/// Map a trait-boundary error to a typed `DriveError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> DriveError {
    #[cfg(feature = "hardware-errors")]
    {
        use rcdrive_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout => DriveError::Timeout,
                HwError::Gpio(_) | HwError::Pwm(_) | HwError::Disconnected => {
                    DriveError::HardwareFault(hw.to_string())
                }
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        DriveError::Timeout
    } else {
        DriveError::Hardware(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_errors_fall_back_to_message() {
        let e = std::io::Error::other("bridge offline");
        assert_eq!(map_hw_error(&e), DriveError::Hardware("bridge offline".into()));
    }

    #[test]
    fn timeout_text_maps_to_timeout() {
        let e = std::io::Error::other("I2C Timeout while ranging");
        assert_eq!(map_hw_error(&e), DriveError::Timeout);
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn hw_error_downcast_is_precise() {
        let e = rcdrive_hardware::error::HwError::Pwm("channel busy".into());
        assert!(matches!(map_hw_error(&e), DriveError::HardwareFault(_)));
        let e = rcdrive_hardware::error::HwError::Timeout;
        assert_eq!(map_hw_error(&e), DriveError::Timeout);
    }
}
