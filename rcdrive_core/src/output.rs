//! Signed drive signal to forward/reverse duty pair.

use rcdrive_traits::DutyPair;

use crate::fixed_point::{duty_ceiling, quantize_duty};

/// Maps the controller's signed output onto the two bridge channels.
///
/// Pure: the same signal always yields the same pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveMapper {
    ceiling: u16,
}

impl DriveMapper {
    /// `max_duty_fraction` of full scale becomes the per-channel ceiling.
    pub fn new(max_duty_fraction: f32) -> Self {
        Self {
            ceiling: duty_ceiling(max_duty_fraction),
        }
    }

    #[inline]
    pub fn ceiling(&self) -> u16 {
        self.ceiling
    }

    /// Non-negative signals drive the forward channel, negative ones the reverse
    /// channel; the other channel is always zero. NaN maps to zero.
    #[inline]
    pub fn map(&self, signal: f32) -> DutyPair {
        if signal.is_nan() {
            return DutyPair::ZERO;
        }
        let magnitude = quantize_duty(signal.abs(), self.ceiling);
        if signal >= 0.0 {
            DutyPair {
                forward: magnitude,
                reverse: 0,
            }
        } else {
            DutyPair {
                forward: 0,
                reverse: magnitude,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0.0, 0, 0)]
    #[case(1000.4, 1000, 0)]
    #[case(-1000.4, 0, 1000)]
    #[case(65_535.0, 62_258, 0)]
    #[case(-70_000.0, 0, 62_258)]
    #[case(f32::NAN, 0, 0)]
    fn maps_sign_to_channel(#[case] signal: f32, #[case] fwd: u16, #[case] rev: u16) {
        let m = DriveMapper::new(0.95);
        assert_eq!(
            m.map(signal),
            DutyPair {
                forward: fwd,
                reverse: rev
            }
        );
    }

    #[test]
    fn never_drives_both_channels() {
        let m = DriveMapper::new(0.95);
        for s in [-65_535.0f32, -1.0, -0.1, 0.0, 0.1, 1.0, 65_535.0] {
            let d = m.map(s);
            assert!(d.forward == 0 || d.reverse == 0);
            assert!(d.forward <= m.ceiling() && d.reverse <= m.ceiling());
        }
    }
}
