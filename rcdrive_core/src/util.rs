//! Common time/period helpers for rcdrive_core.

use std::time::Duration;

/// Number of microseconds in one second.
pub const MICROS_PER_SEC: u64 = 1_000_000;

/// Sampling period in microseconds for `hz`, never zero. `hz` of 0 is treated as 1.
#[inline]
pub fn period_us(hz: u32) -> u64 {
    (MICROS_PER_SEC / u64::from(hz.max(1))).max(1)
}

/// Clamp a measured tick interval against the nominal period.
///
/// Zero (first tick, or a clock that did not move) maps to `nominal`; anything
/// longer than two nominal periods is capped at `2 × nominal` so one late tick
/// cannot produce a runaway integration step.
#[inline]
pub fn clamp_dt(elapsed: Duration, nominal: Duration) -> Duration {
    if elapsed.is_zero() {
        return nominal;
    }
    elapsed.min(nominal.saturating_mul(2))
}

/// Number of whole ticks needed to cover `span`, rounding up.
/// Returns 0 for a zero span; a zero `nominal` is treated as 1 µs.
#[inline]
pub fn ticks_covering(span: Duration, nominal: Duration) -> u32 {
    let n = nominal.as_micros().max(1);
    let t = span.as_micros().div_ceil(n);
    u32::try_from(t).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_dt_caps_at_twice_nominal() {
        let nominal = Duration::from_millis(20);
        assert_eq!(clamp_dt(Duration::from_millis(15), nominal), Duration::from_millis(15));
        assert_eq!(clamp_dt(Duration::from_millis(40), nominal), Duration::from_millis(40));
        assert_eq!(clamp_dt(Duration::from_millis(500), nominal), Duration::from_millis(40));
        assert_eq!(clamp_dt(Duration::ZERO, nominal), nominal);
    }

    #[test]
    fn ticks_covering_rounds_up() {
        let nominal = Duration::from_millis(20);
        assert_eq!(ticks_covering(Duration::from_millis(1000), nominal), 50);
        assert_eq!(ticks_covering(Duration::from_millis(1001), nominal), 51);
        assert_eq!(ticks_covering(Duration::ZERO, nominal), 0);
    }
}
