//! Asymmetric slew-rate limiter between the commanded and the filtered target.

/// Ramp state: the filtered target and the two slew rates (rot/s²).
#[derive(Debug, Clone)]
pub struct TargetRamp {
    filtered_rps: f32,
    max_accel: f32,
    max_decel: f32,
}

impl TargetRamp {
    pub fn new(max_accel: f32, max_decel: f32) -> Self {
        Self {
            filtered_rps: 0.0,
            max_accel,
            max_decel,
        }
    }

    /// Rate that applies when moving from `filtered` toward `target`.
    ///
    /// Opposite signs always decelerate. Otherwise accelerate only when the
    /// magnitude grows.
    #[inline]
    pub fn rate_for(&self, target: f32) -> f32 {
        if self.reversing(target) || target.abs() <= self.filtered_rps.abs() {
            self.max_decel
        } else {
            self.max_accel
        }
    }

    #[inline]
    fn reversing(&self, target: f32) -> bool {
        self.filtered_rps * target < 0.0
    }

    /// Advance one tick of `dt_s` seconds toward `target` and return the new filtered value.
    ///
    /// A reversal stops at exactly zero; the new direction starts on a later tick.
    pub fn advance(&mut self, target: f32, dt_s: f32) -> f32 {
        if !target.is_finite() || !dt_s.is_finite() || dt_s <= 0.0 {
            return self.filtered_rps;
        }
        let max_step = self.rate_for(target) * dt_s;
        let goal = if self.reversing(target) { 0.0 } else { target };
        let step = (goal - self.filtered_rps).clamp(-max_step, max_step);
        self.filtered_rps += step;
        self.filtered_rps
    }

    #[inline]
    pub fn filtered(&self) -> f32 {
        self.filtered_rps
    }

    /// Snap the filtered target to zero.
    pub fn reset(&mut self) {
        self.filtered_rps = 0.0;
    }

    pub fn max_accel(&self) -> f32 {
        self.max_accel
    }

    pub fn max_decel(&self) -> f32 {
        self.max_decel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0.0, 100.0, 600.0)] // speeding up
    #[case(100.0, 50.0, 1200.0)] // slowing, same direction
    #[case(100.0, -50.0, 1200.0)] // reversing
    #[case(-100.0, -200.0, 600.0)] // speeding up backwards
    #[case(-100.0, 0.0, 1200.0)] // stopping
    fn rate_selection(#[case] filtered: f32, #[case] target: f32, #[case] expected: f32) {
        let mut r = TargetRamp::new(600.0, 1200.0);
        r.filtered_rps = filtered;
        assert_eq!(r.rate_for(target), expected);
    }

    #[test]
    fn first_step_from_rest_is_bounded_by_accel() {
        let mut r = TargetRamp::new(600.0, 1200.0);
        let f = r.advance(666.0, 0.02);
        assert!((f - 12.0).abs() < 1e-4);
    }

    #[test]
    fn reaches_target_without_overshoot() {
        let mut r = TargetRamp::new(600.0, 1200.0);
        for _ in 0..10 {
            r.advance(30.0, 0.02);
        }
        assert_eq!(r.filtered(), 30.0);
    }

    #[test]
    fn reversal_lands_on_zero_first() {
        let mut r = TargetRamp::new(600.0, 1200.0);
        r.filtered_rps = 10.0;
        // decel step of 24 would overshoot past zero; the ramp stops at zero
        assert_eq!(r.advance(-100.0, 0.02), 0.0);
        let next = r.advance(-100.0, 0.02);
        assert!((next + 12.0).abs() < 1e-4);
    }

    #[test]
    fn degenerate_dt_holds_value() {
        let mut r = TargetRamp::new(600.0, 1200.0);
        r.filtered_rps = 5.0;
        assert_eq!(r.advance(100.0, 0.0), 5.0);
        assert_eq!(r.advance(f32::NAN, 0.02), 5.0);
    }
}
