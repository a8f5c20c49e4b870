//! Automatic emergency braking: a distance-based ceiling on the commanded speed.
//!
//! Pure functions of the current inputs. The ceiling comes from the kinematic
//! stopping relation `d = v² / 2a` evaluated at the wheel, then converted back
//! to motor revolutions.

use std::f32::consts::PI;

use crate::config::AebCfg;

#[derive(Debug, Clone)]
pub struct AebLimiter {
    armed: bool,
    safety_margin_mm: f32,
    drivetrain_backlash_mm: f32,
    max_decel_rps2: f32,
    wheel_diameter_mm: f32,
    max_rps: f32,
}

impl AebLimiter {
    pub fn new(cfg: &AebCfg, wheel_diameter_mm: f32, max_rps: f32) -> Self {
        Self {
            armed: cfg.armed,
            safety_margin_mm: cfg.safety_margin_mm,
            drivetrain_backlash_mm: cfg.drivetrain_backlash_mm,
            max_decel_rps2: cfg.max_decel_rps2,
            wheel_diameter_mm,
            max_rps,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn set_armed(&mut self, armed: bool) {
        self.armed = armed;
    }

    pub fn max_rps(&self) -> f32 {
        self.max_rps
    }

    /// Millimetres travelled at the wheel per motor revolution.
    #[inline]
    fn mm_per_motor_rev(&self, gearing_ratio: f32) -> f32 {
        gearing_ratio * PI * self.wheel_diameter_mm
    }

    /// Distance left for braking once margin and backlash are reserved.
    #[inline]
    pub fn stopping_distance_mm(&self, distance_mm: f32) -> f32 {
        (distance_mm - self.safety_margin_mm - self.drivetrain_backlash_mm).max(0.0)
    }

    /// Highest motor speed from which the vehicle still stops within `distance_mm`.
    ///
    /// Always within `[0, max_rps]`. A non-positive or non-finite gearing
    /// ratio yields 0.
    pub fn max_safe_speed_rps(&self, distance_mm: f32, gearing_ratio: f32) -> f32 {
        let k = self.mm_per_motor_rev(gearing_ratio);
        if !(k.is_finite() && k > 0.0) || distance_mm.is_nan() {
            return 0.0;
        }
        let stopping = self.stopping_distance_mm(distance_mm);
        let wheel_decel = self.max_decel_rps2 * k;
        let v_mmps = (2.0 * stopping * wheel_decel).sqrt();
        let v_mmps = v_mmps.clamp(0.0, self.max_rps * k);
        (v_mmps / k).clamp(0.0, self.max_rps)
    }

    /// Speed ceiling for this tick.
    ///
    /// Disarmed, or without a current distance, the limiter is bypassed and the
    /// ceiling is `max_rps`.
    pub fn ceiling_rps(&self, distance_mm: Option<f32>, gearing_ratio: f32) -> f32 {
        match distance_mm {
            Some(d) if self.armed => self.max_safe_speed_rps(d, gearing_ratio),
            _ => self.max_rps,
        }
    }
}

/// Limit `requested_rps` to `ceiling_rps` in magnitude, keeping its sign.
#[inline]
pub fn clamp_to_ceiling(requested_rps: f32, ceiling_rps: f32) -> f32 {
    let c = ceiling_rps.max(0.0);
    requested_rps.signum() * requested_rps.abs().min(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> AebLimiter {
        let cfg = AebCfg {
            armed: true,
            safety_margin_mm: 500.0,
            drivetrain_backlash_mm: 30.0,
            max_decel_rps2: 1200.0,
            stale_after: None,
        };
        AebLimiter::new(&cfg, 82.0, 700.0)
    }

    #[test]
    fn inside_margin_ceiling_is_zero() {
        let l = limiter();
        assert_eq!(l.stopping_distance_mm(500.0), 0.0);
        assert_eq!(l.max_safe_speed_rps(500.0, 0.0125), 0.0);
        assert_eq!(l.max_safe_speed_rps(530.0, 0.0125), 0.0);
    }

    #[test]
    fn far_obstacle_clamps_to_max_rps() {
        let l = limiter();
        assert_eq!(l.stopping_distance_mm(2000.0), 1470.0);
        let v = l.max_safe_speed_rps(2000.0, 0.0125);
        assert!((v - 700.0).abs() < 1e-2, "got {v}");
    }

    #[test]
    fn intermediate_distance_matches_kinematics() {
        let l = limiter();
        // 100 mm of braking room
        let v = l.max_safe_speed_rps(630.0, 0.0125);
        let k = 0.0125 * PI * 82.0;
        let expected = (2.0 * 100.0 * 1200.0 * k).sqrt() / k;
        assert!((v - expected).abs() < 1e-2);
        assert!(v > 0.0 && v < 700.0);
    }

    #[test]
    fn disarmed_or_blind_bypasses() {
        let mut l = limiter();
        assert_eq!(l.ceiling_rps(None, 0.0125), 700.0);
        l.set_armed(false);
        assert_eq!(l.ceiling_rps(Some(0.0), 0.0125), 700.0);
    }

    #[test]
    fn bad_gearing_is_treated_as_unsafe() {
        let l = limiter();
        assert_eq!(l.max_safe_speed_rps(5000.0, 0.0), 0.0);
        assert_eq!(l.max_safe_speed_rps(5000.0, f32::NAN), 0.0);
    }

    #[test]
    fn clamp_keeps_sign() {
        assert_eq!(clamp_to_ceiling(300.0, 120.0), 120.0);
        assert_eq!(clamp_to_ceiling(-300.0, 120.0), -120.0);
        assert_eq!(clamp_to_ceiling(-50.0, 120.0), -50.0);
        assert_eq!(clamp_to_ceiling(80.0, 0.0), 0.0);
        assert_eq!(clamp_to_ceiling(0.0, 120.0), 0.0);
    }
}
