//! 16-bit duty arithmetic helpers.
//!
//! The control signal is a signed `f32` in duty units where `DUTY_FULL_SCALE`
//! is 100% duty. Hardware sees unsigned 16-bit magnitudes only.

/// Full-scale duty value (100%).
pub const DUTY_FULL_SCALE: f32 = 65_535.0;

/// Clamp a signed control signal to ±full scale. NaN maps to 0.
#[inline]
pub fn clamp_signal(x: f32) -> f32 {
    if x.is_nan() {
        return 0.0;
    }
    x.clamp(-DUTY_FULL_SCALE, DUTY_FULL_SCALE)
}

/// Largest duty magnitude allowed for a given fraction of full scale,
/// rounded down. The fraction is clamped to [0, 1].
#[inline]
pub fn duty_ceiling(fraction: f32) -> u16 {
    let f = if fraction.is_finite() {
        fraction.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let v = (DUTY_FULL_SCALE * f).floor();
    // v is in [0, 65535] after the clamp above
    v as u16
}

/// Quantize a non-negative duty magnitude to `u16`, saturating at `ceiling`.
/// Truncates toward zero. Non-finite values map to 0.
#[inline]
pub fn quantize_duty(magnitude: f32, ceiling: u16) -> u16 {
    if !magnitude.is_finite() || magnitude <= 0.0 {
        return 0;
    }
    let c = f32::from(ceiling);
    if magnitude >= c {
        ceiling
    } else {
        magnitude.trunc() as u16
    }
}

/// Duty percentage (0..=100) expressed in duty units.
#[inline]
pub fn percent_to_duty(pct: f32) -> f32 {
    pct / 100.0 * DUTY_FULL_SCALE
}
