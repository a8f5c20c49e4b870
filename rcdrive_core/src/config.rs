//! Configuration types for the motor control core.
//!
//! These are the runtime configuration structs consumed by the builder.
//! They are separate from the TOML-deserialized config in `rcdrive_config`.

use std::time::Duration;

use crate::mode::{ControlMode, GainTable, TickContext};

/// Encoder geometry and measurement conditioning.
#[derive(Debug, Clone)]
pub struct EncoderCfg {
    /// Counted edges per motor revolution.
    pub counts_per_rev: u32,
    /// Pulses per tick needed for a trustworthy speed measurement.
    pub min_pulses_per_tick: u32,
    /// Error deadband in encoder counts per tick.
    pub deadband_counts: f32,
    /// EMA coefficient for measured speed. 1.0 disables smoothing.
    pub speed_filter_alpha: f32,
}

impl Default for EncoderCfg {
    fn default() -> Self {
        Self {
            counts_per_rev: 12,
            min_pulses_per_tick: 3,
            deadband_counts: 1.0,
            speed_filter_alpha: 1.0,
        }
    }
}

/// Slew rates for the target ramp, rot/s².
#[derive(Debug, Clone)]
pub struct RampCfg {
    pub max_accel_rps2: f32,
    pub max_decel_rps2: f32,
}

impl Default for RampCfg {
    fn default() -> Self {
        Self {
            max_accel_rps2: 600.0,
            max_decel_rps2: 1200.0,
        }
    }
}

/// Where the stiction bias starts to apply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StictionPolicy {
    /// Bias only when the filtered target is at or above the minimum countable speed.
    AboveCountable,
    /// Bias when the filtered target magnitude is at least this many rps.
    AboveRps(f32),
}

/// Velocity controller settings.
#[derive(Debug, Clone)]
pub struct ControlCfg {
    /// Nominal control period.
    pub tick: Duration,
    /// Minimum duty that overcomes static friction, in 16-bit duty units.
    pub min_duty: f32,
    /// Output low-pass coefficient. 1.0 disables smoothing.
    pub output_filter_alpha: f32,
    /// Integral accumulator bound, duty units.
    pub integral_limit: f32,
    pub stiction: StictionPolicy,
    pub initial_mode: ControlMode,
    pub tick_context: TickContext,
    pub gains: GainTable,
}

impl Default for ControlCfg {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(20),
            min_duty: 3000.0,
            output_filter_alpha: 0.7,
            integral_limit: crate::fixed_point::DUTY_FULL_SCALE,
            stiction: StictionPolicy::AboveCountable,
            initial_mode: ControlMode::default(),
            tick_context: TickContext::Task,
            gains: GainTable::default(),
        }
    }
}

/// Stall detection timing.
#[derive(Debug, Clone)]
pub struct StallCfg {
    /// Zero speed under demand for longer than this trips the monitor.
    pub max_time: Duration,
    /// Output held at zero for this long after a trip.
    pub pause: Duration,
}

impl Default for StallCfg {
    fn default() -> Self {
        Self {
            max_time: Duration::from_millis(500),
            pause: Duration::from_millis(1000),
        }
    }
}

/// Drive output limits.
#[derive(Debug, Clone)]
pub struct OutputCfg {
    /// Fraction of full-scale duty the driver may see.
    pub max_duty_fraction: f32,
}

impl Default for OutputCfg {
    fn default() -> Self {
        Self {
            max_duty_fraction: 0.95,
        }
    }
}

/// Speed limits of the motor itself.
#[derive(Debug, Clone)]
pub struct LimitsCfg {
    /// Absolute motor speed ceiling, rps.
    pub max_rps: f32,
    /// Requested speeds below this magnitude snap to zero.
    pub min_target_rps: f32,
    /// Initial speed-limit factor, 0 < f ≤ 1.
    pub speed_limit_factor: f32,
}

impl Default for LimitsCfg {
    fn default() -> Self {
        Self {
            max_rps: 666.0,
            min_target_rps: 20.0,
            speed_limit_factor: 1.0,
        }
    }
}

/// Wheel geometry and the initial gearing.
#[derive(Debug, Clone)]
pub struct DrivetrainCfg {
    pub wheel_diameter_mm: f32,
    /// Wheel revolutions per motor revolution.
    pub gearing_ratio: f32,
}

impl Default for DrivetrainCfg {
    fn default() -> Self {
        Self {
            wheel_diameter_mm: 82.0,
            gearing_ratio: 0.0125,
        }
    }
}

/// Automatic emergency braking parameters. Present only when a range sensor is fitted.
#[derive(Debug, Clone)]
pub struct AebCfg {
    pub armed: bool,
    pub safety_margin_mm: f32,
    pub drivetrain_backlash_mm: f32,
    /// Braking capability of the motor, rot/s².
    pub max_decel_rps2: f32,
    /// A distance older than this is ignored. `None` never expires readings.
    pub stale_after: Option<Duration>,
}

impl Default for AebCfg {
    fn default() -> Self {
        Self {
            armed: true,
            safety_margin_mm: 150.0,
            drivetrain_backlash_mm: 30.0,
            max_decel_rps2: 1200.0,
            stale_after: Some(Duration::from_millis(200)),
        }
    }
}

/// Empirical steady-state model: `rps ≈ a × duty% − b`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorModel {
    pub a: f32,
    pub b: f32,
}

impl Default for MotorModel {
    fn default() -> Self {
        Self { a: 7.1, b: 10.0 }
    }
}

impl MotorModel {
    /// Duty percentage expected to hold `rps` magnitude in steady state.
    ///
    /// Never negative: a fitted model with `b < 0` predicts motion at zero
    /// duty, which must not turn into drive in the opposite direction.
    #[inline]
    pub fn duty_percent_for(&self, rps: f32) -> f32 {
        ((rps.abs() + self.b) / self.a).max(0.0)
    }
}

/// Everything the builder needs besides the drive and the encoder.
#[derive(Debug, Clone, Default)]
pub struct MotorConfig {
    pub encoder: EncoderCfg,
    pub ramp: RampCfg,
    pub control: ControlCfg,
    pub stall: StallCfg,
    pub output: OutputCfg,
    pub limits: LimitsCfg,
    pub drivetrain: DrivetrainCfg,
    /// `None` when no range sensor is fitted.
    pub aeb: Option<AebCfg>,
    pub model: MotorModel,
}
