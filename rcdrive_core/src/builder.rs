//! Type-state builder for `Motor` and generic `build_motor` constructor.
//!
//! The builder enforces at compile time that a drive output and an encoder are
//! provided before `build()` is available. `try_build()` is always available
//! for dynamic checks.

use std::marker::PhantomData;
use std::sync::Arc;

use rcdrive_traits::clock::{Clock, MonotonicClock};
use rcdrive_traits::{DriveOutput, DutyPair};

use crate::aeb::AebLimiter;
use crate::config::*;
use crate::controller::{ControllerParams, VelocityController};
use crate::encoder::EncoderCounter;
use crate::error::{BuildError, Result};
use crate::motor::{Motor, Setpoint};
use crate::output::DriveMapper;
use crate::ramp::TargetRamp;
use crate::stall::StallMonitor;

/// Boxed drive output used by the dynamic builder.
pub type BoxedDrive = Box<dyn DriveOutput + Send>;

/// Motor with a type-erased drive output.
pub type DynMotor = Motor<BoxedDrive>;

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Builder for `DynMotor`. All fields are validated on `build()`.
pub struct MotorBuilder<D, E> {
    drive: Option<BoxedDrive>,
    encoder: Option<Arc<EncoderCounter>>,
    config: MotorConfig,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    _d: PhantomData<D>,
    _e: PhantomData<E>,
}

impl Default for MotorBuilder<Missing, Missing> {
    fn default() -> Self {
        Self {
            drive: None,
            encoder: None,
            config: MotorConfig::default(),
            clock: None,
            _d: PhantomData,
            _e: PhantomData,
        }
    }
}

impl Motor<BoxedDrive> {
    /// Start building a motor.
    pub fn builder() -> MotorBuilder<Missing, Missing> {
        MotorBuilder::default()
    }
}

macro_rules! invalid {
    ($msg:literal) => {
        return Err(eyre::Report::new(BuildError::InvalidConfig($msg)))
    };
}

fn positive(x: f32) -> bool {
    x.is_finite() && x > 0.0
}

fn unit_interval(x: f32) -> bool {
    x.is_finite() && x > 0.0 && x <= 1.0
}

/// Validate configuration and construct a `Motor` with derived parameters.
///
/// This is the single source of truth for validation and construction,
/// used by both `MotorBuilder::try_build()` and `build_motor()`.
fn validate_and_build<D: DriveOutput>(
    drive: D,
    encoder: Arc<EncoderCounter>,
    cfg: MotorConfig,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
) -> Result<Motor<D>> {
    // ── Validation ───────────────────────────────────────────────────────────
    if cfg.encoder.counts_per_rev == 0 {
        invalid!("encoder.counts_per_rev must be > 0");
    }
    if cfg.encoder.min_pulses_per_tick == 0 {
        invalid!("encoder.min_pulses_per_tick must be > 0");
    }
    if !(cfg.encoder.deadband_counts.is_finite() && cfg.encoder.deadband_counts >= 0.0) {
        invalid!("encoder.deadband_counts must be >= 0");
    }
    if !unit_interval(cfg.encoder.speed_filter_alpha) {
        invalid!("encoder.speed_filter_alpha must be in (0, 1]");
    }
    if !positive(cfg.ramp.max_accel_rps2) || !positive(cfg.ramp.max_decel_rps2) {
        invalid!("ramp rates must be > 0");
    }
    if cfg.control.tick.is_zero() {
        invalid!("control.tick must be > 0");
    }
    if !(cfg.control.min_duty.is_finite() && (0.0..=65_535.0).contains(&cfg.control.min_duty)) {
        invalid!("control.min_duty must be in [0, 65535]");
    }
    if !unit_interval(cfg.control.output_filter_alpha) {
        invalid!("control.output_filter_alpha must be in (0, 1]");
    }
    if !positive(cfg.control.integral_limit) {
        invalid!("control.integral_limit must be > 0");
    }
    if let StictionPolicy::AboveRps(x) = cfg.control.stiction
        && !(x.is_finite() && x >= 0.0)
    {
        invalid!("stiction threshold must be >= 0");
    }
    if !cfg.control.gains.is_valid() {
        invalid!("gains must be finite and >= 0");
    }
    if cfg.stall.max_time.is_zero() {
        invalid!("stall.max_time must be > 0");
    }
    if !unit_interval(cfg.output.max_duty_fraction) {
        invalid!("output.max_duty_fraction must be in (0, 1]");
    }
    if !positive(cfg.limits.max_rps) {
        invalid!("limits.max_rps must be > 0");
    }
    if !(cfg.limits.min_target_rps.is_finite() && cfg.limits.min_target_rps >= 0.0) {
        invalid!("limits.min_target_rps must be >= 0");
    }
    if !unit_interval(cfg.limits.speed_limit_factor) {
        invalid!("limits.speed_limit_factor must be in (0, 1]");
    }
    if !positive(cfg.drivetrain.wheel_diameter_mm) {
        invalid!("drivetrain.wheel_diameter_mm must be > 0");
    }
    if !positive(cfg.drivetrain.gearing_ratio) {
        invalid!("drivetrain.gearing_ratio must be > 0");
    }
    if !positive(cfg.model.a) || !cfg.model.b.is_finite() {
        invalid!("motor model slope must be > 0 and intercept finite");
    }
    if let Some(aeb) = &cfg.aeb {
        if !(aeb.safety_margin_mm.is_finite() && aeb.safety_margin_mm >= 0.0) {
            invalid!("aeb.safety_margin_mm must be >= 0");
        }
        if !(aeb.drivetrain_backlash_mm.is_finite() && aeb.drivetrain_backlash_mm >= 0.0) {
            invalid!("aeb.drivetrain_backlash_mm must be >= 0");
        }
        if !positive(aeb.max_decel_rps2) {
            invalid!("aeb.max_decel_rps2 must be > 0");
        }
    }

    // ── Derive ───────────────────────────────────────────────────────────────
    let clock: Arc<dyn Clock + Send + Sync> = match clock {
        Some(c) => c,
        None => Arc::new(MonotonicClock::new()),
    };
    let nominal_tick = cfg.control.tick;
    let params = ControllerParams::derive(&cfg.encoder, &cfg.control, cfg.model);
    tracing::debug!(
        min_countable_rps = params.min_countable_rps,
        deadband_rps = params.deadband_rps,
        tick_ms = nominal_tick.as_millis() as u64,
        "controller parameters derived"
    );
    let controller = VelocityController::new(
        params,
        cfg.control.gains.clone(),
        cfg.control.tick_context,
        cfg.control.initial_mode,
    );
    let aeb = cfg
        .aeb
        .as_ref()
        .map(|a| AebLimiter::new(a, cfg.drivetrain.wheel_diameter_mm, cfg.limits.max_rps));
    let stale_after = cfg.aeb.as_ref().and_then(|a| a.stale_after);
    let last_count = encoder.total();

    Ok(Motor {
        drive,
        encoder,
        last_count,
        ramp: TargetRamp::new(cfg.ramp.max_accel_rps2, cfg.ramp.max_decel_rps2),
        controller,
        stall: StallMonitor::new(cfg.stall.max_time, cfg.stall.pause, nominal_tick),
        mapper: DriveMapper::new(cfg.output.max_duty_fraction),
        aeb,
        wheel_diameter_mm: cfg.drivetrain.wheel_diameter_mm,
        gearing_ratio: cfg.drivetrain.gearing_ratio,
        speed_limit_factor: cfg.limits.speed_limit_factor,
        aeb_ceiling_rps: cfg.limits.max_rps,
        limits: cfg.limits,
        setpoint: Setpoint::Rps(0.0),
        target_rps: 0.0,
        distance: None,
        stale_after,
        clock,
        nominal_tick,
        last_tick_at: None,
        last_duty: DutyPair::ZERO,
        ticks: 0,
        seen_generation: None,
        seen_distance_seq: 0,
    })
}

impl<D, E> MotorBuilder<D, E> {
    /// Fallible build available in any type-state; returns detailed error for missing pieces.
    pub fn try_build(self) -> Result<DynMotor> {
        let drive = self
            .drive
            .ok_or_else(|| eyre::Report::new(BuildError::MissingDrive))?;
        let encoder = self
            .encoder
            .ok_or_else(|| eyre::Report::new(BuildError::MissingEncoder))?;
        validate_and_build(drive, encoder, self.config, self.clock)
    }
}

/// Chainable setters that do not affect type-state.
impl<D, E> MotorBuilder<D, E> {
    pub fn with_config(mut self, config: MotorConfig) -> Self {
        self.config = config;
        self
    }
    pub fn with_encoder_cfg(mut self, encoder: EncoderCfg) -> Self {
        self.config.encoder = encoder;
        self
    }
    pub fn with_ramp(mut self, ramp: RampCfg) -> Self {
        self.config.ramp = ramp;
        self
    }
    pub fn with_control(mut self, control: ControlCfg) -> Self {
        self.config.control = control;
        self
    }
    pub fn with_stall(mut self, stall: StallCfg) -> Self {
        self.config.stall = stall;
        self
    }
    pub fn with_output(mut self, output: OutputCfg) -> Self {
        self.config.output = output;
        self
    }
    pub fn with_limits(mut self, limits: LimitsCfg) -> Self {
        self.config.limits = limits;
        self
    }
    pub fn with_drivetrain(mut self, drivetrain: DrivetrainCfg) -> Self {
        self.config.drivetrain = drivetrain;
        self
    }
    /// Fit emergency braking. Without this the motor has no range sensor.
    pub fn with_aeb(mut self, aeb: AebCfg) -> Self {
        self.config.aeb = Some(aeb);
        self
    }
    pub fn with_motor_model(mut self, model: MotorModel) -> Self {
        self.config.model = model;
        self
    }
    /// Provide a custom clock implementation; defaults to `MonotonicClock` when not provided.
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }
}

// Setters that advance type-state
impl<E> MotorBuilder<Missing, E> {
    pub fn with_drive(self, drive: impl DriveOutput + Send + 'static) -> MotorBuilder<Set, E> {
        MotorBuilder {
            drive: Some(Box::new(drive)),
            encoder: self.encoder,
            config: self.config,
            clock: self.clock,
            _d: PhantomData,
            _e: PhantomData,
        }
    }
}

impl<D> MotorBuilder<D, Missing> {
    pub fn with_encoder(self, encoder: Arc<EncoderCounter>) -> MotorBuilder<D, Set> {
        MotorBuilder {
            drive: self.drive,
            encoder: Some(encoder),
            config: self.config,
            clock: self.clock,
            _d: PhantomData,
            _e: PhantomData,
        }
    }
}

impl MotorBuilder<Set, Set> {
    /// Validate and build the motor. Only available when drive and encoder are set.
    pub fn build(self) -> Result<DynMotor> {
        self.try_build()
    }
}

/// Build a statically-dispatched `Motor<D>` from a concrete drive.
///
/// Delegates to the shared `validate_and_build`.
pub fn build_motor<D: DriveOutput>(
    drive: D,
    encoder: Arc<EncoderCounter>,
    config: MotorConfig,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
) -> Result<Motor<D>> {
    validate_and_build(drive, encoder, config, clock)
}
