//! The motor facade: one `tick` runs the whole control pipeline.
//!
//! setpoint → AEB ceiling → ramp → controller (+ encoder) → stall monitor → duty pair

use std::f32::consts::PI;
use std::sync::Arc;
use std::time::{Duration, Instant};

use eyre::WrapErr;
use rcdrive_traits::{Clock, DriveOutput, DutyPair};

use crate::aeb::{AebLimiter, clamp_to_ceiling};
use crate::config::LimitsCfg;
use crate::controller::{ControlTerms, VelocityController};
use crate::encoder::EncoderCounter;
use crate::error::{DriveError, Result};
use crate::hw_error::map_hw_error;
use crate::inputs::ControlInputs;
use crate::mode::ControlMode;
use crate::output::DriveMapper;
use crate::ramp::TargetRamp;
use crate::stall::StallMonitor;
use crate::status::TickStatus;
use crate::util::clamp_dt;

/// What the caller last asked for. Percent setpoints follow the speed-limit factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Setpoint {
    Percent(f32),
    Rps(f32),
}

/// Read-only snapshot for telemetry encoders and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Telemetry {
    pub measured_rps: f32,
    pub requested_rps: f32,
    pub target_rps: f32,
    pub filtered_target_rps: f32,
    pub aeb_ceiling_rps: f32,
    pub max_available_rps: f32,
    pub speed_mmps: f32,
    pub mode: ControlMode,
    pub terms: ControlTerms,
    pub duty: DutyPair,
    pub stall_paused: bool,
    pub stall_trips: u64,
    pub ticks: u64,
}

/// Closed-loop velocity control of one DC motor.
pub struct Motor<D: DriveOutput> {
    pub(crate) drive: D,
    pub(crate) encoder: Arc<EncoderCounter>,
    pub(crate) last_count: i32,
    pub(crate) ramp: TargetRamp,
    pub(crate) controller: VelocityController,
    pub(crate) stall: StallMonitor,
    pub(crate) mapper: DriveMapper,
    pub(crate) aeb: Option<AebLimiter>,
    pub(crate) limits: LimitsCfg,
    pub(crate) wheel_diameter_mm: f32,
    pub(crate) gearing_ratio: f32,
    pub(crate) speed_limit_factor: f32,
    pub(crate) setpoint: Setpoint,
    pub(crate) target_rps: f32,
    pub(crate) aeb_ceiling_rps: f32,
    pub(crate) distance: Option<(u32, Instant)>,
    pub(crate) stale_after: Option<Duration>,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) nominal_tick: Duration,
    pub(crate) last_tick_at: Option<Instant>,
    pub(crate) last_duty: DutyPair,
    pub(crate) ticks: u64,
    pub(crate) seen_generation: Option<u64>,
    pub(crate) seen_distance_seq: u64,
}

impl<D: DriveOutput> core::fmt::Debug for Motor<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Motor")
            .field("setpoint", &self.setpoint)
            .field("filtered_target_rps", &self.ramp.filtered())
            .field("measured_rps", &self.controller.current_rps())
            .field("mode", &self.controller.mode())
            .field("aeb", &self.aeb.is_some())
            .field("last_duty", &self.last_duty)
            .finish()
    }
}

fn reject(e: DriveError) -> DriveError {
    tracing::warn!(error = %e, "command rejected; keeping previous value");
    e
}

impl<D: DriveOutput> Motor<D> {
    // ── Setters ──────────────────────────────────────────────────────────────

    /// Command a speed in percent of the available maximum (-100..=100).
    pub fn set_speed_percent(&mut self, pct: f32) -> core::result::Result<(), DriveError> {
        if !(-100.0..=100.0).contains(&pct) {
            return Err(reject(DriveError::InvalidSpeedPercent(pct)));
        }
        self.setpoint = Setpoint::Percent(pct);
        Ok(())
    }

    /// Command a speed in motor revolutions per second. Clamped to the available
    /// maximum; magnitudes below the minimum target speed become zero.
    pub fn set_speed_rps(&mut self, rps: f32) -> core::result::Result<(), DriveError> {
        if !rps.is_finite() {
            return Err(reject(DriveError::InvalidSpeed(rps)));
        }
        self.setpoint = Setpoint::Rps(rps);
        Ok(())
    }

    /// Scale the available maximum speed, 0 < f ≤ 1.
    pub fn set_speed_limit_factor(&mut self, f: f32) -> core::result::Result<(), DriveError> {
        if !(f > 0.0 && f <= 1.0) {
            return Err(reject(DriveError::InvalidLimitFactor(f)));
        }
        self.speed_limit_factor = f;
        Ok(())
    }

    /// Select a control mode by number. Switching clears the integral term;
    /// re-selecting the active mode changes nothing.
    pub fn set_mode(&mut self, raw: u8) -> core::result::Result<(), DriveError> {
        let mode = ControlMode::try_from(raw).map_err(reject)?;
        self.set_control_mode(mode);
        Ok(())
    }

    pub fn set_control_mode(&mut self, mode: ControlMode) {
        if mode == self.controller.mode() {
            return;
        }
        tracing::info!(from = %self.controller.mode(), to = %mode, "control mode changed");
        self.controller.set_mode(mode);
    }

    /// Wheel revolutions per motor revolution, as reported by the gearbox.
    pub fn set_gearing_ratio(&mut self, ratio: f32) -> core::result::Result<(), DriveError> {
        if !(ratio.is_finite() && ratio > 0.0) {
            return Err(reject(DriveError::InvalidGearing(ratio)));
        }
        self.gearing_ratio = ratio;
        Ok(())
    }

    /// Arm or disarm emergency braking. Ignored when no range sensor is fitted.
    pub fn set_aeb_armed(&mut self, armed: bool) {
        match self.aeb.as_mut() {
            Some(l) => {
                if l.is_armed() != armed {
                    tracing::info!(armed, "aeb state changed");
                }
                l.set_armed(armed);
            }
            None => tracing::debug!(armed, "aeb command ignored; no range sensor"),
        }
    }

    /// Latest range reading in millimetres, `None` when the sensor saw nothing.
    pub fn set_distance_mm(&mut self, distance_mm: Option<u32>) {
        let now = self.clock.now();
        self.distance = distance_mm.map(|d| (d, now));
    }

    /// Pull whatever changed in the shared input mailbox.
    pub fn apply_inputs(&mut self, inputs: &ControlInputs) {
        if self.seen_generation == Some(inputs.generation()) {
            return;
        }
        let s = inputs.snapshot();
        self.seen_generation = Some(s.generation);
        // values were validated by the mailbox; failures here are already logged
        let _ = self.set_speed_limit_factor(s.limit_factor);
        let _ = self.set_gearing_ratio(s.gearing_ratio);
        let _ = self.set_speed_percent(s.speed_percent);
        self.set_control_mode(s.mode);
        self.set_aeb_armed(s.aeb_armed);
        if s.distance_seq != self.seen_distance_seq {
            self.seen_distance_seq = s.distance_seq;
            self.set_distance_mm(s.distance_mm);
        }
    }

    // ── Control ──────────────────────────────────────────────────────────────

    /// Requested speed after limit scaling, clamping and min-speed snapping.
    fn resolve_setpoint(&self) -> f32 {
        let max = self.max_available_rps();
        let rps = match self.setpoint {
            Setpoint::Percent(p) => p / 100.0 * max,
            Setpoint::Rps(r) => r,
        }
        .clamp(-max, max);
        if rps.abs() < self.limits.min_target_rps {
            0.0
        } else {
            rps
        }
    }

    fn fresh_distance_mm(&self) -> Option<f32> {
        let (d, at) = self.distance?;
        if let Some(max_age) = self.stale_after
            && self.clock.now().saturating_duration_since(at) > max_age
        {
            return None;
        }
        Some(d as f32)
    }

    fn current_ceiling(&self) -> f32 {
        match &self.aeb {
            Some(l) => l.ceiling_rps(self.fresh_distance_mm(), self.gearing_ratio),
            None => self.limits.max_rps,
        }
    }

    fn write_duty(&mut self, duty: DutyPair) -> Result<()> {
        self.drive
            .set_duty(duty)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("writing drive duty")?;
        self.last_duty = duty;
        Ok(())
    }

    /// Run one control period of length `dt`.
    ///
    /// Speed is measured over the full `dt` the encoder delta covers. Ramp,
    /// integral and stall timing use `dt` clamped to two nominal periods.
    pub fn tick(&mut self, dt: Duration) -> Result<TickStatus> {
        let elapsed = if dt.is_zero() { self.nominal_tick } else { dt };
        let dt = clamp_dt(dt, self.nominal_tick);
        let dt_s = dt.as_secs_f32();
        self.ticks = self.ticks.wrapping_add(1);

        let delta = self.encoder.read_and_diff(&mut self.last_count);
        let raw_rps = self.controller.measure(delta, elapsed.as_secs_f32());

        if let Some(remaining) = self.stall.consume_pause() {
            self.write_duty(DutyPair::ZERO)?;
            if remaining == 0 {
                tracing::info!("stall pause over; resuming control");
            }
            return Ok(TickStatus::StallPaused {
                remaining_ticks: remaining,
            });
        }

        self.aeb_ceiling_rps = self.current_ceiling();
        self.target_rps = clamp_to_ceiling(self.resolve_setpoint(), self.aeb_ceiling_rps);
        let filtered = self.ramp.advance(self.target_rps, dt_s);

        if self.stall.observe(raw_rps, filtered, dt) {
            tracing::warn!(
                filtered_target_rps = filtered,
                pause_ticks = self.stall.pause_ticks(),
                "motor stall detected; output forced to zero"
            );
            self.controller.clear_after_stall();
            self.write_duty(DutyPair::ZERO)?;
            return Ok(TickStatus::StallDetected);
        }

        let signal = self.controller.update(filtered, dt_s);
        let duty = self.mapper.map(signal);
        self.write_duty(duty)?;
        tracing::trace!(
            measured_rps = self.controller.current_rps(),
            target_rps = self.target_rps,
            filtered_target_rps = filtered,
            signal,
            forward = duty.forward,
            reverse = duty.reverse,
            "tick"
        );

        if filtered == 0.0 && duty.is_zero() {
            Ok(TickStatus::Idle)
        } else {
            Ok(TickStatus::Running)
        }
    }

    /// Tick with `dt` measured on the motor's clock since the previous call.
    pub fn tick_now(&mut self) -> Result<TickStatus> {
        let now = self.clock.now();
        let dt = match self.last_tick_at {
            Some(prev) => now.saturating_duration_since(prev),
            None => self.nominal_tick,
        };
        self.last_tick_at = Some(now);
        self.tick(dt)
    }

    /// Zero both channels and drop all motion state. Call on every loop teardown.
    pub fn stop(&mut self) -> Result<()> {
        self.setpoint = Setpoint::Rps(0.0);
        self.target_rps = 0.0;
        self.ramp.reset();
        self.controller.clear_after_stall();
        self.last_tick_at = None;
        self.write_duty(DutyPair::ZERO)
    }

    // ── Getters ──────────────────────────────────────────────────────────────

    /// Measured (filtered) motor speed, rps.
    pub fn measured_rps(&self) -> f32 {
        self.controller.current_rps()
    }

    /// Ceiling imposed by emergency braking on the last tick, rps.
    pub fn aeb_ceiling_rps(&self) -> f32 {
        self.aeb_ceiling_rps
    }

    /// `max_rps` scaled by the speed-limit factor.
    pub fn max_available_rps(&self) -> f32 {
        self.limits.max_rps * self.speed_limit_factor
    }

    /// Linear speed at the wheel, mm/s.
    pub fn speed_mmps(&self) -> f32 {
        self.measured_rps() * self.gearing_ratio * PI * self.wheel_diameter_mm
    }

    pub fn requested_rps(&self) -> f32 {
        self.resolve_setpoint()
    }

    /// Target after the AEB clamp on the last tick.
    pub fn target_rps(&self) -> f32 {
        self.target_rps
    }

    pub fn filtered_target_rps(&self) -> f32 {
        self.ramp.filtered()
    }

    pub fn integral_term(&self) -> f32 {
        self.controller.integral_term()
    }

    pub fn last_output(&self) -> f32 {
        self.controller.last_output()
    }

    pub fn mode(&self) -> ControlMode {
        self.controller.mode()
    }

    pub fn is_stall_paused(&self) -> bool {
        self.stall.is_paused()
    }

    pub fn last_duty(&self) -> DutyPair {
        self.last_duty
    }

    pub fn speed_limit_factor(&self) -> f32 {
        self.speed_limit_factor
    }

    pub fn gearing_ratio(&self) -> f32 {
        self.gearing_ratio
    }

    pub fn has_aeb(&self) -> bool {
        self.aeb.is_some()
    }

    pub fn nominal_tick(&self) -> Duration {
        self.nominal_tick
    }

    /// Shared handle to the encoder, for attaching edge sources.
    pub fn encoder(&self) -> Arc<EncoderCounter> {
        self.encoder.clone()
    }

    pub fn drive(&self) -> &D {
        &self.drive
    }

    pub fn telemetry(&self) -> Telemetry {
        Telemetry {
            measured_rps: self.measured_rps(),
            requested_rps: self.requested_rps(),
            target_rps: self.target_rps,
            filtered_target_rps: self.ramp.filtered(),
            aeb_ceiling_rps: self.aeb_ceiling_rps,
            max_available_rps: self.max_available_rps(),
            speed_mmps: self.speed_mmps(),
            mode: self.controller.mode(),
            terms: self.controller.terms(),
            duty: self.last_duty,
            stall_paused: self.stall.is_paused(),
            stall_trips: self.stall.trips(),
            ticks: self.ticks,
        }
    }
}
