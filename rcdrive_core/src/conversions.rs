//! `From` implementations bridging `rcdrive_config` types to `rcdrive_core` types.

use std::time::Duration;

use crate::config::{
    AebCfg, ControlCfg, DrivetrainCfg, EncoderCfg, LimitsCfg, MotorConfig, MotorModel, OutputCfg,
    RampCfg, StallCfg, StictionPolicy,
};
use crate::mode::{ControlMode, GainSet, GainTable, TickContext};

// ── EncoderCfg ───────────────────────────────────────────────────────────────

impl From<&rcdrive_config::EncoderCfg> for EncoderCfg {
    fn from(c: &rcdrive_config::EncoderCfg) -> Self {
        Self {
            counts_per_rev: c.counts_per_rev,
            min_pulses_per_tick: c.min_pulses_per_tick,
            deadband_counts: c.deadband_counts,
            speed_filter_alpha: c.speed_filter_alpha,
        }
    }
}

// ── RampCfg ──────────────────────────────────────────────────────────────────

impl From<&rcdrive_config::RampCfg> for RampCfg {
    fn from(c: &rcdrive_config::RampCfg) -> Self {
        Self {
            max_accel_rps2: c.max_accel_rps2,
            max_decel_rps2: c.max_decel_rps2,
        }
    }
}

// ── ControlCfg ───────────────────────────────────────────────────────────────

impl From<rcdrive_config::TickContext> for TickContext {
    fn from(c: rcdrive_config::TickContext) -> Self {
        match c {
            rcdrive_config::TickContext::Task => TickContext::Task,
            rcdrive_config::TickContext::Interrupt => TickContext::Interrupt,
        }
    }
}

fn gain_table(c: &rcdrive_config::ControlCfg) -> GainTable {
    let Some(rows) = &c.gains else {
        return GainTable::default();
    };
    let sets: Vec<GainSet> = rows
        .iter()
        .map(|r| GainSet::new(r.kp, r.ki, r.kff))
        .collect();
    match <[GainSet; 4]>::try_from(sets) {
        Ok(task) => GainTable::from_task(task, c.irq_gain_scale),
        Err(_) => {
            tracing::warn!(rows = rows.len(), "gain table needs 4 rows; using built-in gains");
            GainTable::default()
        }
    }
}

impl From<&rcdrive_config::ControlCfg> for ControlCfg {
    fn from(c: &rcdrive_config::ControlCfg) -> Self {
        Self {
            tick: Duration::from_millis(c.tick_ms),
            min_duty: c.min_duty,
            output_filter_alpha: c.output_filter_alpha,
            integral_limit: c.integral_limit,
            stiction: c
                .stiction_min_rps
                .map_or(StictionPolicy::AboveCountable, StictionPolicy::AboveRps),
            initial_mode: ControlMode::try_from(c.mode).unwrap_or_default(),
            tick_context: c.tick_context.into(),
            gains: gain_table(c),
        }
    }
}

// ── StallCfg ─────────────────────────────────────────────────────────────────

impl From<&rcdrive_config::StallCfg> for StallCfg {
    fn from(c: &rcdrive_config::StallCfg) -> Self {
        Self {
            max_time: Duration::from_millis(c.max_time_ms),
            pause: Duration::from_millis(c.pause_ms),
        }
    }
}

// ── OutputCfg ────────────────────────────────────────────────────────────────

impl From<&rcdrive_config::OutputCfg> for OutputCfg {
    fn from(c: &rcdrive_config::OutputCfg) -> Self {
        Self {
            max_duty_fraction: c.max_duty_fraction,
        }
    }
}

// ── LimitsCfg ────────────────────────────────────────────────────────────────

impl From<&rcdrive_config::LimitsCfg> for LimitsCfg {
    fn from(c: &rcdrive_config::LimitsCfg) -> Self {
        Self {
            max_rps: c.max_rps,
            min_target_rps: c.min_target_rps,
            speed_limit_factor: c.speed_limit_factor,
        }
    }
}

// ── DrivetrainCfg ────────────────────────────────────────────────────────────

impl From<&rcdrive_config::GearboxCfg> for DrivetrainCfg {
    fn from(c: &rcdrive_config::GearboxCfg) -> Self {
        Self {
            wheel_diameter_mm: c.wheel_diameter_mm,
            gearing_ratio: c.ratio(c.initial),
        }
    }
}

// ── AebCfg ───────────────────────────────────────────────────────────────────

impl From<&rcdrive_config::AebCfg> for AebCfg {
    fn from(c: &rcdrive_config::AebCfg) -> Self {
        Self {
            armed: c.armed,
            safety_margin_mm: c.safety_margin_mm,
            drivetrain_backlash_mm: c.drivetrain_backlash_mm,
            max_decel_rps2: c.max_decel_rps2,
            stale_after: (c.stale_after_ms > 0).then(|| Duration::from_millis(c.stale_after_ms)),
        }
    }
}

// ── MotorModel ───────────────────────────────────────────────────────────────

impl From<&rcdrive_config::MotorModelCfg> for MotorModel {
    fn from(c: &rcdrive_config::MotorModelCfg) -> Self {
        Self { a: c.a, b: c.b }
    }
}

impl From<&rcdrive_config::MotorModel> for MotorModel {
    fn from(c: &rcdrive_config::MotorModel) -> Self {
        Self { a: c.a, b: c.b }
    }
}

// ── MotorConfig ──────────────────────────────────────────────────────────────

impl From<&rcdrive_config::Config> for MotorConfig {
    fn from(c: &rcdrive_config::Config) -> Self {
        Self {
            encoder: (&c.encoder).into(),
            ramp: (&c.ramp).into(),
            control: (&c.control).into(),
            stall: (&c.stall).into(),
            output: (&c.output).into(),
            limits: (&c.limits).into(),
            drivetrain: (&c.gearbox).into(),
            aeb: c.aeb.enabled.then(|| (&c.aeb).into()),
            model: c.motor_model.as_ref().map(Into::into).unwrap_or_default(),
        }
    }
}
