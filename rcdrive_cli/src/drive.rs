//! Drive runs: config mapping, drivetrain assembly, and the timed control loop.

use std::f32::consts::PI;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rcdrive_config::{Config, Gear};
use rcdrive_core::runner::{self, RunOptions, RunSummary};
use rcdrive_core::{AebLimiter, EncoderCounter, Motor, MotorConfig, RangeSampler, build_motor};
use rcdrive_traits::{Clock, DriveOutput, MonotonicClock, PulseSink};

use crate::cli::{DriveArgs, RtLock};
use crate::rt::{RtRequest, setup_rt_once};

/// Outcome of one `drive` run.
#[derive(Debug, Clone)]
pub struct DriveReport {
    pub summary: RunSummary,
    pub gear: Gear,
    pub mode: u8,
    /// Wheel travel; only known for the simulated plant.
    pub travelled_mm: Option<f64>,
    pub period_us: u64,
}

/// Runtime motor config for a run: file values, motor-model override, then CLI overrides.
pub fn motor_config(
    cfg: &Config,
    model: Option<&rcdrive_config::MotorModel>,
    gear: Gear,
    no_aeb: bool,
) -> MotorConfig {
    let mut mc = MotorConfig::from(cfg);
    if let Some(m) = model {
        mc.model = m.into();
    }
    mc.drivetrain.gearing_ratio = cfg.gearbox.ratio(gear);
    if no_aeb {
        mc.aeb = None;
    }
    mc
}

fn apply_commands<D: DriveOutput>(motor: &mut Motor<D>, args: &DriveArgs) -> eyre::Result<()> {
    if let Some(mode) = args.mode {
        motor.set_mode(mode)?;
    }
    if let Some(f) = args.limit {
        motor.set_speed_limit_factor(f)?;
    }
    motor.set_speed_percent(args.speed)?;
    Ok(())
}

fn run_options(cfg: &Config, args: &DriveArgs, shutdown: Arc<AtomicBool>) -> RunOptions {
    let cap = (cfg.runner.max_run_ms > 0).then_some(cfg.runner.max_run_ms);
    let ms = match (args.duration_ms, cap) {
        (Some(d), Some(c)) => Some(d.min(c)),
        (d, c) => d.or(c),
    };
    RunOptions {
        duration: ms.map(Duration::from_millis),
        max_ticks: None,
        shutdown: Some(shutdown),
    }
}

pub fn run_drive(
    cfg: &Config,
    model: Option<&rcdrive_config::MotorModel>,
    args: &DriveArgs,
    shutdown: Arc<AtomicBool>,
) -> eyre::Result<DriveReport> {
    setup_rt_once(RtRequest {
        enabled: args.rt,
        prio: args.rt_prio,
        lock: args.rt_lock.unwrap_or(RtLock::os_default()),
        cpu: args.rt_cpu,
    });

    let gear = args.gear.map_or(cfg.gearbox.initial, Gear::from);
    let mc = motor_config(cfg, model, gear, args.no_aeb);
    let opts = run_options(cfg, args, shutdown);
    let period_us = u64::try_from(mc.control.tick.as_micros()).unwrap_or(u64::MAX);

    #[cfg(all(feature = "hardware", target_os = "linux"))]
    let (summary, travelled_mm) = drive_hardware(cfg, mc, args, &opts)?;
    #[cfg(not(all(feature = "hardware", target_os = "linux")))]
    let (summary, travelled_mm) = drive_sim(cfg, mc, args, &opts)?;

    Ok(DriveReport {
        mode: args.mode.unwrap_or(cfg.control.mode),
        summary,
        gear,
        travelled_mm,
        period_us,
    })
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn drive_sim(
    cfg: &Config,
    mc: MotorConfig,
    args: &DriveArgs,
    opts: &RunOptions,
) -> eyre::Result<(RunSummary, Option<f64>)> {
    use rcdrive_hardware::{PlantParams, SimulatedDrivetrain};

    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(MonotonicClock::new());
    let encoder = Arc::new(EncoderCounter::new());
    let plant = SimulatedDrivetrain::new(
        PlantParams {
            a: mc.model.a,
            b: mc.model.b,
            time_constant: Duration::from_millis(cfg.sim.time_constant_ms),
            counts_per_rev: mc.encoder.counts_per_rev,
            gearing_ratio: mc.drivetrain.gearing_ratio,
            wheel_diameter_mm: mc.drivetrain.wheel_diameter_mm,
        },
        encoder.clone() as Arc<dyn PulseSink>,
        clock.clone(),
    );

    let obstacle = args.obstacle_mm.or(cfg.sim.obstacle_mm);
    let sampler = match (&mc.aeb, obstacle) {
        (Some(_), Some(d)) => {
            tracing::info!(obstacle_mm = d, hz = cfg.aeb.sample_hz, "simulated range sensor");
            Some(RangeSampler::spawn(
                plant.range_sensor(d),
                cfg.aeb.sample_hz,
                Duration::from_millis(cfg.aeb.read_timeout_ms),
                MonotonicClock::new(),
            ))
        }
        _ => None,
    };

    if let Some(ms) = args.jam_after_ms {
        let jam = plant.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(ms));
            jam.set_jammed(true);
        });
    }

    let mut motor = build_motor(plant.clone(), encoder, mc, Some(clock.clone()))?;
    apply_commands(&mut motor, args)?;
    let summary = runner::run(&mut motor, None, sampler.as_ref(), &*clock, opts)?;
    Ok((summary, Some(plant.travelled_mm())))
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn drive_hardware(
    cfg: &Config,
    mc: MotorConfig,
    args: &DriveArgs,
    opts: &RunOptions,
) -> eyre::Result<(RunSummary, Option<f64>)> {
    use rcdrive_hardware::{PwmBridge, attach_quadrature};

    if args.obstacle_mm.is_some() || args.jam_after_ms.is_some() {
        tracing::warn!("--obstacle-mm and --jam-after-ms only apply to the simulated plant");
    }
    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(MonotonicClock::new());
    let encoder = Arc::new(EncoderCounter::new());
    let bridge = PwmBridge::new(
        cfg.pins.pwm_forward,
        cfg.pins.pwm_reverse,
        cfg.output.pwm_frequency_hz,
    )
    .map_err(|e| eyre::eyre!("open motor pins: {e}"))?;
    let _inputs = attach_quadrature(
        cfg.pins.encoder_a,
        cfg.pins.encoder_b,
        encoder.clone() as Arc<dyn PulseSink>,
    )
    .map_err(|e| eyre::eyre!("open encoder pins: {e}"))?;

    let mut motor = build_motor(bridge, encoder, mc, Some(clock.clone()))?;
    apply_commands(&mut motor, args)?;
    let summary = runner::run(&mut motor, None, None, &*clock, opts)?;
    Ok((summary, None))
}

/// Ceiling the emergency-braking limiter would impose at `distance_mm`.
#[derive(Debug, Clone, Copy)]
pub struct AebReport {
    pub distance_mm: u32,
    pub gear: Gear,
    pub ceiling_rps: f32,
    pub ceiling_mmps: f32,
    pub stopping_distance_mm: f32,
}

pub fn aeb_ceiling(cfg: &Config, distance_mm: u32, gear: Gear) -> AebReport {
    let aeb = rcdrive_core::AebCfg::from(&cfg.aeb);
    let wheel = cfg.gearbox.wheel_diameter_mm;
    let ratio = cfg.gearbox.ratio(gear);
    let limiter = AebLimiter::new(&aeb, wheel, cfg.limits.max_rps);
    let d = distance_mm as f32;
    let ceiling_rps = limiter.max_safe_speed_rps(d, ratio);
    AebReport {
        distance_mm,
        gear,
        ceiling_rps,
        ceiling_mmps: ceiling_rps * ratio * PI * wheel,
        stopping_distance_mm: limiter.stopping_distance_mm(d),
    }
}

/// Build the motor against the simulated plant and hold zero speed for a few ticks.
pub fn self_check(cfg: &Config, model: Option<&rcdrive_config::MotorModel>) -> eyre::Result<u64> {
    use rcdrive_hardware::{PlantParams, SimulatedDrivetrain};

    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(MonotonicClock::new());
    let encoder = Arc::new(EncoderCounter::new());
    let mc = motor_config(cfg, model, cfg.gearbox.initial, false);
    let plant = SimulatedDrivetrain::new(
        PlantParams::default(),
        encoder.clone() as Arc<dyn PulseSink>,
        clock.clone(),
    );
    let mut motor = build_motor(plant, encoder, mc, Some(clock.clone()))?;
    let summary = runner::run(
        &mut motor,
        None,
        None,
        &*clock,
        &RunOptions {
            max_ticks: Some(5),
            ..RunOptions::default()
        },
    )?;
    if !motor.last_duty().is_zero() {
        eyre::bail!("drive not zero after self-check: {:?}", motor.last_duty());
    }
    Ok(summary.ticks)
}

pub fn gear_name(g: Gear) -> &'static str {
    match g {
        Gear::Low => "low",
        Gear::High => "high",
    }
}

fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// One JSON line describing a finished run.
pub fn report_json(r: &DriveReport, speed_percent: f32) -> serde_json::Value {
    let s = &r.summary;
    serde_json::json!({
        "timestamp": unix_ms(),
        "speed_percent": speed_percent,
        "mode": r.mode,
        "gear": gear_name(r.gear),
        "duration_ms": s.elapsed_ms,
        "ticks": s.ticks,
        "stall_trips": s.stall_trips,
        "paused_ticks": s.paused_ticks,
        "final_rps": s.final_measured_rps,
        "peak_rps": s.peak_measured_rps,
        "min_aeb_ceiling_rps": s.min_aeb_ceiling_rps,
        "travelled_mm": r.travelled_mm,
        "max_tick_us": s.max_tick_us,
        "overruns": s.overruns,
    })
}

/// Print loop timing stats to stderr.
pub fn print_stats(r: &DriveReport) {
    let s = &r.summary;
    eprintln!("\n--- rcdrive stats ---");
    eprintln!("Ticks: {}", s.ticks);
    eprintln!("Period (us): {}", r.period_us);
    eprintln!("Max tick (us): {}", s.max_tick_us);
    eprintln!("Missed deadlines (> period): {}", s.overruns);
    eprintln!("Stall trips / paused ticks: {} / {}", s.stall_trips, s.paused_ticks);
    eprintln!("---------------------\n");
}
