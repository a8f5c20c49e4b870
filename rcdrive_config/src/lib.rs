#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and motor-model fitting for the drive controller.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - The motor-model CSV loader enforces headers and performs a robust refit
//!   to reduce outlier influence before slope/intercept estimation.
use serde::Deserialize;

/// Motor-model CSV schema: steady-state speed measured at a fixed duty.
///
/// Expected headers:
/// duty_percent,rps
///
/// Example:
/// duty_percent,rps
/// 10,61.2
/// 20,132.5
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct ModelRow {
    pub duty_percent: f32,
    pub rps: f32,
}

#[derive(Debug, Deserialize)]
pub struct Pins {
    /// Hardware PWM channel driving the forward input of the bridge (0 or 1).
    pub pwm_forward: u8,
    /// Hardware PWM channel driving the reverse input of the bridge (0 or 1).
    pub pwm_reverse: u8,
    /// BCM GPIO of encoder channel A.
    pub encoder_a: u8,
    /// BCM GPIO of encoder channel B.
    pub encoder_b: u8,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EncoderCfg {
    pub counts_per_rev: u32,
    pub min_pulses_per_tick: u32,
    pub deadband_counts: f32,
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

#[derive(Debug, Deserialize)]
#[serde(default)]
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

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct GainRow {
    pub kp: f32,
    pub ki: f32,
    /// Feed-forward weight, percent.
    pub kff: f32,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TickContext {
    #[default]
    Task,
    Interrupt,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ControlCfg {
    pub tick_ms: u64,
    pub min_duty: f32,
    pub output_filter_alpha: f32,
    pub integral_limit: f32,
    /// Stiction bias threshold in rps. Absent: use the minimum countable speed.
    pub stiction_min_rps: Option<f32>,
    /// Startup mode, 0..=3.
    pub mode: u8,
    pub tick_context: TickContext,
    /// Optional per-mode gains, exactly four rows (modes 0..=3).
    pub gains: Option<Vec<GainRow>>,
    /// Multiplier for kp/ki when ticking in interrupt context. Only used with `gains`.
    pub irq_gain_scale: f32,
}

impl Default for ControlCfg {
    fn default() -> Self {
        Self {
            tick_ms: 20,
            min_duty: 3000.0,
            output_filter_alpha: 0.7,
            integral_limit: 65_535.0,
            stiction_min_rps: None,
            mode: 2,
            tick_context: TickContext::Task,
            gains: None,
            irq_gain_scale: 0.8,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StallCfg {
    pub max_time_ms: u64,
    pub pause_ms: u64,
}

impl Default for StallCfg {
    fn default() -> Self {
        Self {
            max_time_ms: 500,
            pause_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OutputCfg {
    pub max_duty_fraction: f32,
    pub pwm_frequency_hz: f64,
}

impl Default for OutputCfg {
    fn default() -> Self {
        Self {
            max_duty_fraction: 0.95,
            pwm_frequency_hz: 2000.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LimitsCfg {
    pub max_rps: f32,
    pub min_target_rps: f32,
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

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Gear {
    #[default]
    Low,
    High,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GearboxCfg {
    /// Wheel revolutions per motor revolution in low gear.
    pub low_ratio: f32,
    /// Wheel revolutions per motor revolution in high gear.
    pub high_ratio: f32,
    pub initial: Gear,
    pub wheel_diameter_mm: f32,
}

impl Default for GearboxCfg {
    fn default() -> Self {
        Self {
            low_ratio: 0.0125,
            high_ratio: 0.025,
            initial: Gear::Low,
            wheel_diameter_mm: 82.0,
        }
    }
}

impl GearboxCfg {
    pub fn ratio(&self, gear: Gear) -> f32 {
        match gear {
            Gear::Low => self.low_ratio,
            Gear::High => self.high_ratio,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AebCfg {
    /// A range sensor is fitted. When false the limiter is absent altogether.
    pub enabled: bool,
    /// Start armed.
    pub armed: bool,
    pub safety_margin_mm: f32,
    pub drivetrain_backlash_mm: f32,
    pub max_decel_rps2: f32,
    /// Readings older than this are ignored; 0 disables the check.
    pub stale_after_ms: u64,
    pub sample_hz: u32,
    pub read_timeout_ms: u64,
}

impl Default for AebCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            armed: true,
            safety_margin_mm: 150.0,
            drivetrain_backlash_mm: 30.0,
            max_decel_rps2: 1200.0,
            stale_after_ms: 200,
            sample_hz: 40,
            read_timeout_ms: 50,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct MotorModelCfg {
    /// rps per duty percent.
    pub a: f32,
    /// rps lost to friction at zero duty.
    pub b: f32,
}

impl Default for MotorModelCfg {
    fn default() -> Self {
        Self { a: 7.1, b: 10.0 }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RunnerCfg {
    /// Hard cap on one `drive` run, ms. 0 means no cap.
    pub max_run_ms: u64,
}

impl Default for RunnerCfg {
    fn default() -> Self {
        Self { max_run_ms: 60_000 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SimCfg {
    /// First-order lag of the simulated motor, ms.
    pub time_constant_ms: u64,
    /// Distance to the obstacle in front of the simulated car at start, mm.
    pub obstacle_mm: Option<u32>,
}

impl Default for SimCfg {
    fn default() -> Self {
        Self {
            time_constant_ms: 80,
            obstacle_mm: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub pins: Pins,
    #[serde(default)]
    pub encoder: EncoderCfg,
    #[serde(default)]
    pub ramp: RampCfg,
    #[serde(default)]
    pub control: ControlCfg,
    #[serde(default)]
    pub stall: StallCfg,
    #[serde(default)]
    pub output: OutputCfg,
    #[serde(default)]
    pub limits: LimitsCfg,
    #[serde(default)]
    pub gearbox: GearboxCfg,
    #[serde(default)]
    pub aeb: AebCfg,
    /// Optional persisted motor model; a CSV fit given on the command line wins.
    #[serde(default)]
    pub motor_model: Option<MotorModelCfg>,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub runner: RunnerCfg,
    #[serde(default)]
    pub sim: SimCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Fitted steady-state model `rps = a × duty% − b`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorModel {
    pub a: f32,
    pub b: f32,
}

impl From<MotorModelCfg> for MotorModel {
    fn from(m: MotorModelCfg) -> Self {
        MotorModel { a: m.a, b: m.b }
    }
}

impl MotorModel {
    /// Fit the model from measured rows using ordinary least squares, then one
    /// robust refit that drops points further than 2σ from the first line.
    ///
    /// Duty values must be strictly increasing and the fitted slope positive.
    pub fn from_rows(rows: Vec<ModelRow>) -> eyre::Result<Self> {
        if rows.len() < 2 {
            eyre::bail!("motor model requires at least two rows, got {}", rows.len());
        }
        for (i, r) in rows.iter().enumerate() {
            if !(r.duty_percent.is_finite() && r.rps.is_finite()) {
                eyre::bail!("motor model row {} has a non-finite value", i);
            }
            if !(0.0..=100.0).contains(&r.duty_percent) {
                eyre::bail!("motor model row {} duty_percent must be in [0, 100]", i);
            }
        }
        for i in 1..rows.len() {
            if rows[i].duty_percent <= rows[i - 1].duty_percent {
                eyre::bail!(
                    "motor model duty_percent must be strictly increasing (rows {} and {})",
                    i - 1,
                    i
                );
            }
        }

        let pts: Vec<(f64, f64)> = rows
            .iter()
            .map(|r| (f64::from(r.duty_percent), f64::from(r.rps)))
            .collect();
        let (a0, c0) = ols(&pts)?;

        let sumsq: f64 = pts
            .iter()
            .map(|(x, y)| {
                let r = y - (a0 * x + c0);
                r * r
            })
            .sum();
        let rms = (sumsq / pts.len() as f64).sqrt();
        let (a, c) = robust_refit(&pts, a0, c0, rms, 2.0).unwrap_or((a0, c0));

        if a <= 0.0 {
            eyre::bail!("motor model slope must be positive (speed must rise with duty)");
        }
        // rps = a·duty + c  ⇒  b = −c
        let model = MotorModel {
            a: a as f32,
            b: (-c) as f32,
        };
        if !(model.a.is_finite() && model.b.is_finite()) {
            eyre::bail!("motor model fit produced non-finite coefficients");
        }
        Ok(model)
    }
}

fn ols(pts: &[(f64, f64)]) -> eyre::Result<(f64, f64)> {
    let n = pts.len() as f64;
    let mean_x = pts.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pts.iter().map(|p| p.1).sum::<f64>() / n;
    let mut sxx = 0.0f64;
    let mut sxy = 0.0f64;
    for (x, y) in pts {
        let dx = x - mean_x;
        sxx += dx * dx;
        sxy += dx * (y - mean_y);
    }
    if !sxx.is_finite() || sxx == 0.0 {
        eyre::bail!("motor model cannot determine slope (degenerate duty variance)");
    }
    let a = sxy / sxx;
    if !a.is_finite() {
        eyre::bail!("motor model produced non-finite slope");
    }
    Ok((a, mean_y - a * mean_x))
}

/// Single-step robust refit: reject points with |residual| > k·rms around the
/// initial line and refit the inliers with an online covariance update.
/// Returns None when the refit is not applicable (no outliers, fewer than two
/// inliers, zero rms, or degenerate variance).
fn robust_refit(pts: &[(f64, f64)], a0: f64, c0: f64, rms: f64, k: f64) -> Option<(f64, f64)> {
    if !(rms.is_finite() && rms > 0.0 && k.is_finite() && k > 0.0) {
        return None;
    }
    let thr = k * rms;
    let mut n_in: usize = 0;
    let mut mean_x = 0.0f64;
    let mut mean_y = 0.0f64;
    let mut cxx = 0.0f64;
    let mut cxy = 0.0f64;

    for (x, y) in pts {
        if (y - (a0 * x + c0)).abs() > thr {
            continue;
        }
        n_in += 1;
        let n = n_in as f64;
        let dx = x - mean_x;
        let new_mean_x = mean_x + dx / n;
        let new_mean_y = mean_y + (y - mean_y) / n;
        cxx += dx * (x - new_mean_x);
        cxy += dx * (y - new_mean_y);
        mean_x = new_mean_x;
        mean_y = new_mean_y;
    }

    if n_in < 2 || n_in == pts.len() || !cxx.is_finite() || cxx == 0.0 {
        return None;
    }
    let a = cxy / cxx;
    if !a.is_finite() || a == 0.0 {
        return None;
    }
    Some((a, mean_y - a * mean_x))
}

impl TryFrom<Vec<ModelRow>> for MotorModel {
    type Error = eyre::Report;
    fn try_from(rows: Vec<ModelRow>) -> Result<Self, Self::Error> {
        Self::from_rows(rows)
    }
}

pub fn load_motor_model_csv(path: &std::path::Path) -> eyre::Result<MotorModel> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open motor model CSV {:?}: {}", path, e))?;

    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["duty_percent", "rps"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "motor model CSV must have headers 'duty_percent,rps', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<ModelRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => eyre::bail!("invalid CSV row {}: {}", idx + 2, e),
        }
    }

    MotorModel::try_from(rows)
}

fn unit(x: f32) -> bool {
    x > 0.0 && x <= 1.0
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Pins
        if self.pins.pwm_forward > 1 || self.pins.pwm_reverse > 1 {
            eyre::bail!("pins.pwm_forward and pins.pwm_reverse must be 0 or 1");
        }
        if self.pins.pwm_forward == self.pins.pwm_reverse {
            eyre::bail!("pins.pwm_forward and pins.pwm_reverse must differ");
        }
        if self.pins.encoder_a == self.pins.encoder_b {
            eyre::bail!("pins.encoder_a and pins.encoder_b must differ");
        }

        // Encoder
        if self.encoder.counts_per_rev == 0 {
            eyre::bail!("encoder.counts_per_rev must be > 0");
        }
        if self.encoder.min_pulses_per_tick == 0 {
            eyre::bail!("encoder.min_pulses_per_tick must be >= 1");
        }
        if !(self.encoder.deadband_counts >= 0.0) {
            eyre::bail!("encoder.deadband_counts must be >= 0");
        }
        if !unit(self.encoder.speed_filter_alpha) {
            eyre::bail!("encoder.speed_filter_alpha must be in (0.0, 1.0]");
        }

        // Ramp
        if !(self.ramp.max_accel_rps2 > 0.0) {
            eyre::bail!("ramp.max_accel_rps2 must be > 0");
        }
        if !(self.ramp.max_decel_rps2 > 0.0) {
            eyre::bail!("ramp.max_decel_rps2 must be > 0");
        }

        // Control
        if !(5..=100).contains(&self.control.tick_ms) {
            eyre::bail!("control.tick_ms must be in [5, 100]");
        }
        if !(0.0..=65_535.0).contains(&self.control.min_duty) {
            eyre::bail!("control.min_duty must be in [0, 65535]");
        }
        if !unit(self.control.output_filter_alpha) {
            eyre::bail!("control.output_filter_alpha must be in (0.0, 1.0]");
        }
        if !(self.control.integral_limit > 0.0 && self.control.integral_limit <= 65_535.0) {
            eyre::bail!("control.integral_limit must be in (0, 65535]");
        }
        if let Some(x) = self.control.stiction_min_rps
            && !(x >= 0.0)
        {
            eyre::bail!("control.stiction_min_rps must be >= 0");
        }
        if self.control.mode > 3 {
            eyre::bail!("control.mode must be in [0, 3]");
        }
        if let Some(rows) = &self.control.gains {
            if rows.len() != 4 {
                eyre::bail!("control.gains must have exactly 4 rows (modes 0..=3)");
            }
            if rows
                .iter()
                .any(|g| !(g.kp >= 0.0 && g.ki >= 0.0 && g.kff >= 0.0))
            {
                eyre::bail!("control.gains entries must be finite and >= 0");
            }
        }
        if !(self.control.irq_gain_scale > 0.0 && self.control.irq_gain_scale.is_finite()) {
            eyre::bail!("control.irq_gain_scale must be > 0");
        }

        // Stall
        if self.stall.max_time_ms == 0 {
            eyre::bail!("stall.max_time_ms must be >= 1");
        }
        if self.stall.pause_ms > 60_000 {
            eyre::bail!("stall.pause_ms is unreasonably large (>60s)");
        }

        // Output
        if !unit(self.output.max_duty_fraction) {
            eyre::bail!("output.max_duty_fraction must be in (0.0, 1.0]");
        }
        if !(self.output.pwm_frequency_hz > 0.0) {
            eyre::bail!("output.pwm_frequency_hz must be > 0");
        }

        // Limits
        if !(self.limits.max_rps > 0.0 && self.limits.max_rps.is_finite()) {
            eyre::bail!("limits.max_rps must be > 0");
        }
        if !(self.limits.min_target_rps >= 0.0 && self.limits.min_target_rps < self.limits.max_rps) {
            eyre::bail!("limits.min_target_rps must be in [0, max_rps)");
        }
        if !unit(self.limits.speed_limit_factor) {
            eyre::bail!("limits.speed_limit_factor must be in (0.0, 1.0]");
        }

        // Gearbox
        if !(self.gearbox.low_ratio > 0.0 && self.gearbox.low_ratio.is_finite()) {
            eyre::bail!("gearbox.low_ratio must be > 0");
        }
        if !(self.gearbox.high_ratio > 0.0 && self.gearbox.high_ratio.is_finite()) {
            eyre::bail!("gearbox.high_ratio must be > 0");
        }
        if !(self.gearbox.wheel_diameter_mm > 0.0 && self.gearbox.wheel_diameter_mm.is_finite()) {
            eyre::bail!("gearbox.wheel_diameter_mm must be > 0");
        }

        // AEB
        if self.aeb.enabled {
            if !(self.aeb.safety_margin_mm >= 0.0) {
                eyre::bail!("aeb.safety_margin_mm must be >= 0");
            }
            if !(self.aeb.drivetrain_backlash_mm >= 0.0) {
                eyre::bail!("aeb.drivetrain_backlash_mm must be >= 0");
            }
            if !(self.aeb.max_decel_rps2 > 0.0 && self.aeb.max_decel_rps2.is_finite()) {
                eyre::bail!("aeb.max_decel_rps2 must be > 0");
            }
            if self.aeb.sample_hz == 0 {
                eyre::bail!("aeb.sample_hz must be > 0");
            }
            if self.aeb.read_timeout_ms == 0 {
                eyre::bail!("aeb.read_timeout_ms must be >= 1");
            }
        }

        // Motor model
        if let Some(m) = &self.motor_model {
            if !(m.a > 0.0 && m.a.is_finite()) {
                eyre::bail!("motor_model.a must be > 0");
            }
            if !m.b.is_finite() {
                eyre::bail!("motor_model.b must be finite");
            }
        }

        // Sim
        if self.sim.time_constant_ms == 0 {
            eyre::bail!("sim.time_constant_ms must be >= 1");
        }

        Ok(())
    }
}
