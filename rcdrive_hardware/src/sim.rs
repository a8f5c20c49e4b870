//! Simulated drivetrain and range sensor.
//!
//! The plant is a first-order lag toward the empirical steady-state speed
//! `a × duty% − b`. Each `set_duty` integrates the previous duty over the time
//! elapsed on the plant's clock, so the motor sees its own output one tick
//! later, as it would on the car. Encoder edges are produced as a quadrature
//! sequence into any `PulseSink`.

use std::f32::consts::PI;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rcdrive_traits::{Clock, DriveOutput, DutyPair, EncoderChannel, HwResult, PulseSink, RangeSensor};

use crate::error::HwError;

const FULL_SCALE: f32 = 65_535.0;
/// Integration step for the plant.
const STEP: Duration = Duration::from_millis(1);
/// Longer gaps are treated as the plant being paused.
const MAX_GAP: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct PlantParams {
    /// rps per duty percent.
    pub a: f32,
    /// rps lost to friction.
    pub b: f32,
    pub time_constant: Duration,
    pub counts_per_rev: u32,
    pub gearing_ratio: f32,
    pub wheel_diameter_mm: f32,
}

impl Default for PlantParams {
    fn default() -> Self {
        Self {
            a: 7.1,
            b: 10.0,
            time_constant: Duration::from_millis(80),
            counts_per_rev: 12,
            gearing_ratio: 0.0125,
            wheel_diameter_mm: 82.0,
        }
    }
}

#[derive(Debug)]
struct PlantState {
    rps: f32,
    carry: f32,
    phase: u8,
    travelled_mm: f64,
    jammed: bool,
    disconnected: bool,
    duty: DutyPair,
    last_update: Option<Instant>,
    edges: u64,
}

/// Levels (a, b) per phase in forward order 00, 01, 11, 10.
fn levels(phase: u8) -> (bool, bool) {
    match phase & 3 {
        0 => (false, false),
        1 => (false, true),
        2 => (true, true),
        _ => (true, false),
    }
}

fn edge(phase: &mut u8, forward: bool) -> (EncoderChannel, bool, bool) {
    let from = *phase & 3;
    let to = if forward { (from + 1) & 3 } else { (from + 3) & 3 };
    *phase = to;
    let channel = match (from.min(to), from.max(to)) {
        (0, 1) | (2, 3) => EncoderChannel::B,
        _ => EncoderChannel::A,
    };
    let (a, b) = levels(to);
    (channel, a, b)
}

/// Simulated motor, gearbox and wheel. Clones share one plant.
#[derive(Clone)]
pub struct SimulatedDrivetrain {
    params: PlantParams,
    state: Arc<Mutex<PlantState>>,
    sink: Arc<dyn PulseSink>,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl std::fmt::Debug for SimulatedDrivetrain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedDrivetrain")
            .field("params", &self.params)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl SimulatedDrivetrain {
    pub fn new(
        params: PlantParams,
        sink: Arc<dyn PulseSink>,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            params,
            state: Arc::new(Mutex::new(PlantState {
                rps: 0.0,
                carry: 0.0,
                phase: 0,
                travelled_mm: 0.0,
                jammed: false,
                disconnected: false,
                duty: DutyPair::ZERO,
                last_update: None,
                edges: 0,
            })),
            sink,
            clock,
        }
    }

    fn steady_rps(&self, duty: DutyPair) -> f32 {
        let signed = f32::from(duty.forward) - f32::from(duty.reverse);
        let pct = signed.abs() / FULL_SCALE * 100.0;
        (self.params.a * pct - self.params.b).max(0.0).copysign(signed)
    }

    fn mm_per_rev(&self) -> f32 {
        self.params.gearing_ratio * PI * self.params.wheel_diameter_mm
    }

    /// Integrate the held duty up to the plant clock's present.
    fn catch_up(&self, st: &mut PlantState) {
        let now = self.clock.now();
        let elapsed = match st.last_update {
            Some(prev) => now.saturating_duration_since(prev).min(MAX_GAP),
            None => Duration::ZERO,
        };
        st.last_update = Some(now);

        let steady = if st.jammed { 0.0 } else { self.steady_rps(st.duty) };
        let tau = self.params.time_constant.as_secs_f32().max(1e-4);
        let cpr = self.params.counts_per_rev as f32;
        let mm_per_rev = self.mm_per_rev();

        let mut left = elapsed;
        while !left.is_zero() {
            let step = left.min(STEP);
            left -= step;
            let h = step.as_secs_f32();
            if st.jammed {
                st.rps = 0.0;
                continue;
            }
            st.rps += (steady - st.rps) * (h / (tau + h));
            st.travelled_mm += f64::from(st.rps * mm_per_rev * h);
            st.carry += st.rps * cpr * h;
            while st.carry.abs() >= 1.0 {
                let forward = st.carry > 0.0;
                let (ch, a, b) = edge(&mut st.phase, forward);
                self.sink.on_edge(ch, a, b);
                st.carry -= if forward { 1.0 } else { -1.0 };
                st.edges += 1;
            }
        }
    }

    /// Hold the shaft still, e.g. to exercise the stall monitor.
    pub fn set_jammed(&self, jammed: bool) {
        if let Ok(mut st) = self.state.lock() {
            self.catch_up(&mut st);
            if jammed && !st.jammed {
                tracing::info!("simulated shaft jammed");
            }
            st.jammed = jammed;
            if jammed {
                st.rps = 0.0;
                st.carry = 0.0;
            }
        }
    }

    /// Make every subsequent write fail as if the bridge had gone away.
    pub fn set_disconnected(&self, disconnected: bool) {
        if let Ok(mut st) = self.state.lock() {
            st.disconnected = disconnected;
        }
    }

    /// Current shaft speed, rps.
    pub fn rps(&self) -> f32 {
        self.state.lock().map(|s| s.rps).unwrap_or(0.0)
    }

    /// Signed distance covered by the wheel since start, mm.
    pub fn travelled_mm(&self) -> f64 {
        self.state.lock().map(|s| s.travelled_mm).unwrap_or(0.0)
    }

    /// Encoder edges emitted so far.
    pub fn edges(&self) -> u64 {
        self.state.lock().map(|s| s.edges).unwrap_or(0)
    }

    pub fn duty(&self) -> DutyPair {
        self.state.lock().map(|s| s.duty).unwrap_or_default()
    }

    /// Range sensor looking at an obstacle `obstacle_mm` ahead of the start position.
    pub fn range_sensor(&self, obstacle_mm: u32) -> SimulatedRangeSensor {
        SimulatedRangeSensor {
            plant: self.clone(),
            obstacle_mm: f64::from(obstacle_mm),
            max_range_mm: 4000,
        }
    }
}

impl DriveOutput for SimulatedDrivetrain {
    fn set_duty(&mut self, duty: DutyPair) -> HwResult<()> {
        let mut st = self
            .state
            .lock()
            .map_err(|_| HwError::Gpio("plant state poisoned".into()))?;
        if st.disconnected {
            return Err(Box::new(HwError::Disconnected));
        }
        if duty.forward != 0 && duty.reverse != 0 {
            return Err(Box::new(HwError::Pwm(format!(
                "both channels driven ({}, {})",
                duty.forward, duty.reverse
            ))));
        }
        self.catch_up(&mut st);
        st.duty = duty;
        Ok(())
    }
}

/// Distance to a fixed obstacle, shrinking as the simulated wheel advances.
#[derive(Debug, Clone)]
pub struct SimulatedRangeSensor {
    plant: SimulatedDrivetrain,
    obstacle_mm: f64,
    max_range_mm: u16,
}

impl SimulatedRangeSensor {
    /// Readings beyond this report "no target".
    pub fn with_max_range(mut self, max_range_mm: u16) -> Self {
        self.max_range_mm = max_range_mm;
        self
    }
}

impl RangeSensor for SimulatedRangeSensor {
    fn read_mm(&mut self, _timeout: Duration) -> HwResult<Option<u16>> {
        let gap = (self.obstacle_mm - self.plant.travelled_mm()).max(0.0);
        if gap > f64::from(self.max_range_mm) {
            return Ok(None);
        }
        // gap is within [0, max_range_mm] here
        Ok(Some(gap.round() as u16))
    }
}
