//! Latest-value mailbox between the control-input context and the control tick.
//!
//! One writer (the task decoding remote input) and one reader (the tick).
//! Only the most recent value of each field matters, so every field is a
//! plain atomic and there is no queue. A generation counter lets the tick
//! skip work when nothing changed.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering};

use crate::error::DriveError;
use crate::mode::ControlMode;

const NO_DISTANCE: u32 = u32::MAX;

#[derive(Debug)]
pub struct ControlInputs {
    speed_percent: AtomicU32,
    limit_factor: AtomicU32,
    gearing_ratio: AtomicU32,
    distance_mm: AtomicU32,
    mode: AtomicU8,
    aeb_armed: AtomicBool,
    generation: AtomicU64,
    distance_seq: AtomicU64,
}

/// One consistent-enough read of every field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputSnapshot {
    pub speed_percent: f32,
    pub limit_factor: f32,
    pub gearing_ratio: f32,
    pub distance_mm: Option<u32>,
    pub mode: ControlMode,
    pub aeb_armed: bool,
    pub generation: u64,
    /// Bumped on every range write, even when the value repeats.
    pub distance_seq: u64,
}

impl ControlInputs {
    pub fn new(gearing_ratio: f32, aeb_armed: bool) -> Self {
        Self {
            speed_percent: AtomicU32::new(0.0f32.to_bits()),
            limit_factor: AtomicU32::new(1.0f32.to_bits()),
            gearing_ratio: AtomicU32::new(gearing_ratio.to_bits()),
            distance_mm: AtomicU32::new(NO_DISTANCE),
            mode: AtomicU8::new(ControlMode::default().as_u8()),
            aeb_armed: AtomicBool::new(aeb_armed),
            generation: AtomicU64::new(0),
            distance_seq: AtomicU64::new(0),
        }
    }

    #[inline]
    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::Release);
    }

    /// Commanded speed in percent of the available maximum, sign is direction.
    pub fn set_speed_percent(&self, pct: f32) -> Result<(), DriveError> {
        if !(-100.0..=100.0).contains(&pct) {
            return Err(DriveError::InvalidSpeedPercent(pct));
        }
        self.speed_percent.store(pct.to_bits(), Ordering::Relaxed);
        self.bump();
        Ok(())
    }

    pub fn set_limit_factor(&self, f: f32) -> Result<(), DriveError> {
        if !(f > 0.0 && f <= 1.0) {
            return Err(DriveError::InvalidLimitFactor(f));
        }
        self.limit_factor.store(f.to_bits(), Ordering::Relaxed);
        self.bump();
        Ok(())
    }

    pub fn set_gearing_ratio(&self, r: f32) -> Result<(), DriveError> {
        if !(r.is_finite() && r > 0.0) {
            return Err(DriveError::InvalidGearing(r));
        }
        self.gearing_ratio.store(r.to_bits(), Ordering::Relaxed);
        self.bump();
        Ok(())
    }

    pub fn set_mode(&self, raw: u8) -> Result<(), DriveError> {
        let mode = ControlMode::try_from(raw)?;
        self.mode.store(mode.as_u8(), Ordering::Relaxed);
        self.bump();
        Ok(())
    }

    pub fn set_aeb_armed(&self, armed: bool) {
        self.aeb_armed.store(armed, Ordering::Relaxed);
        self.bump();
    }

    /// Latest range reading; `None` when the sensor reported no target.
    pub fn set_distance_mm(&self, d: Option<u32>) {
        let v = d.map_or(NO_DISTANCE, |v| v.min(NO_DISTANCE - 1));
        self.distance_mm.store(v, Ordering::Relaxed);
        self.distance_seq.fetch_add(1, Ordering::Relaxed);
        self.bump();
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> InputSnapshot {
        let generation = self.generation.load(Ordering::Acquire);
        let distance = self.distance_mm.load(Ordering::Relaxed);
        InputSnapshot {
            speed_percent: f32::from_bits(self.speed_percent.load(Ordering::Relaxed)),
            limit_factor: f32::from_bits(self.limit_factor.load(Ordering::Relaxed)),
            gearing_ratio: f32::from_bits(self.gearing_ratio.load(Ordering::Relaxed)),
            distance_mm: (distance != NO_DISTANCE).then_some(distance),
            // stored values were validated on write
            mode: ControlMode::try_from(self.mode.load(Ordering::Relaxed)).unwrap_or_default(),
            aeb_armed: self.aeb_armed.load(Ordering::Relaxed),
            generation,
            distance_seq: self.distance_seq.load(Ordering::Relaxed),
        }
    }
}
