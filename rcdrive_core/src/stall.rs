//! Stall detection and cooldown.
//!
//! Zero measured speed under non-zero demand for longer than `max_time`
//! trips the monitor. The tick that trips forces zero output; the next
//! `pause_ticks` ticks are held at zero as well, after which control resumes.

use std::time::Duration;

use crate::util::ticks_covering;

#[derive(Debug, Clone)]
pub struct StallMonitor {
    max_time: Duration,
    pause_ticks: u32,
    timer: Duration,
    pause_remaining: u32,
    trips: u64,
}

impl StallMonitor {
    pub fn new(max_time: Duration, pause: Duration, nominal_tick: Duration) -> Self {
        Self {
            max_time,
            pause_ticks: ticks_covering(pause, nominal_tick),
            timer: Duration::ZERO,
            pause_remaining: 0,
            trips: 0,
        }
    }

    /// Consume one paused tick if a pause is active.
    ///
    /// Returns the number of paused ticks still to come after this one, or
    /// `None` when control should run normally.
    pub fn consume_pause(&mut self) -> Option<u32> {
        if self.pause_remaining == 0 {
            return None;
        }
        self.pause_remaining -= 1;
        Some(self.pause_remaining)
    }

    /// Accumulate stall time for this tick. Returns `true` when the monitor trips,
    /// in which case a pause has been armed.
    pub fn observe(&mut self, measured_rps: f32, filtered_target_rps: f32, dt: Duration) -> bool {
        if measured_rps != 0.0 || filtered_target_rps == 0.0 {
            self.timer = Duration::ZERO;
            return false;
        }
        self.timer = self.timer.saturating_add(dt);
        if self.timer > self.max_time {
            self.timer = Duration::ZERO;
            self.pause_remaining = self.pause_ticks;
            self.trips += 1;
            return true;
        }
        false
    }

    pub fn is_paused(&self) -> bool {
        self.pause_remaining > 0
    }

    pub fn pause_remaining(&self) -> u32 {
        self.pause_remaining
    }

    pub fn pause_ticks(&self) -> u32 {
        self.pause_ticks
    }

    /// Time spent stalled so far.
    pub fn timer(&self) -> Duration {
        self.timer
    }

    /// Number of trips since construction.
    pub fn trips(&self) -> u64 {
        self.trips
    }
}
