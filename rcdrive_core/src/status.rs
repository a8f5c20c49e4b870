//! Outcome of a single control tick.

/// Public status of one invocation of `Motor::tick`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStatus {
    /// Control computed and applied.
    Running,
    /// Nothing demanded and nothing driven.
    Idle,
    /// Stall detected on this tick; output forced to zero, pause armed.
    StallDetected,
    /// Inside a stall pause; output held at zero. `remaining_ticks` paused
    /// ticks follow this one before normal control resumes.
    StallPaused { remaining_ticks: u32 },
}

impl TickStatus {
    /// True when this tick drove the output to zero for stall protection.
    pub fn is_stall(self) -> bool {
        matches!(self, TickStatus::StallDetected | TickStatus::StallPaused { .. })
    }
}
