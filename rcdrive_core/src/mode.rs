//! Control modes and their gain tables.

use crate::error::DriveError;

/// Which terms of the controller are active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[repr(u8)]
pub enum ControlMode {
    /// Feed-forward only.
    FeedForward = 0,
    /// Feed-forward + proportional.
    FeedForwardP = 1,
    /// Feed-forward + proportional + integral.
    #[default]
    FeedForwardPi = 2,
    /// Proportional + integral, no feed-forward.
    Pi = 3,
}

impl ControlMode {
    pub const ALL: [ControlMode; 4] = [
        ControlMode::FeedForward,
        ControlMode::FeedForwardP,
        ControlMode::FeedForwardPi,
        ControlMode::Pi,
    ];

    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    #[inline]
    fn index(self) -> usize {
        self as usize
    }

    /// Zero the terms this mode does not use.
    #[inline]
    pub fn mask(self, g: GainSet) -> GainSet {
        match self {
            ControlMode::FeedForward => GainSet { kp: 0.0, ki: 0.0, ..g },
            ControlMode::FeedForwardP => GainSet { ki: 0.0, ..g },
            ControlMode::FeedForwardPi => g,
            ControlMode::Pi => GainSet { kff: 0.0, ..g },
        }
    }
}

impl TryFrom<u8> for ControlMode {
    type Error = DriveError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(ControlMode::FeedForward),
            1 => Ok(ControlMode::FeedForwardP),
            2 => Ok(ControlMode::FeedForwardPi),
            3 => Ok(ControlMode::Pi),
            other => Err(DriveError::InvalidMode(other)),
        }
    }
}

impl core::fmt::Display for ControlMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            ControlMode::FeedForward => "ff",
            ControlMode::FeedForwardP => "ff+p",
            ControlMode::FeedForwardPi => "ff+pi",
            ControlMode::Pi => "pi",
        };
        f.write_str(s)
    }
}

/// Controller gains. `kff` is a percentage applied to the model duty.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GainSet {
    pub kp: f32,
    pub ki: f32,
    pub kff: f32,
}

impl GainSet {
    pub const fn new(kp: f32, ki: f32, kff: f32) -> Self {
        Self { kp, ki, kff }
    }

    /// Same set with `kp`/`ki` multiplied by `factor`; `kff` unchanged.
    pub fn rescaled(self, factor: f32) -> Self {
        Self {
            kp: self.kp * factor,
            ki: self.ki * factor,
            kff: self.kff,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.kp.is_finite() && self.ki.is_finite() && self.kff.is_finite()
    }
}

/// Where the control tick executes. Interrupt-driven ticks run with
/// rescaled `kp`/`ki` (the `kp2`/`ki2` set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TickContext {
    #[default]
    Task,
    Interrupt,
}

const TASK_GAINS: [GainSet; 4] = [
    GainSet::new(0.0, 0.0, 85.0),
    GainSet::new(130.0, 0.0, 85.0),
    GainSet::new(130.0, 600.0, 85.0),
    GainSet::new(250.0, 1100.0, 0.0),
];

const IRQ_GAINS: [GainSet; 4] = [
    GainSet::new(0.0, 0.0, 85.0),
    GainSet::new(104.0, 0.0, 85.0),
    GainSet::new(104.0, 480.0, 85.0),
    GainSet::new(200.0, 880.0, 0.0),
];

/// Gain lookup per mode and tick context. Immutable once the motor is built.
#[derive(Debug, Clone, PartialEq)]
pub struct GainTable {
    task: [GainSet; 4],
    interrupt: [GainSet; 4],
}

impl Default for GainTable {
    fn default() -> Self {
        Self {
            task: TASK_GAINS,
            interrupt: IRQ_GAINS,
        }
    }
}

impl GainTable {
    pub fn new(task: [GainSet; 4], interrupt: [GainSet; 4]) -> Self {
        Self { task, interrupt }
    }

    /// Build a table whose interrupt set is the task set rescaled by `irq_factor`.
    pub fn from_task(task: [GainSet; 4], irq_factor: f32) -> Self {
        Self {
            task,
            interrupt: task.map(|g| g.rescaled(irq_factor)),
        }
    }

    /// Gains for `mode` in `ctx`, with unused terms masked to zero.
    pub fn gains(&self, mode: ControlMode, ctx: TickContext) -> GainSet {
        let raw = match ctx {
            TickContext::Task => self.task[mode.index()],
            TickContext::Interrupt => self.interrupt[mode.index()],
        };
        mode.mask(raw)
    }

    pub fn is_valid(&self) -> bool {
        self.task
            .iter()
            .chain(self.interrupt.iter())
            .all(|g| g.is_finite() && g.kp >= 0.0 && g.ki >= 0.0 && g.kff >= 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, ControlMode::FeedForward)]
    #[case(1, ControlMode::FeedForwardP)]
    #[case(2, ControlMode::FeedForwardPi)]
    #[case(3, ControlMode::Pi)]
    fn modes_decode(#[case] raw: u8, #[case] mode: ControlMode) {
        assert_eq!(ControlMode::try_from(raw).ok(), Some(mode));
        assert_eq!(mode.as_u8(), raw);
    }

    #[rstest]
    #[case(4)]
    #[case(200)]
    fn out_of_range_modes_rejected(#[case] raw: u8) {
        assert_eq!(ControlMode::try_from(raw), Err(DriveError::InvalidMode(raw)));
    }

    #[test]
    fn masking_enforces_mode_terms() {
        let t = GainTable::from_task([GainSet::new(1.0, 2.0, 3.0); 4], 0.5);
        let g = t.gains(ControlMode::FeedForward, TickContext::Task);
        assert_eq!(g, GainSet::new(0.0, 0.0, 3.0));
        let g = t.gains(ControlMode::Pi, TickContext::Interrupt);
        assert_eq!(g, GainSet::new(0.5, 1.0, 0.0));
    }

    #[test]
    fn default_mode_is_full_pi_with_ff() {
        let t = GainTable::default();
        let g = t.gains(ControlMode::default(), TickContext::Task);
        assert!(g.kp > 0.0 && g.ki > 0.0 && g.kff > 0.0);
        assert!(t.is_valid());
    }
}
