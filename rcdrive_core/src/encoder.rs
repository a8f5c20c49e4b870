//! Quadrature pulse counter shared between edge handlers and the control tick.
//!
//! Edge handlers only ever add ±1 to a signed total and latch the direction.
//! The control tick never resets the total; it reads it once and diffs
//! against its own snapshot, so an edge landing mid-read is never lost.

use std::sync::atomic::{AtomicI8, AtomicI32, Ordering};

use rcdrive_traits::{EncoderChannel, PulseSink};

/// Signed quadrature counter.
#[derive(Debug)]
pub struct EncoderCounter {
    total_count: AtomicI32,
    direction: AtomicI8,
}

impl Default for EncoderCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl EncoderCounter {
    pub const fn new() -> Self {
        Self {
            total_count: AtomicI32::new(0),
            direction: AtomicI8::new(1),
        }
    }

    /// Signed step for an edge on `channel` given both levels sampled at the edge.
    ///
    /// Channel A counts forward when the levels agree; channel B uses the
    /// inverted test so both channels agree on one direction.
    #[inline]
    pub fn step_for(channel: EncoderChannel, level_a: bool, level_b: bool) -> i32 {
        let agree = level_a == level_b;
        let forward = match channel {
            EncoderChannel::A => agree,
            EncoderChannel::B => !agree,
        };
        if forward { 1 } else { -1 }
    }

    /// Record one edge. Constant time, lock-free.
    #[inline]
    pub fn record_edge(&self, channel: EncoderChannel, level_a: bool, level_b: bool) {
        let step = Self::step_for(channel, level_a, level_b);
        self.total_count.fetch_add(step, Ordering::Relaxed);
        // step is ±1, so the narrowing is exact
        self.direction.store(step as i8, Ordering::Relaxed);
    }

    /// Signed pulses since `last_count`, advancing `last_count` to the current total.
    ///
    /// Single atomic load; wraps on i32 overflow so the delta stays correct
    /// across a wrap of the running total.
    #[inline]
    pub fn read_and_diff(&self, last_count: &mut i32) -> i32 {
        let now = self.total_count.load(Ordering::Acquire);
        let delta = now.wrapping_sub(*last_count);
        *last_count = now;
        delta
    }

    /// Signed pulses since the previous call, resetting the total to zero.
    ///
    /// Only valid when a single consumer owns the counter; the motor uses
    /// `read_and_diff` instead.
    #[inline]
    pub fn read_and_reset(&self) -> i32 {
        self.total_count.swap(0, Ordering::AcqRel)
    }

    /// Direction latched at the most recent edge: +1 or -1.
    ///
    /// Independent of the running total: after mixed-direction edges the
    /// total is the net count while this reports only the last edge.
    #[inline]
    pub fn direction(&self) -> i8 {
        self.direction.load(Ordering::Relaxed)
    }

    /// Running signed total.
    #[inline]
    pub fn total(&self) -> i32 {
        self.total_count.load(Ordering::Relaxed)
    }
}

impl PulseSink for EncoderCounter {
    #[inline]
    fn on_edge(&self, channel: EncoderChannel, level_a: bool, level_b: bool) {
        self.record_edge(channel, level_a, level_b);
    }
}

/// Quadrature phase sequence helpers, shared by the simulated plant and tests.
pub mod quadrature {
    use rcdrive_traits::EncoderChannel;

    /// Levels `(a, b)` for phase index 0..4 in forward order: 00, 01, 11, 10.
    #[inline]
    pub fn levels(phase: u8) -> (bool, bool) {
        match phase & 3 {
            0 => (false, false),
            1 => (false, true),
            2 => (true, true),
            _ => (true, false),
        }
    }

    /// Advance `phase` one step and return the edge that produced it.
    ///
    /// Forward steps alternate B, A, B, A; reverse steps walk the same table
    /// backwards.
    #[inline]
    pub fn step(phase: &mut u8, forward: bool) -> (EncoderChannel, bool, bool) {
        let from = *phase & 3;
        let to = if forward { (from + 1) & 3 } else { (from + 3) & 3 };
        *phase = to;
        // B toggles between phases 0-1 and 2-3, A between 1-2 and 3-0
        let channel = match (from.min(to), from.max(to)) {
            (0, 1) | (2, 3) => EncoderChannel::B,
            _ => EncoderChannel::A,
        };
        let (a, b) = levels(to);
        (channel, a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_cycle_counts_up_on_both_channels() {
        let enc = EncoderCounter::new();
        let mut phase = 0u8;
        for _ in 0..8 {
            let (ch, a, b) = quadrature::step(&mut phase, true);
            enc.on_edge(ch, a, b);
        }
        assert_eq!(enc.total(), 8);
        assert_eq!(enc.direction(), 1);
    }

    #[test]
    fn reverse_cycle_counts_down() {
        let enc = EncoderCounter::new();
        let mut phase = 0u8;
        for _ in 0..5 {
            let (ch, a, b) = quadrature::step(&mut phase, false);
            enc.on_edge(ch, a, b);
        }
        assert_eq!(enc.read_and_reset(), -5);
        assert_eq!(enc.direction(), -1);
        assert_eq!(enc.read_and_reset(), 0);
    }

    #[test]
    fn read_and_diff_leaves_total_untouched() {
        let enc = EncoderCounter::new();
        let mut last = 0;
        enc.record_edge(EncoderChannel::A, true, true);
        enc.record_edge(EncoderChannel::B, true, false);
        assert_eq!(enc.read_and_diff(&mut last), 2);
        assert_eq!(enc.read_and_diff(&mut last), 0);
        assert_eq!(enc.total(), 2);
    }

    #[test]
    fn read_and_diff_survives_wrap() {
        let enc = EncoderCounter::new();
        enc.total_count.store(i32::MAX, Ordering::Relaxed);
        let mut last = i32::MAX;
        enc.record_edge(EncoderChannel::A, false, false);
        assert_eq!(enc.read_and_diff(&mut last), 1);
        assert_eq!(last, i32::MIN);
    }

    #[test]
    fn mixed_direction_edges_net_out() {
        let enc = EncoderCounter::new();
        let mut phase = 0u8;
        let mut last = 0;
        for forward in [true, true, true, false] {
            let (ch, a, b) = quadrature::step(&mut phase, forward);
            enc.on_edge(ch, a, b);
        }
        // net displacement, not edge count times latched direction
        assert_eq!(enc.read_and_diff(&mut last), 2);
        assert_eq!(enc.direction(), -1);
        assert_eq!(enc.read_and_reset(), 2);
    }

    #[test]
    fn quadrature_step_wraps_phase() {
        let mut phase = 3u8;
        let (ch, a, b) = quadrature::step(&mut phase, true);
        assert_eq!(phase, 0);
        assert_eq!(ch, EncoderChannel::A);
        assert_eq!((a, b), (false, false));
    }
}
