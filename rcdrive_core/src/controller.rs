//! Feed-forward + PI velocity controller.
//!
//! One `update` per tick turns the filtered target and the measured speed into
//! a signed drive signal in 16-bit duty units:
//!
//! 1. error with a one-count deadband
//! 2. proportional term
//! 3. integral term with anti-windup clamp
//! 4. feed-forward from the empirical motor model, scaled by `kff`
//! 5. signed stiction bias
//! 6. sum, single-pole low-pass against the previous output, clamp
//! 7. zero output when the target is too slow to measure

use crate::config::{ControlCfg, EncoderCfg, MotorModel, StictionPolicy};
use crate::fixed_point::{DUTY_FULL_SCALE, clamp_signal, percent_to_duty};
use crate::mode::{ControlMode, GainSet, GainTable, TickContext};

/// Values derived once from the encoder and control configuration.
#[derive(Debug, Clone)]
pub struct ControllerParams {
    pub counts_per_rev: f32,
    /// Slowest target the encoder can resolve within one tick.
    pub min_countable_rps: f32,
    /// Full deadband width in rps; errors within half of it are ignored.
    pub deadband_rps: f32,
    pub speed_filter_alpha: f32,
    pub min_duty: f32,
    pub stiction_threshold_rps: f32,
    pub output_filter_alpha: f32,
    pub integral_limit: f32,
    pub model: MotorModel,
}

impl ControllerParams {
    pub fn derive(encoder: &EncoderCfg, control: &ControlCfg, model: MotorModel) -> Self {
        let cpr = encoder.counts_per_rev.max(1) as f32;
        let dt = control.tick.as_secs_f32();
        let min_countable_rps = encoder.min_pulses_per_tick as f32 / cpr / dt;
        let deadband_rps = encoder.deadband_counts / (cpr * dt);
        let stiction_threshold_rps = match control.stiction {
            StictionPolicy::AboveCountable => min_countable_rps,
            StictionPolicy::AboveRps(x) => x,
        };
        Self {
            counts_per_rev: cpr,
            min_countable_rps,
            deadband_rps,
            speed_filter_alpha: encoder.speed_filter_alpha,
            min_duty: control.min_duty,
            stiction_threshold_rps,
            output_filter_alpha: control.output_filter_alpha,
            integral_limit: control.integral_limit.min(DUTY_FULL_SCALE),
            model,
        }
    }
}

/// Breakdown of the last computed output.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControlTerms {
    pub error: f32,
    pub p: f32,
    pub i: f32,
    pub ff: f32,
    pub bias: f32,
    pub output: f32,
}

pub struct VelocityController {
    params: ControllerParams,
    table: GainTable,
    context: TickContext,
    mode: ControlMode,
    gains: GainSet,
    integral: f32,
    last_output: f32,
    current_rps: f32,
    raw_rps: f32,
    terms: ControlTerms,
}

impl core::fmt::Debug for VelocityController {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("VelocityController")
            .field("mode", &self.mode)
            .field("current_rps", &self.current_rps)
            .field("integral", &self.integral)
            .field("last_output", &self.last_output)
            .finish()
    }
}

impl VelocityController {
    pub fn new(
        params: ControllerParams,
        table: GainTable,
        context: TickContext,
        mode: ControlMode,
    ) -> Self {
        let gains = table.gains(mode, context);
        Self {
            params,
            table,
            context,
            mode,
            gains,
            integral: 0.0,
            last_output: 0.0,
            current_rps: 0.0,
            raw_rps: 0.0,
            terms: ControlTerms::default(),
        }
    }

    /// Fold a tick's encoder delta into the measured speed. Returns the
    /// unsmoothed speed for this tick.
    pub fn measure(&mut self, delta_counts: i32, dt_s: f32) -> f32 {
        let raw = if dt_s > 0.0 {
            delta_counts as f32 / self.params.counts_per_rev / dt_s
        } else {
            0.0
        };
        let a = self.params.speed_filter_alpha;
        self.raw_rps = raw;
        self.current_rps = a * raw + (1.0 - a) * self.current_rps;
        raw
    }

    /// Compute this tick's drive signal for `filtered_target_rps`.
    pub fn update(&mut self, filtered_target_rps: f32, dt_s: f32) -> f32 {
        let p = &self.params;
        let mut error = filtered_target_rps - self.current_rps;
        if error.abs() < p.deadband_rps / 2.0 {
            error = 0.0;
        }

        if filtered_target_rps.abs() < p.min_countable_rps {
            // unmeasurable regime: no control, no integration
            self.integral = 0.0;
            self.last_output = 0.0;
            self.terms = ControlTerms {
                error,
                ..ControlTerms::default()
            };
            return 0.0;
        }

        let p_term = error * self.gains.kp;
        let lim = p.integral_limit;
        self.integral = (self.integral + error * dt_s * self.gains.ki).clamp(-lim, lim);
        let ff = self.feed_forward(filtered_target_rps);
        let bias = self.stiction_bias(filtered_target_rps);

        let sum = bias + ff + p_term + self.integral;
        let a = p.output_filter_alpha;
        let output = clamp_signal(a * sum + (1.0 - a) * self.last_output);
        self.last_output = output;
        self.terms = ControlTerms {
            error,
            p: p_term,
            i: self.integral,
            ff,
            bias,
            output,
        };
        output
    }

    /// Model duty needed to hold `rps`, scaled by `kff` percent and clamped.
    pub fn feed_forward(&self, rps: f32) -> f32 {
        if rps == 0.0 || self.gains.kff == 0.0 {
            return 0.0;
        }
        let duty = percent_to_duty(self.params.model.duty_percent_for(rps)) * self.gains.kff / 100.0;
        clamp_signal(duty.copysign(rps))
    }

    /// Signed minimum duty for targets above the stiction threshold.
    pub fn stiction_bias(&self, rps: f32) -> f32 {
        if rps == 0.0 || rps.abs() < self.params.stiction_threshold_rps {
            return 0.0;
        }
        self.params.min_duty.copysign(rps)
    }

    /// Swap gains for `mode` and clear the integral.
    pub fn set_mode(&mut self, mode: ControlMode) {
        self.mode = mode;
        self.gains = self.table.gains(mode, self.context);
        self.integral = 0.0;
    }

    /// Drop integral and output memory after a stall trip.
    pub fn clear_after_stall(&mut self) {
        self.integral = 0.0;
        self.last_output = 0.0;
        self.terms = ControlTerms::default();
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    pub fn gains(&self) -> GainSet {
        self.gains
    }

    pub fn params(&self) -> &ControllerParams {
        &self.params
    }

    pub fn current_rps(&self) -> f32 {
        self.current_rps
    }

    pub fn raw_rps(&self) -> f32 {
        self.raw_rps
    }

    pub fn integral_term(&self) -> f32 {
        self.integral
    }

    pub fn last_output(&self) -> f32 {
        self.last_output
    }

    pub fn terms(&self) -> ControlTerms {
        self.terms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn controller(mode: ControlMode, output_alpha: f32) -> VelocityController {
        let control = ControlCfg {
            output_filter_alpha: output_alpha,
            ..ControlCfg::default()
        };
        let params = ControllerParams::derive(&EncoderCfg::default(), &control, MotorModel::default());
        VelocityController::new(params, GainTable::default(), TickContext::Task, mode)
    }

    #[test]
    fn derived_thresholds_match_encoder_geometry() {
        let c = controller(ControlMode::default(), 1.0);
        // 3 pulses / 12 cpr / 0.02 s
        assert!((c.params().min_countable_rps - 12.5).abs() < 1e-3);
        // one count per tick
        assert!((c.params().deadband_rps - 4.1667).abs() < 1e-3);
    }

    #[test]
    fn measure_converts_counts_to_rps() {
        let mut c = controller(ControlMode::default(), 1.0);
        let raw = c.measure(24, 0.02);
        assert!((raw - 100.0).abs() < 1e-3);
        assert!((c.current_rps() - 100.0).abs() < 1e-3);
        let raw = c.measure(-12, 0.02);
        assert!((raw + 50.0).abs() < 1e-3);
    }

    #[test]
    fn within_deadband_output_is_ff_plus_bias() {
        let mut c = controller(ControlMode::FeedForwardPi, 1.0);
        c.measure(24, 0.02); // 100 rps
        let out = c.update(101.0, 0.02);
        let expected = c.feed_forward(101.0) + c.stiction_bias(101.0);
        assert!((out - expected).abs() < 1e-2);
        assert_eq!(c.integral_term(), 0.0);
        assert_eq!(c.terms().p, 0.0);
    }

    #[test]
    fn below_countable_forces_zero_and_clears_memory() {
        let mut c = controller(ControlMode::FeedForwardPi, 0.7);
        c.update(200.0, 0.02);
        assert!(c.last_output() > 0.0);
        assert_eq!(c.update(10.0, 0.02), 0.0);
        assert_eq!(c.last_output(), 0.0);
        assert_eq!(c.integral_term(), 0.0);
    }

    #[test]
    fn reverse_targets_produce_negative_signal() {
        let mut c = controller(ControlMode::FeedForwardPi, 1.0);
        let out = c.update(-150.0, 0.02);
        assert!(out < 0.0);
        assert!(c.terms().bias < 0.0 && c.terms().ff < 0.0);
    }

    #[test]
    fn pi_mode_has_no_feed_forward() {
        let c = controller(ControlMode::Pi, 1.0);
        assert_eq!(c.feed_forward(300.0), 0.0);
        assert_eq!(c.stiction_bias(300.0), 3000.0);
    }

    #[test]
    fn feed_forward_follows_model() {
        let c = controller(ControlMode::FeedForward, 1.0);
        // (300 + 10) / 7.1 % of full scale, times 0.85
        let expected = (310.0 / 7.1) / 100.0 * 65_535.0 * 0.85;
        assert!((c.feed_forward(300.0) - expected).abs() < 1.0);
        assert!((c.feed_forward(-300.0) + expected).abs() < 1.0);
        assert!(c.feed_forward(10_000.0) <= DUTY_FULL_SCALE);
    }

    #[test]
    fn negative_model_offset_cannot_flip_feed_forward() {
        let params = ControllerParams::derive(
            &EncoderCfg::default(),
            &ControlCfg::default(),
            MotorModel { a: 7.1, b: -50.0 },
        );
        let c = VelocityController::new(
            params,
            GainTable::default(),
            TickContext::Task,
            ControlMode::FeedForward,
        );
        assert_eq!(c.feed_forward(20.0), 0.0);
        assert_eq!(c.feed_forward(-20.0), 0.0);
        assert!(c.feed_forward(200.0) > 0.0);
        assert!(c.feed_forward(-200.0) < 0.0);
    }

    #[test]
    fn custom_stiction_threshold_is_honoured() {
        let control = ControlCfg {
            stiction: StictionPolicy::AboveRps(40.0),
            ..ControlCfg::default()
        };
        let params = ControllerParams::derive(&EncoderCfg::default(), &control, MotorModel::default());
        let c = VelocityController::new(params, GainTable::default(), TickContext::Task, ControlMode::default());
        assert_eq!(c.stiction_bias(30.0), 0.0);
        assert_eq!(c.stiction_bias(-40.0), -3000.0);
    }

    #[test]
    fn mode_switch_clears_integral_immediately() {
        let mut c = controller(ControlMode::FeedForwardPi, 1.0);
        for _ in 0..10 {
            c.update(300.0, 0.02);
        }
        assert!(c.integral_term() > 0.0);
        c.set_mode(ControlMode::FeedForward);
        assert_eq!(c.integral_term(), 0.0);
        c.update(300.0, 0.02);
        assert_eq!(c.integral_term(), 0.0);
    }

    proptest! {
        #[test]
        fn integral_and_output_stay_bounded(
            target in prop::sample::select(vec![-666.0f32, -300.0, 50.0, 300.0, 666.0]),
            ticks in 1usize..600,
            dt in 0.001f32..0.04,
        ) {
            let mut c = controller(ControlMode::Pi, 0.7);
            for _ in 0..ticks {
                // motor never moves: maximal constant error
                c.measure(0, dt);
                let out = c.update(target, dt);
                prop_assert!(c.integral_term().abs() <= 65_535.0);
                prop_assert!(out.abs() <= 65_535.0);
            }
        }
    }
}
