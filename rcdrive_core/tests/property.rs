use proptest::prelude::*;
use rcdrive_core::aeb::{AebLimiter, clamp_to_ceiling};
use rcdrive_core::encoder::quadrature;
use rcdrive_core::{AebCfg, DriveMapper, EncoderCounter, TargetRamp};

fn limiter() -> AebLimiter {
    AebLimiter::new(&AebCfg::default(), 82.0, 666.0)
}

proptest! {
    #[test]
    fn encoder_total_is_net_steps(steps in proptest::collection::vec(any::<bool>(), 0..400)) {
        let enc = EncoderCounter::new();
        let mut phase = 0u8;
        let mut last = 0i32;
        let mut summed = 0i32;
        for (i, fwd) in steps.iter().enumerate() {
            let (ch, a, b) = quadrature::step(&mut phase, *fwd);
            enc.record_edge(ch, a, b);
            prop_assert_eq!(enc.direction(), if *fwd { 1 } else { -1 });
            if i % 7 == 0 {
                summed += enc.read_and_diff(&mut last);
            }
        }
        summed += enc.read_and_diff(&mut last);
        let net = steps.iter().map(|f| if *f { 1 } else { -1 }).sum::<i32>();
        prop_assert_eq!(enc.total(), net);
        prop_assert_eq!(summed, net);
    }

    #[test]
    fn ramp_step_bounded_by_rates(
        targets in proptest::collection::vec(-700.0f32..700.0, 1..100),
        dt in 0.005f32..0.05,
    ) {
        let mut ramp = TargetRamp::new(600.0, 1200.0);
        let mut prev = ramp.filtered();
        for t in targets {
            let next = ramp.advance(t, dt);
            prop_assert!((next - prev).abs() <= 1200.0 * dt + 1e-3);
            // never overshoots the target, never jumps across zero
            prop_assert!(!(prev > 0.0 && next < 0.0) && !(prev < 0.0 && next > 0.0));
            if prev * t >= 0.0 {
                prop_assert!((next - t).abs() <= (prev - t).abs() + 1e-3);
            }
            prev = next;
        }
    }

    #[test]
    fn aeb_ceiling_monotone_in_distance(
        d1 in 0.0f32..5000.0,
        extra in 0.0f32..5000.0,
        gearing in 0.005f32..0.05,
    ) {
        let l = limiter();
        let near = l.max_safe_speed_rps(d1, gearing);
        let far = l.max_safe_speed_rps(d1 + extra, gearing);
        prop_assert!((0.0..=666.0).contains(&near));
        prop_assert!((0.0..=666.0).contains(&far));
        prop_assert!(near <= far + 1e-3);
    }

    #[test]
    fn clamp_keeps_sign_and_bound(req in -1000.0f32..1000.0, ceil in 0.0f32..700.0) {
        let out = clamp_to_ceiling(req, ceil);
        prop_assert!(out.abs() <= ceil + 1e-6);
        prop_assert!(out == 0.0 || out.signum() == req.signum());
        prop_assert!(out.abs() <= req.abs() + 1e-6);
    }

    #[test]
    fn mapper_never_drives_both_channels(signal in -200_000.0f32..200_000.0) {
        let m = DriveMapper::new(0.95);
        let d = m.map(signal);
        prop_assert!(d.forward == 0 || d.reverse == 0);
        prop_assert!(d.forward <= m.ceiling() && d.reverse <= m.ceiling());
        if signal > 0.5 {
            prop_assert_eq!(d.reverse, 0);
        }
        if signal < -0.5 {
            prop_assert_eq!(d.forward, 0);
        }
    }
}

#[test]
fn aeb_reference_distances() {
    let cfg = AebCfg {
        safety_margin_mm: 500.0,
        ..AebCfg::default()
    };
    let l = AebLimiter::new(&cfg, 82.0, 700.0);
    assert_eq!(l.stopping_distance_mm(500.0), 0.0);
    assert_eq!(l.max_safe_speed_rps(500.0, 0.0125), 0.0);
    assert!((l.stopping_distance_mm(2000.0) - 1470.0).abs() < 1e-3);
    assert!((l.max_safe_speed_rps(2000.0, 0.0125) - 700.0).abs() < 1e-3);
}
