//! End-to-end behaviour of one motor, ticked by hand on a manual clock.

use std::sync::Arc;
use std::time::Duration;

use rcdrive_core::encoder::quadrature;
use rcdrive_core::mocks::RecordingDrive;
use rcdrive_core::{
    AebCfg, ControlMode, DriveError, EncoderCounter, Motor, MotorConfig, TickStatus, build_motor,
};
use rcdrive_traits::{DutyPair, ManualClock};
use rstest::rstest;

const TICK: Duration = Duration::from_millis(20);

struct Rig {
    motor: Motor<RecordingDrive>,
    drive: RecordingDrive,
    clock: ManualClock,
    encoder: Arc<EncoderCounter>,
}

fn rig(cfg: MotorConfig) -> Rig {
    let drive = RecordingDrive::new();
    let clock = ManualClock::new();
    let encoder = Arc::new(EncoderCounter::new());
    let motor = build_motor(
        drive.clone(),
        encoder.clone(),
        cfg,
        Some(Arc::new(clock.clone())),
    )
    .expect("valid config");
    Rig {
        motor,
        drive,
        clock,
        encoder,
    }
}

fn spin(encoder: &EncoderCounter, phase: &mut u8, edges: u32, forward: bool) {
    for _ in 0..edges {
        let (ch, a, b) = quadrature::step(phase, forward);
        encoder.record_edge(ch, a, b);
    }
}

fn with_aeb() -> MotorConfig {
    MotorConfig {
        aeb: Some(AebCfg::default()),
        ..MotorConfig::default()
    }
}

#[test]
fn fresh_motor_is_idle_and_writes_zero() {
    let mut r = rig(MotorConfig::default());
    assert_eq!(r.motor.tick(TICK).unwrap(), TickStatus::Idle);
    assert_eq!(r.drive.last(), Some(DutyPair::ZERO));
}

#[test]
fn step_target_is_slew_limited() {
    let mut r = rig(MotorConfig::default());
    r.motor.set_speed_rps(666.0).unwrap();
    r.motor.tick(TICK).unwrap();
    let first = r.motor.filtered_target_rps();
    assert!(first > 0.0 && first <= 12.0 + 1e-4, "filtered {first}");
    r.motor.tick(TICK).unwrap();
    assert!(r.motor.filtered_target_rps() - first <= 12.0 + 1e-4);
}

#[test]
fn reversal_passes_through_exact_zero() {
    let mut r = rig(MotorConfig::default());
    r.motor.set_speed_rps(100.0).unwrap();
    for _ in 0..10 {
        r.motor.tick(TICK).unwrap();
    }
    assert!((r.motor.filtered_target_rps() - 100.0).abs() < 1e-3);

    r.motor.set_speed_rps(-100.0).unwrap();
    let mut trace = vec![r.motor.filtered_target_rps()];
    for _ in 0..10 {
        r.motor.tick(TICK).unwrap();
        trace.push(r.motor.filtered_target_rps());
    }
    assert!(trace.contains(&0.0), "trace {trace:?}");
    for w in trace.windows(2) {
        assert!(!(w[0] > 0.0 && w[1] < 0.0), "sign flipped in one tick: {w:?}");
    }
    // first ticks decelerate at the decel rate
    assert!((trace[0] - trace[1] - 24.0).abs() < 1e-3);
}

#[test]
fn drive_channels_are_never_both_active() {
    let mut r = rig(MotorConfig::default());
    r.motor.set_speed_rps(300.0).unwrap();
    for _ in 0..15 {
        r.motor.tick(TICK).unwrap();
    }
    r.motor.set_speed_rps(-300.0).unwrap();
    for _ in 0..15 {
        r.motor.tick(TICK).unwrap();
    }
    let writes = r.drive.writes();
    assert!(writes.iter().any(|d| d.forward > 0));
    assert!(writes.iter().any(|d| d.reverse > 0));
    assert!(writes.iter().all(|d| d.forward == 0 || d.reverse == 0));
    assert!(writes.iter().all(|d| d.forward.max(d.reverse) <= 62_258));
}

#[test]
fn percent_setpoint_follows_limit_factor() {
    let mut r = rig(MotorConfig::default());
    r.motor.set_speed_percent(50.0).unwrap();
    assert!((r.motor.requested_rps() - 333.0).abs() < 1e-3);
    r.motor.set_speed_limit_factor(0.5).unwrap();
    assert!((r.motor.max_available_rps() - 333.0).abs() < 1e-3);
    assert!((r.motor.requested_rps() - 166.5).abs() < 1e-3);
}

#[test]
fn rps_setpoint_is_clamped_and_snapped() {
    let mut r = rig(MotorConfig::default());
    r.motor.set_speed_rps(5_000.0).unwrap();
    assert!((r.motor.requested_rps() - 666.0).abs() < 1e-3);
    r.motor.set_speed_rps(-10.0).unwrap();
    assert_eq!(r.motor.requested_rps(), 0.0);
}

#[rstest]
#[case::percent_too_high(|m: &mut Motor<RecordingDrive>| m.set_speed_percent(150.0))]
#[case::percent_nan(|m: &mut Motor<RecordingDrive>| m.set_speed_percent(f32::NAN))]
#[case::speed_infinite(|m: &mut Motor<RecordingDrive>| m.set_speed_rps(f32::INFINITY))]
#[case::factor_zero(|m: &mut Motor<RecordingDrive>| m.set_speed_limit_factor(0.0))]
#[case::factor_above_one(|m: &mut Motor<RecordingDrive>| m.set_speed_limit_factor(1.5))]
#[case::gearing_negative(|m: &mut Motor<RecordingDrive>| m.set_gearing_ratio(-0.01))]
#[case::mode_out_of_range(|m: &mut Motor<RecordingDrive>| m.set_mode(7))]
fn invalid_commands_are_rejected_and_state_kept(
    #[case] cmd: fn(&mut Motor<RecordingDrive>) -> Result<(), DriveError>,
) {
    let mut r = rig(MotorConfig::default());
    r.motor.set_speed_percent(30.0).unwrap();
    let before = (
        r.motor.requested_rps(),
        r.motor.speed_limit_factor(),
        r.motor.gearing_ratio(),
        r.motor.mode(),
    );
    let err = cmd(&mut r.motor).expect_err("command must be rejected");
    assert!(err.is_rejected_input());
    let after = (
        r.motor.requested_rps(),
        r.motor.speed_limit_factor(),
        r.motor.gearing_ratio(),
        r.motor.mode(),
    );
    assert_eq!(before, after);
}

#[test]
fn invalid_mode_reports_the_number() {
    let mut r = rig(MotorConfig::default());
    assert_eq!(r.motor.set_mode(9), Err(DriveError::InvalidMode(9)));
}

#[test]
fn mode_switch_clears_integral_on_the_same_tick() {
    let mut r = rig(MotorConfig::default());
    assert_eq!(r.motor.mode(), ControlMode::FeedForwardPi);
    r.motor.set_speed_rps(100.0).unwrap();
    for _ in 0..10 {
        r.motor.tick(TICK).unwrap();
    }
    // no encoder edges: the error stays positive and the integral grows
    assert!(r.motor.integral_term() > 0.0);

    r.motor.set_mode(0).unwrap();
    assert_eq!(r.motor.integral_term(), 0.0);
    r.motor.tick(TICK).unwrap();
    assert_eq!(r.motor.mode(), ControlMode::FeedForward);
    assert_eq!(r.motor.integral_term(), 0.0);
}

#[test]
fn reselecting_active_mode_keeps_integral() {
    let mut r = rig(MotorConfig::default());
    r.motor.set_speed_rps(100.0).unwrap();
    for _ in 0..10 {
        r.motor.tick(TICK).unwrap();
    }
    let i = r.motor.integral_term();
    r.motor.set_mode(2).unwrap();
    assert_eq!(r.motor.integral_term(), i);
}

#[test]
fn aeb_close_obstacle_forces_zero_target() {
    let mut r = rig(with_aeb());
    r.motor.set_speed_rps(300.0).unwrap();
    // 150 margin + 30 backlash leave nothing to brake in
    r.motor.set_distance_mm(Some(180));
    r.motor.tick(TICK).unwrap();
    assert_eq!(r.motor.aeb_ceiling_rps(), 0.0);
    assert_eq!(r.motor.target_rps(), 0.0);
    assert_eq!(r.drive.last(), Some(DutyPair::ZERO));
}

#[test]
fn aeb_far_obstacle_caps_at_max_rps() {
    let mut r = rig(with_aeb());
    r.motor.set_speed_rps(300.0).unwrap();
    r.motor.set_distance_mm(Some(2000));
    r.motor.tick(TICK).unwrap();
    assert!((r.motor.aeb_ceiling_rps() - 666.0).abs() < 1e-3);
    assert!((r.motor.target_rps() - 300.0).abs() < 1e-3);
}

#[test]
fn aeb_mid_range_clamps_target() {
    let mut r = rig(with_aeb());
    r.motor.set_speed_rps(300.0).unwrap();
    r.motor.set_distance_mm(Some(300));
    r.motor.tick(TICK).unwrap();
    let ceiling = r.motor.aeb_ceiling_rps();
    // sqrt(2 · 120 mm · 1200 / (0.0125 · π · 82))
    assert!((ceiling - 299.06).abs() < 0.1, "ceiling {ceiling}");
    assert!((r.motor.target_rps() - ceiling).abs() < 1e-4);
}

#[test]
fn aeb_reverse_target_keeps_sign() {
    let mut r = rig(with_aeb());
    r.motor.set_speed_rps(-300.0).unwrap();
    r.motor.set_distance_mm(Some(300));
    r.motor.tick(TICK).unwrap();
    assert!(r.motor.target_rps() < 0.0);
    assert!((r.motor.target_rps().abs() - r.motor.aeb_ceiling_rps()).abs() < 1e-4);
}

#[test]
fn aeb_disarmed_or_stale_is_bypassed() {
    let mut r = rig(with_aeb());
    r.motor.set_speed_rps(300.0).unwrap();
    r.motor.set_distance_mm(Some(180));
    r.motor.set_aeb_armed(false);
    r.motor.tick(TICK).unwrap();
    assert!((r.motor.aeb_ceiling_rps() - 666.0).abs() < 1e-3);

    r.motor.set_aeb_armed(true);
    r.motor.tick(TICK).unwrap();
    assert_eq!(r.motor.aeb_ceiling_rps(), 0.0);

    r.clock.advance(Duration::from_millis(250));
    r.motor.tick(TICK).unwrap();
    assert!((r.motor.aeb_ceiling_rps() - 666.0).abs() < 1e-3);
}

#[test]
fn aeb_no_target_means_no_limit() {
    let mut r = rig(with_aeb());
    r.motor.set_speed_rps(300.0).unwrap();
    r.motor.set_distance_mm(None);
    r.motor.tick(TICK).unwrap();
    assert!((r.motor.aeb_ceiling_rps() - 666.0).abs() < 1e-3);
}

#[test]
fn stop_zeroes_output_and_motion_state() {
    let mut r = rig(MotorConfig::default());
    r.motor.set_speed_rps(300.0).unwrap();
    for _ in 0..10 {
        r.motor.tick(TICK).unwrap();
    }
    assert!(!r.drive.last().unwrap().is_zero());
    r.motor.stop().unwrap();
    assert_eq!(r.drive.last(), Some(DutyPair::ZERO));
    assert_eq!(r.motor.filtered_target_rps(), 0.0);
    assert_eq!(r.motor.requested_rps(), 0.0);
    assert_eq!(r.motor.integral_term(), 0.0);
}

#[test]
fn tick_now_uses_motor_clock() {
    let mut r = rig(MotorConfig::default());
    r.motor.set_speed_rps(600.0).unwrap();
    r.motor.tick_now().unwrap();
    assert!((r.motor.filtered_target_rps() - 12.0).abs() < 1e-3);
    // a long gap is capped at two nominal periods
    r.clock.advance(Duration::from_secs(1));
    r.motor.tick_now().unwrap();
    assert!((r.motor.filtered_target_rps() - 36.0).abs() < 1e-3);
}

#[test]
fn late_tick_measures_speed_over_the_real_gap() {
    let mut r = rig(MotorConfig::default());
    let mut phase = 0;
    // 12 counts per rev: 24 edges in 20 ms is 100 rps
    spin(&r.encoder, &mut phase, 24, true);
    r.motor.tick(TICK).unwrap();
    assert!((r.motor.measured_rps() - 100.0).abs() < 1.0);

    // same shaft speed across a 100 ms scheduling gap
    spin(&r.encoder, &mut phase, 120, true);
    r.motor.tick(Duration::from_millis(100)).unwrap();
    let measured = r.motor.measured_rps();
    assert!((measured - 100.0).abs() < 1.0, "measured {measured}");
}

#[test]
fn late_tick_still_caps_the_ramp_step() {
    let mut r = rig(MotorConfig::default());
    r.motor.set_speed_rps(600.0).unwrap();
    r.motor.tick(Duration::from_millis(100)).unwrap();
    // 600 rps/s over at most 40 ms
    assert!((r.motor.filtered_target_rps() - 24.0).abs() < 1e-3);
}
