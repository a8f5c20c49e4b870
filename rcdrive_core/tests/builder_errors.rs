use std::sync::Arc;

use rcdrive_core::mocks::RecordingDrive;
use rcdrive_core::{
    BuildError, ControlCfg, DynMotor, EncoderCfg, EncoderCounter, LimitsCfg, MotorBuilder,
    OutputCfg, RampCfg, Set, StictionPolicy,
};
use rstest::rstest;

type Ready = MotorBuilder<Set, Set>;

fn build_error_of(r: eyre::Result<DynMotor>) -> BuildError {
    let e = r.expect_err("should fail");
    e.downcast_ref::<BuildError>()
        .cloned()
        .unwrap_or_else(|| panic!("not a BuildError: {e:?}"))
}

#[test]
fn missing_drive_is_reported() {
    let r = DynMotor::builder()
        .with_encoder(Arc::new(EncoderCounter::new()))
        .try_build();
    assert!(matches!(build_error_of(r), BuildError::MissingDrive));
}

#[test]
fn missing_encoder_is_reported() {
    let r = DynMotor::builder().with_drive(RecordingDrive::new()).try_build();
    assert!(matches!(build_error_of(r), BuildError::MissingEncoder));
}

#[test]
fn complete_builder_builds() {
    let m = DynMotor::builder()
        .with_drive(RecordingDrive::new())
        .with_encoder(Arc::new(EncoderCounter::new()))
        .with_aeb(rcdrive_core::AebCfg::default())
        .build()
        .expect("defaults are valid");
    assert!(m.has_aeb());
}

#[rstest]
#[case::zero_cpr(
    |b: Ready| b.with_encoder_cfg(EncoderCfg { counts_per_rev: 0, ..EncoderCfg::default() }),
    "counts_per_rev"
)]
#[case::zero_accel(
    |b: Ready| b.with_ramp(RampCfg { max_accel_rps2: 0.0, ..RampCfg::default() }),
    "ramp rates"
)]
#[case::zero_tick(
    |b: Ready| b.with_control(ControlCfg { tick: std::time::Duration::ZERO, ..ControlCfg::default() }),
    "control.tick"
)]
#[case::negative_stiction(
    |b: Ready| b.with_control(ControlCfg { stiction: StictionPolicy::AboveRps(-1.0), ..ControlCfg::default() }),
    "stiction"
)]
#[case::duty_fraction(
    |b: Ready| b.with_output(OutputCfg { max_duty_fraction: 1.5 }),
    "max_duty_fraction"
)]
#[case::limit_factor(
    |b: Ready| b.with_limits(LimitsCfg { speed_limit_factor: 0.0, ..LimitsCfg::default() }),
    "speed_limit_factor"
)]
fn invalid_config_is_rejected(
    #[case] tweak: fn(Ready) -> Ready,
    #[case] needle: &str,
) {
    let b = DynMotor::builder()
        .with_drive(RecordingDrive::new())
        .with_encoder(Arc::new(EncoderCounter::new()));
    match build_error_of(tweak(b).build()) {
        BuildError::InvalidConfig(msg) => assert!(msg.contains(needle), "{msg}"),
        other => panic!("unexpected {other:?}"),
    }
}
