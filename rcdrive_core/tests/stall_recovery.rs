//! Stall trip, pause and resume against a shaft that never turns.

use std::sync::Arc;
use std::time::Duration;

use rcdrive_core::mocks::RecordingDrive;
use rcdrive_core::{EncoderCounter, MotorConfig, StallCfg, TickStatus, build_motor};
use rcdrive_traits::DutyPair;

const TICK: Duration = Duration::from_millis(20);

#[test]
fn stalled_shaft_trips_pauses_and_resumes() {
    let drive = RecordingDrive::new();
    let cfg = MotorConfig {
        stall: StallCfg {
            max_time: Duration::from_millis(500),
            pause: Duration::from_millis(1000),
        },
        ..MotorConfig::default()
    };
    let mut motor = build_motor(drive.clone(), Arc::new(EncoderCounter::new()), cfg, None)
        .expect("valid config");
    motor.set_speed_rps(100.0).unwrap();

    // 25 × 20 ms = 500 ms is not yet "longer than" max_time
    for i in 1..=25 {
        let st = motor.tick(TICK).unwrap();
        assert_eq!(st, TickStatus::Running, "tick {i}");
    }
    assert_eq!(motor.tick(TICK).unwrap(), TickStatus::StallDetected);
    assert_eq!(drive.last(), Some(DutyPair::ZERO));
    assert_eq!(motor.integral_term(), 0.0);
    assert!(motor.is_stall_paused());

    let frozen = motor.filtered_target_rps();
    let writes_before = drive.writes().len();
    for remaining in (0..50).rev() {
        assert_eq!(
            motor.tick(TICK).unwrap(),
            TickStatus::StallPaused {
                remaining_ticks: remaining
            }
        );
        assert_eq!(motor.filtered_target_rps(), frozen);
    }
    let paused_writes = &drive.writes()[writes_before..];
    assert_eq!(paused_writes.len(), 50);
    assert!(paused_writes.iter().all(|d| d.is_zero()));
    assert!(!motor.is_stall_paused());

    // control resumes; the stall timer starts over
    assert_eq!(motor.tick(TICK).unwrap(), TickStatus::Running);
    assert!(!drive.last().unwrap().is_zero());
    assert_eq!(motor.telemetry().stall_trips, 1);
}

#[test]
fn zero_target_never_trips() {
    let drive = RecordingDrive::new();
    let mut motor = build_motor(
        drive,
        Arc::new(EncoderCounter::new()),
        MotorConfig::default(),
        None,
    )
    .expect("valid config");
    for _ in 0..200 {
        assert_eq!(motor.tick(TICK).unwrap(), TickStatus::Idle);
    }
    assert_eq!(motor.telemetry().stall_trips, 0);
}
