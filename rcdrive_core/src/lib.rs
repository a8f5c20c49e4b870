#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Closed-loop DC motor velocity control (hardware-agnostic).
//!
//! All hardware interaction goes through `rcdrive_traits::DriveOutput`,
//! `rcdrive_traits::RangeSensor` and the `PulseSink` edge callback. The
//! control loop is a pure function of encoder counts, elapsed time and the
//! latest commands, so it runs unchanged against simulated plants in tests.
//!
//! ## Pipeline
//!
//! One [`Motor::tick`] performs, in order:
//!
//! - **Measure**: drain the [`EncoderCounter`] and convert counts to rps
//! - **Limit**: resolve the setpoint, then clamp it to the [`AebLimiter`] ceiling
//! - **Ramp**: slew-limit the target ([`TargetRamp`])
//! - **Stall**: trip and pause when demand meets a stopped shaft ([`StallMonitor`])
//! - **Control**: PI + feed-forward in one of four [`ControlMode`]s
//! - **Output**: map the signed signal to a forward/reverse [`DutyPair`]
//!
//! [`runner::run`] drives a motor periodically and always zeroes the output on exit.
//!
//! [`DutyPair`]: rcdrive_traits::DutyPair

pub mod aeb;
pub mod builder;
pub mod config;
pub mod controller;
pub mod conversions;
pub mod encoder;
pub mod error;
pub mod fixed_point;
pub mod hw_error;
pub mod inputs;
pub mod mocks;
pub mod mode;
pub mod motor;
pub mod output;
pub mod ramp;
pub mod runner;
pub mod sampler;
pub mod stall;
pub mod status;
pub mod util;

pub use aeb::AebLimiter;
pub use builder::{BoxedDrive, DynMotor, Missing, MotorBuilder, Set, build_motor};
pub use config::{
    AebCfg, ControlCfg, DrivetrainCfg, EncoderCfg, LimitsCfg, MotorConfig, MotorModel, OutputCfg,
    RampCfg, StallCfg, StictionPolicy,
};
pub use controller::{ControlTerms, ControllerParams, VelocityController};
pub use encoder::EncoderCounter;
pub use error::{BuildError, DriveError, Report, Result};
pub use inputs::{ControlInputs, InputSnapshot};
pub use mode::{ControlMode, GainSet, GainTable, TickContext};
pub use motor::{Motor, Setpoint, Telemetry};
pub use output::DriveMapper;
pub use ramp::TargetRamp;
pub use runner::{RunOptions, RunSummary};
pub use sampler::{RangeReading, RangeSampler};
pub use stall::StallMonitor;
pub use status::TickStatus;
