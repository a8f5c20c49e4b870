//! Hardware back-ends for the drive controller.
//!
//! Without features this crate only provides the simulated plant used by
//! tests and by `rcdrive drive` off the car. The `hardware` feature adds the
//! Raspberry Pi PWM bridge and quadrature inputs.

pub mod error;
pub mod sim;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod rpi;

pub use sim::{PlantParams, SimulatedDrivetrain, SimulatedRangeSensor};

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub use rpi::{PwmBridge, QuadratureInputs, attach_quadrature};
