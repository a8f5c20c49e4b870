pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

/// Boxed error used at every hardware seam.
pub type HwResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Forward/reverse PWM duty pair in 16-bit full scale.
///
/// At most one channel is non-zero when produced by the drive mapper.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DutyPair {
    pub forward: u16,
    pub reverse: u16,
}

impl DutyPair {
    pub const ZERO: DutyPair = DutyPair {
        forward: 0,
        reverse: 0,
    };

    #[inline]
    pub fn is_zero(self) -> bool {
        self.forward == 0 && self.reverse == 0
    }
}

/// Two-channel H-bridge (or equivalent) driven by a duty pair.
pub trait DriveOutput {
    fn set_duty(&mut self, duty: DutyPair) -> HwResult<()>;
}

/// Time-of-flight (or similar) distance sensor.
///
/// `Ok(None)` means the sensor answered but had no valid target in range.
pub trait RangeSensor {
    fn read_mm(&mut self, timeout: std::time::Duration) -> HwResult<Option<u16>>;
}

/// Quadrature input that raised an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderChannel {
    A,
    B,
}

/// Receiver for encoder edges.
///
/// Called from interrupt (or interrupt-like) context with the levels of
/// both channels sampled at the edge. Implementations must not block.
pub trait PulseSink: Send + Sync {
    fn on_edge(&self, channel: EncoderChannel, level_a: bool, level_b: bool);
}

impl<T: DriveOutput + ?Sized> DriveOutput for Box<T> {
    fn set_duty(&mut self, duty: DutyPair) -> HwResult<()> {
        (**self).set_duty(duty)
    }
}

impl<T: RangeSensor + ?Sized> RangeSensor for Box<T> {
    fn read_mm(&mut self, timeout: std::time::Duration) -> HwResult<Option<u16>> {
        (**self).read_mm(timeout)
    }
}
