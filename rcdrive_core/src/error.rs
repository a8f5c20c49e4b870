use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DriveError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("timeout waiting for hardware")]
    Timeout,
    #[error("invalid control mode {0} (expected 0..=3)")]
    InvalidMode(u8),
    #[error("invalid speed percent {0} (expected -100..=100)")]
    InvalidSpeedPercent(f32),
    #[error("invalid speed {0} rps (must be finite)")]
    InvalidSpeed(f32),
    #[error("invalid speed limit factor {0} (expected 0 < f <= 1)")]
    InvalidLimitFactor(f32),
    #[error("invalid gearing ratio {0} (must be finite and > 0)")]
    InvalidGearing(f32),
}

impl DriveError {
    /// True for rejected setpoints and commands; the motor keeps its previous state.
    pub fn is_rejected_input(&self) -> bool {
        matches!(
            self,
            DriveError::InvalidMode(_)
                | DriveError::InvalidSpeedPercent(_)
                | DriveError::InvalidSpeed(_)
                | DriveError::InvalidLimitFactor(_)
                | DriveError::InvalidGearing(_)
        )
    }
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing drive output")]
    MissingDrive,
    #[error("missing encoder")]
    MissingEncoder,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
