use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("pwm error: {0}")]
    Pwm(String),
    #[error("hardware timeout")]
    Timeout,
    #[error("device disconnected")]
    Disconnected,
}

pub type Result<T> = std::result::Result<T, HwError>;
