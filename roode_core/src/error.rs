use roode_traits::Role;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoodeError {
    #[error("{role} sensor failed to initialize: {reason}")]
    SensorInit { role: Role, reason: String },
    #[error(
        "{role} sensor calibration failed: {valid} of {taken} samples valid, {required} required"
    )]
    CalibrationFailed {
        role: Role,
        valid: usize,
        taken: usize,
        required: usize,
    },
    #[error("not enough valid samples: {valid} of {taken}, {required} required")]
    InsufficientSamples {
        valid: usize,
        taken: usize,
        required: usize,
    },
    #[error("{0} sensor timed out")]
    SensorTimeout(Role),
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("timeout waiting for sensor")]
    Timeout,
    #[error("configuration error: {0}")]
    Config(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("missing room range sensor")]
    MissingRoomSensor,
    #[error("missing corridor range sensor")]
    MissingCorridorSensor,
    #[error("missing motion input")]
    MissingMotion,
    #[error("missing transmitter")]
    MissingTransmitter,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
