use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("i2c error: {0}")]
    I2c(String),
    #[error("range sensor timeout")]
    Timeout,
    #[error("range sensor data-ready timeout")]
    DataReadyTimeout,
    #[error("no range sensor at 0x{address:02x} (model id 0x{model_id:02x})")]
    NotResponding { address: u8, model_id: u8 },
    #[error("timing budget of {0} us does not fit the ranging sequence")]
    TimingBudget(u32),
    #[error("bus address 0x{0:02x} already claimed")]
    AddressConflict(u8),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
