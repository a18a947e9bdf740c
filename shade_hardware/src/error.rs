use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("i2c error: {0}")]
    I2c(String),
    #[error("position sensor timeout")]
    Timeout,
    #[error("conversion-ready timeout")]
    DataReadyTimeout,
    #[error("coil driver fault: {0}")]
    DriverFault(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
