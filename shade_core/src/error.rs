use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShadeError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("shade is not calibrated")]
    NotCalibrated,
    #[error("busy: {0}")]
    Busy(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("over-travel: step would leave the calibrated range")]
    OverTravel,
    #[error("controller runtime disconnected")]
    Disconnected,
}

impl ShadeError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        ShadeError::InvalidArgument(msg.into())
    }

    pub(crate) fn busy(msg: impl Into<String>) -> Self {
        ShadeError::Busy(msg.into())
    }
}

/// Why the controller latched into emergency stop.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Fault {
    #[error("motor driver fault input asserted")]
    MotorFault,
    #[error("no step progress within the watchdog window")]
    WatchdogTimeout,
    #[error("hardware fault during motion: {0}")]
    Hardware(String),
    #[error("emergency stop requested")]
    Requested,
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing coil driver")]
    MissingCoils,
    #[error("missing position sensor")]
    MissingSensor,
    #[error("missing step timer")]
    MissingTimer,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = std::result::Result<T, ShadeError>;
pub use eyre::Report;
