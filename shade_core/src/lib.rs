#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Motion core for a motorized window shade (hardware-agnostic).
//!
//! All hardware interaction goes through the `shade_traits` seams
//! (`CoilDriver`, `PositionSensor`, `StepTimer`).
//!
//! ## Architecture
//!
//! - **Pulse engine**: timed coil sequencing, one step per tick (`pulse`)
//! - **Position estimator**: step counting, bounds, guided calibration (`position`)
//! - **Controller**: state machine and command arbitration (`controller`)
//! - **Safety**: fault-input debounce and step watchdog (`safety`)
//! - **Runtime**: tick thread (`ticker`) and supervisory thread (`supervisor`)
//! - **Status**: snapshots and the latest-value channel (`status`)
//!
//! Positions are step counts (`u32`). Percentages are only defined once the
//! shade is calibrated.

pub mod builder;
pub mod config;
pub mod controller;
pub mod conversions;
pub mod error;
pub mod hw_error;
pub mod mocks;
pub mod position;
pub mod pulse;
pub mod safety;
pub mod status;
pub mod supervisor;
pub mod ticker;
pub mod util;

pub use builder::{Missing, Set, Shade, ShadeBuilder};
pub use config::{MotorCfg, SupervisorCfg, Timeouts, TravelCfg};
pub use controller::{CalibrationSink, Controller, MotionCommand, ShadeCommand};
pub use error::{BuildError, Fault, Result, ShadeError};
pub use position::{
    CalibrationData, CalibrationSession, CalibrationStep, PositionEstimator, PositionState,
    StepOutcome,
};
pub use pulse::{Direction, PulseEngine, PulseJob, StepEvent};
pub use safety::{FaultCheck, SafetyMonitor};
pub use status::{CoverState, ShadeState, ShadeStatus, StatusPublisher, StatusSubscriber, status_channel};
pub use supervisor::{CommandSender, ShadeRuntime, Supervisor};
pub use ticker::{TickTimer, Ticker, tick_channel};
