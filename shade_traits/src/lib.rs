//! Hardware seams shared by the shade workspace.
//!
//! The core only talks to coils, the position sensor and the step timer
//! through these traits. Errors cross the boundary as boxed trait objects and
//! are mapped to typed errors by `shade_core`.
pub mod clock;
pub mod coil;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use coil::{CoilPattern, StepMode};

use std::time::Duration;

/// Boxed error used at every hardware boundary.
pub type HwResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Four-phase coil driver (ULN2003-style unipolar stepper).
pub trait CoilDriver {
    /// Drive the four coil outputs with `pattern`.
    fn energize(&mut self, pattern: CoilPattern) -> HwResult<()>;
    /// Switch the driver enable line; drivers without one return `Ok(())`.
    fn set_enabled(&mut self, enabled: bool) -> HwResult<()>;
}

/// Absolute position signal (potentiometer, encoder, ADC...) in step units.
pub trait PositionSensor {
    fn read(&mut self, timeout: Duration) -> HwResult<u32>;
}

/// Periodic source of step ticks.
///
/// `arm` replaces any previous period; implementations must never keep two
/// periodic sources alive at once.
pub trait StepTimer {
    fn arm(&mut self, period: Duration) -> HwResult<()>;
    fn cancel(&mut self) -> HwResult<()>;
}

impl<T: CoilDriver + ?Sized> CoilDriver for Box<T> {
    fn energize(&mut self, pattern: CoilPattern) -> HwResult<()> {
        (**self).energize(pattern)
    }
    fn set_enabled(&mut self, enabled: bool) -> HwResult<()> {
        (**self).set_enabled(enabled)
    }
}

impl<T: PositionSensor + ?Sized> PositionSensor for Box<T> {
    fn read(&mut self, timeout: Duration) -> HwResult<u32> {
        (**self).read(timeout)
    }
}

impl<T: StepTimer + ?Sized> StepTimer for Box<T> {
    fn arm(&mut self, period: Duration) -> HwResult<()> {
        (**self).arm(period)
    }
    fn cancel(&mut self) -> HwResult<()> {
        (**self).cancel()
    }
}
