//! Shade hardware backends.
//!
//! The simulator models the shade mechanics behind one mutex: the coil
//! driver decodes phase changes into ±1 steps and the position sensor reads
//! the resulting position back. Real drivers (GPIO coils, I²C ADC position
//! sensor, fault input) are behind the `hardware` feature.
pub mod error;
pub mod util;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod ads1115;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use shade_traits::{CoilDriver, CoilPattern, HwResult, PositionSensor};
use tracing::trace;

use crate::error::HwError;

const HALF_PHASES: usize = 8;

#[derive(Debug)]
struct Mechanics {
    position: u32,
    hard_stop: u32,
    phase: usize,
    enabled: bool,
    last_pattern: CoilPattern,
    steps_up: u64,
    steps_down: u64,
    coil_failures: u32,
    sensor_failures: u32,
    sensor_bias: i64,
}

impl Mechanics {
    fn apply(&mut self, pattern: CoilPattern) {
        self.last_pattern = pattern;
        let Some(next) = pattern.half_step_phase() else {
            return;
        };
        if !self.enabled {
            self.phase = next;
            return;
        }
        let delta = (next + HALF_PHASES - self.phase) % HALF_PHASES;
        self.phase = next;
        match delta {
            1..=3 => {
                if self.position < self.hard_stop {
                    self.position += 1;
                }
                self.steps_up += 1;
            }
            5..=7 => {
                self.position = self.position.saturating_sub(1);
                self.steps_down += 1;
            }
            // 0: holding; 4: opposite phase, rotor direction undefined
            _ => {}
        }
    }
}

/// Simulated shade: coils and sensor share one mechanical model.
#[derive(Debug, Clone)]
pub struct SimulatedShade {
    inner: Arc<Mutex<Mechanics>>,
}

impl Default for SimulatedShade {
    fn default() -> Self {
        Self::new(0)
    }
}

impl SimulatedShade {
    /// New shade resting at `position`, rotor at phase 0, driver disabled.
    pub fn new(position: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Mechanics {
                position,
                hard_stop: u32::MAX,
                phase: 0,
                enabled: false,
                last_pattern: CoilPattern::OFF,
                steps_up: 0,
                steps_down: 0,
                coil_failures: 0,
                sensor_failures: 0,
                sensor_bias: 0,
            })),
        }
    }

    /// Physical end stop: the shade cannot travel above this position.
    pub fn with_hard_stop(self, hard_stop: u32) -> Self {
        self.lock().hard_stop = hard_stop;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Mechanics> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn coils(&self) -> SimulatedCoils {
        SimulatedCoils {
            inner: self.inner.clone(),
        }
    }

    pub fn sensor(&self) -> SimulatedSensor {
        SimulatedSensor {
            inner: self.inner.clone(),
        }
    }

    pub fn position(&self) -> u32 {
        self.lock().position
    }

    /// Move the shade by hand (operator pulling the cord).
    pub fn set_position(&self, position: u32) {
        let mut m = self.lock();
        m.position = position.min(m.hard_stop);
    }

    pub fn last_pattern(&self) -> CoilPattern {
        self.lock().last_pattern
    }

    pub fn is_enabled(&self) -> bool {
        self.lock().enabled
    }

    /// Total (up, down) steps the rotor has taken.
    pub fn steps_taken(&self) -> (u64, u64) {
        let m = self.lock();
        (m.steps_up, m.steps_down)
    }

    /// Make the next `n` coil writes fail with a driver fault.
    pub fn fail_coil_writes(&self, n: u32) {
        self.lock().coil_failures = n;
    }

    /// Make the next `n` sensor reads time out.
    pub fn fail_sensor_reads(&self, n: u32) {
        self.lock().sensor_failures = n;
    }

    /// Offset between what the sensor reports and the true position.
    pub fn set_sensor_bias(&self, bias: i64) {
        self.lock().sensor_bias = bias;
    }
}

/// Coil driver half of [`SimulatedShade`].
#[derive(Debug, Clone)]
pub struct SimulatedCoils {
    inner: Arc<Mutex<Mechanics>>,
}

impl CoilDriver for SimulatedCoils {
    fn energize(&mut self, pattern: CoilPattern) -> HwResult<()> {
        let mut m = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if m.coil_failures > 0 {
            m.coil_failures -= 1;
            return Err(Box::new(HwError::DriverFault("simulated coil fault".into())));
        }
        m.apply(pattern);
        trace!(?pattern, position = m.position, "sim coils");
        Ok(())
    }

    fn set_enabled(&mut self, enabled: bool) -> HwResult<()> {
        let mut m = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        m.enabled = enabled;
        Ok(())
    }
}

/// Position sensor half of [`SimulatedShade`].
#[derive(Debug, Clone)]
pub struct SimulatedSensor {
    inner: Arc<Mutex<Mechanics>>,
}

impl PositionSensor for SimulatedSensor {
    fn read(&mut self, _timeout: Duration) -> HwResult<u32> {
        let mut m = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if m.sensor_failures > 0 {
            m.sensor_failures -= 1;
            return Err(Box::new(HwError::Timeout));
        }
        let raw = (i64::from(m.position) + m.sensor_bias).clamp(0, i64::from(u32::MAX));
        Ok(raw as u32)
    }
}
