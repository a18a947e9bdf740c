//! Runtime configuration for the motion core.
//!
//! Separate from the TOML schema in `shade_config`; see `conversions` for the
//! mapping.

/// Pulse timing and sequencing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotorCfg {
    /// 8-pattern half stepping when true, 4-pattern wave drive otherwise.
    pub half_step: bool,
    /// Travel speed (1..=100).
    pub default_speed: u8,
    /// Speed for calibration jogs (1..=100).
    pub calibration_speed: u8,
    /// Per-step delay at speed 100.
    pub min_step_delay_us: u32,
    /// Per-step delay at speed 1.
    pub max_step_delay_us: u32,
    /// Release the driver enable line whenever the engine stops.
    pub disable_on_stop: bool,
    pub steps_per_revolution: u32,
}

impl Default for MotorCfg {
    fn default() -> Self {
        Self {
            half_step: true,
            default_speed: 50,
            calibration_speed: 20,
            min_step_delay_us: 800,
            max_step_delay_us: 5000,
            disable_on_stop: true,
            steps_per_revolution: 4096,
        }
    }
}

/// Travel limits used before calibration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TravelCfg {
    /// Maximum steps of a single MoveUp/MoveDown on an uncalibrated shade.
    pub nominal_steps: u32,
}

impl Default for TravelCfg {
    fn default() -> Self {
        Self {
            nominal_steps: 20_000,
        }
    }
}

/// Supervisory loop pacing and safety thresholds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorCfg {
    pub poll_ms: u64,
    /// Emergency stop when a job makes no step progress for this long.
    pub watchdog_ms: u64,
    /// Consecutive asserted polls of the fault input before latching.
    pub fault_debounce_n: u8,
}

impl Default for SupervisorCfg {
    fn default() -> Self {
        Self {
            poll_ms: 100,
            watchdog_ms: 1_000,
            fault_debounce_n: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    /// Position sensor read timeout.
    pub sensor_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { sensor_ms: 50 }
    }
}
