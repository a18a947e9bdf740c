//! `From` implementations bridging `shade_config` types to `shade_core` types.

use crate::config::{MotorCfg, SupervisorCfg, Timeouts, TravelCfg};
use crate::position::CalibrationData;

// ── MotorCfg ─────────────────────────────────────────────────────────────────

impl From<&shade_config::MotorCfg> for MotorCfg {
    fn from(c: &shade_config::MotorCfg) -> Self {
        Self {
            half_step: c.half_step,
            default_speed: c.default_speed,
            calibration_speed: c.calibration_speed,
            min_step_delay_us: c.min_step_delay_us,
            max_step_delay_us: c.max_step_delay_us,
            disable_on_stop: c.disable_on_stop,
            steps_per_revolution: c.steps_per_revolution,
        }
    }
}

// ── TravelCfg ────────────────────────────────────────────────────────────────

impl From<&shade_config::TravelCfg> for TravelCfg {
    fn from(c: &shade_config::TravelCfg) -> Self {
        Self {
            nominal_steps: c.nominal_steps,
        }
    }
}

// ── SupervisorCfg ────────────────────────────────────────────────────────────

impl From<&shade_config::SupervisorCfg> for SupervisorCfg {
    fn from(c: &shade_config::SupervisorCfg) -> Self {
        Self {
            poll_ms: c.poll_ms,
            watchdog_ms: c.watchdog_ms,
            fault_debounce_n: c.fault_debounce_n,
        }
    }
}

// ── Timeouts ─────────────────────────────────────────────────────────────────

impl From<&shade_config::SensorCfg> for Timeouts {
    fn from(c: &shade_config::SensorCfg) -> Self {
        Self {
            sensor_ms: c.read_timeout_ms,
        }
    }
}

// ── Calibration ──────────────────────────────────────────────────────────────

impl From<shade_config::PersistedCalibration> for CalibrationData {
    fn from(p: shade_config::PersistedCalibration) -> Self {
        Self {
            min_position: p.min_position,
            max_position: p.max_position,
            zebra_offset: p.zebra_offset,
        }
    }
}

impl From<CalibrationData> for shade_config::PersistedCalibration {
    fn from(d: CalibrationData) -> Self {
        Self {
            min_position: d.min_position,
            max_position: d.max_position,
            zebra_offset: d.zebra_offset,
        }
    }
}
