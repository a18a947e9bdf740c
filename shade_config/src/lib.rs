#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and calibration persistence for the shade controller.
//!
//! - `Config` and its sections are deserialized from TOML and validated.
//! - `CalibrationFile` is the persisted `[calibration]` table; it is saved
//!   with an atomic temp-file + rename so a power cut never leaves a torn file.
use std::path::Path;

use eyre::WrapErr;
use serde::{Deserialize, Serialize};

mod atomic;

pub use atomic::write_atomic;

#[derive(Debug, Deserialize)]
pub struct Pins {
    /// Coil driver inputs IN1..IN4 (BCM numbering)
    pub coils: [u8; 4],
    /// Optional driver enable line
    pub enable: Option<u8>,
    /// Optional driver fault / end-stop input
    pub fault_in: Option<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MotorCfg {
    /// 8-pattern half stepping when true, 4-pattern wave drive otherwise
    pub half_step: bool,
    /// Travel speed, 1..=100
    pub default_speed: u8,
    /// Speed used for calibration jogs, 1..=100
    pub calibration_speed: u8,
    /// Per-step delay at speed 100 (µs)
    pub min_step_delay_us: u32,
    /// Per-step delay at speed 1 (µs)
    pub max_step_delay_us: u32,
    /// Drop the driver enable line when idle
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

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TravelCfg {
    /// Upper bound on a single MoveUp/MoveDown before the shade is calibrated
    pub nominal_steps: u32,
}

impl Default for TravelCfg {
    fn default() -> Self {
        Self {
            nominal_steps: 20_000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SensorCfg {
    /// I²C bus number of the position ADC
    pub i2c_bus: u8,
    /// 7-bit ADC address
    pub i2c_address: u16,
    /// Step count represented by a full-scale ADC reading
    pub full_scale_steps: u32,
    /// Max time to wait for a conversion before failing
    pub read_timeout_ms: u64,
}

impl Default for SensorCfg {
    fn default() -> Self {
        Self {
            i2c_bus: 1,
            i2c_address: 0x48,
            full_scale_steps: 40_000,
            read_timeout_ms: 50,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SupervisorCfg {
    /// Supervisory loop period (ms)
    pub poll_ms: u64,
    /// Emergency stop when a running job makes no step progress for this long (ms)
    pub watchdog_ms: u64,
    /// Consecutive asserted polls required to latch a driver fault
    pub fault_debounce_n: u8,
    /// Treat low level on `pins.fault_in` as asserted
    pub fault_active_low: bool,
}

impl Default for SupervisorCfg {
    fn default() -> Self {
        Self {
            poll_ms: 100,
            watchdog_ms: 1_000,
            fault_debounce_n: 2,
            fault_active_low: true,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

/// Committed calibration bounds in step units.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct PersistedCalibration {
    pub min_position: u32,
    pub max_position: u32,
    /// Index-mark correction folded into the bounds (rarely non-zero)
    #[serde(default)]
    pub zebra_offset: i64,
}

impl PersistedCalibration {
    pub fn validate(&self) -> eyre::Result<()> {
        if self.min_position >= self.max_position {
            eyre::bail!(
                "calibration.min_position ({}) must be < calibration.max_position ({})",
                self.min_position,
                self.max_position
            );
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub pins: Pins,
    #[serde(default)]
    pub motor: MotorCfg,
    #[serde(default)]
    pub travel: TravelCfg,
    #[serde(default)]
    pub sensor: SensorCfg,
    #[serde(default)]
    pub supervisor: SupervisorCfg,
    #[serde(default)]
    pub logging: Logging,
    /// Optional inline calibration; a separate calibration file wins when present.
    #[serde(default)]
    pub calibration: Option<PersistedCalibration>,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

fn check_speed(name: &str, speed: u8) -> eyre::Result<()> {
    if !(1..=100).contains(&speed) {
        eyre::bail!("{name} must be in 1..=100, got {speed}");
    }
    Ok(())
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Pins
        let mut seen = self.pins.coils.to_vec();
        seen.extend(self.pins.enable);
        seen.extend(self.pins.fault_in);
        seen.sort_unstable();
        if seen.windows(2).any(|w| w[0] == w[1]) {
            eyre::bail!("pins must be distinct");
        }

        // Motor
        check_speed("motor.default_speed", self.motor.default_speed)?;
        check_speed("motor.calibration_speed", self.motor.calibration_speed)?;
        if self.motor.min_step_delay_us == 0 {
            eyre::bail!("motor.min_step_delay_us must be >= 1");
        }
        if self.motor.min_step_delay_us >= self.motor.max_step_delay_us {
            eyre::bail!("motor.min_step_delay_us must be < motor.max_step_delay_us");
        }
        if self.motor.max_step_delay_us > 1_000_000 {
            eyre::bail!("motor.max_step_delay_us is unreasonably large (>1s)");
        }
        if self.motor.steps_per_revolution == 0 {
            eyre::bail!("motor.steps_per_revolution must be > 0");
        }

        // Travel
        if self.travel.nominal_steps == 0 {
            eyre::bail!("travel.nominal_steps must be > 0");
        }

        // Sensor
        if self.sensor.full_scale_steps == 0 {
            eyre::bail!("sensor.full_scale_steps must be > 0");
        }
        if self.sensor.read_timeout_ms == 0 {
            eyre::bail!("sensor.read_timeout_ms must be >= 1");
        }
        if self.sensor.i2c_address > 0x7F {
            eyre::bail!("sensor.i2c_address must be a 7-bit address");
        }

        // Supervisor
        if self.supervisor.poll_ms == 0 {
            eyre::bail!("supervisor.poll_ms must be >= 1");
        }
        if self.supervisor.watchdog_ms <= self.supervisor.poll_ms {
            eyre::bail!("supervisor.watchdog_ms must be > supervisor.poll_ms");
        }
        // a healthy job at speed 1 steps once per max_step_delay_us
        if self.supervisor.watchdog_ms.saturating_mul(1000)
            <= 2 * u64::from(self.motor.max_step_delay_us)
        {
            eyre::bail!("supervisor.watchdog_ms must be > 2 x motor.max_step_delay_us");
        }
        if self.supervisor.fault_debounce_n == 0 {
            eyre::bail!("supervisor.fault_debounce_n must be >= 1");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly, got {rot:?}");
        }

        if let Some(cal) = &self.calibration {
            cal.validate()?;
        }

        Ok(())
    }
}

/// On-disk calibration file: a single `[calibration]` table.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationFile {
    pub calibration: PersistedCalibration,
}

/// Load and validate a calibration file. A missing file is `Ok(None)`:
/// the shade simply starts uncalibrated.
pub fn load_calibration(path: &Path) -> eyre::Result<Option<PersistedCalibration>> {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).wrap_err_with(|| format!("read calibration {}", path.display())),
    };
    let file: CalibrationFile = toml::from_str(&text)
        .wrap_err_with(|| format!("parse calibration {}", path.display()))?;
    file.calibration.validate()?;
    Ok(Some(file.calibration))
}

/// Persist committed calibration atomically.
pub fn save_calibration(path: &Path, cal: PersistedCalibration) -> eyre::Result<()> {
    cal.validate()?;
    let text = toml::to_string(&CalibrationFile { calibration: cal })
        .wrap_err("serialize calibration")?;
    write_atomic(path, text.as_bytes())
        .wrap_err_with(|| format!("write calibration {}", path.display()))
}
