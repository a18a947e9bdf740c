//! Human-readable error descriptions and structured JSON error formatting.

use shade_core::error::{BuildError, Fault, ShadeError};

use crate::protocol::error_reason;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingCoils => {
                "What happened: No coil driver was provided to the controller.\nLikely causes: GPIO coil pins failed to initialize.\nHow to fix: Check [pins].coils in the config and GPIO permissions.".to_string()
            }
            BuildError::MissingSensor => {
                "What happened: No position sensor was provided to the controller.\nLikely causes: The I2C position ADC failed to initialize.\nHow to fix: Check [sensor] bus/address and the wiring.".to_string()
            }
            BuildError::MissingTimer => {
                "What happened: No step timer was provided to the controller.\nLikely causes: Internal wiring error.\nHow to fix: Re-run with --log-level=debug and report the log.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/shade_config.toml for a sample."
            ),
        };
    }

    if let Some(fault) = err.downcast_ref::<Fault>() {
        return match fault {
            Fault::MotorFault => "What happened: The motor driver fault input tripped an emergency stop.\nLikely causes: Stalled motor, overcurrent, or an end-stop switch.\nHow to fix: Clear the obstruction, then send RESET.".to_string(),
            Fault::WatchdogTimeout => "What happened: The step watchdog tripped an emergency stop.\nLikely causes: Step timer stalled or the process was starved of CPU.\nHow to fix: Check system load (consider --rt), then send RESET.".to_string(),
            Fault::Hardware(msg) => format!(
                "What happened: A hardware fault during motion latched an emergency stop ({msg}).\nLikely causes: Coil driver or GPIO failure.\nHow to fix: Check the driver board and wiring, then send RESET."
            ),
            Fault::Requested => "What happened: Emergency stop was requested.\nHow to fix: Send RESET to resume.".to_string(),
        };
    }

    if let Some(se) = err.downcast_ref::<ShadeError>() {
        return match se {
            ShadeError::NotCalibrated => "What happened: The shade is not calibrated.\nLikely causes: No calibration file, or it was rejected.\nHow to fix: Run `shade calibrate` (or pass --calibration with a saved file).".to_string(),
            ShadeError::Busy(msg) => format!(
                "What happened: The controller is busy ({msg}).\nHow to fix: Finish or STOP the calibration, or RESET after an emergency stop."
            ),
            ShadeError::HardwareFault(msg) if msg.contains("timeout") => {
                "What happened: The position sensor did not answer in time.\nLikely causes: Wrong I2C bus/address, wiring/power issues, or read timeout too low.\nHow to fix: Check [sensor] in the config and raise sensor.read_timeout_ms.".to_string()
            }
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if let Some(te) = err.downcast_ref::<toml::de::Error>() {
        return format!(
            "What happened: A TOML file could not be parsed ({}).\nHow to fix: Fix the syntax or field types; see etc/shade_config.toml. Original: {msg}",
            te.message().trim()
        );
    }

    if lower.contains("read config") || lower.contains("parse config") {
        return format!(
            "What happened: Could not load the configuration.\nHow to fix: Check the --config path and TOML syntax. Original: {msg}"
        );
    }
    if lower.contains("read calibration")
        || lower.contains("parse calibration")
        || lower.contains("calibration.min_position")
    {
        let cause = err.root_cause();
        return format!("Invalid calibration: {msg}: {cause}");
    }
    if lower.contains("invalid configuration") {
        let cause = err.root_cause();
        return format!(
            "What happened: Configuration is invalid ({cause}).\nHow to fix: Edit the TOML config and try again."
        );
    }
    if lower.contains("gpio") || lower.contains("i2c") {
        return format!(
            "What happened: Failed to initialize hardware.\nLikely causes: Incorrect pin numbers, bus or address, or insufficient permissions.\nHow to fix: Fix [pins]/[sensor] in the config. Original: {msg}"
        );
    }

    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes per error kind; anything untyped returns 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<Fault>().is_some() {
        return 2;
    }
    match err.downcast_ref::<ShadeError>() {
        Some(ShadeError::InvalidArgument(_)) => 3,
        Some(ShadeError::NotCalibrated) => 4,
        Some(ShadeError::Busy(_)) => 5,
        Some(ShadeError::HardwareFault(_)) => 6,
        Some(ShadeError::OverTravel) => 7,
        Some(ShadeError::Disconnected) => 8,
        None => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let reason = if let Some(fault) = err.downcast_ref::<Fault>() {
        match fault {
            Fault::MotorFault => "MotorFault",
            Fault::WatchdogTimeout => "WatchdogTimeout",
            Fault::Hardware(_) => "HardwareFault",
            Fault::Requested => "EmergencyStop",
        }
    } else if let Some(se) = err.downcast_ref::<ShadeError>() {
        error_reason(se)
    } else {
        "Error"
    };
    json!({ "type": "error", "reason": reason, "message": humanize(err) }).to_string()
}
