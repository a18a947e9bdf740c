//! Hardware assembly: maps the TOML config onto a `ShadeBuilder` with either
//! the simulator or the GPIO/I²C drivers.

use std::path::PathBuf;

use shade_config::{Config, PersistedCalibration};
use shade_core::{CalibrationData, Missing, MotorCfg, Set, Shade, ShadeBuilder, SupervisorCfg, Timeouts, TravelCfg};

/// Starting position of the simulated shade (steps); defaults to the
/// calibrated bottom, or 0.
#[cfg(not(all(feature = "hardware", target_os = "linux")))]
pub const SIM_POSITION_ENV: &str = "SHADE_SIM_POSITION";

pub struct Backend {
    pub builder: ShadeBuilder<Set, Set, Missing>,
    /// Present when running against the simulator.
    pub sim: Option<shade_hardware::SimulatedShade>,
    pub name: &'static str,
}

/// Build the controller inputs for this process. A `calibration_path` makes
/// committed calibrations persist to that file.
pub fn assemble(
    cfg: &Config,
    calibration: Option<PersistedCalibration>,
    calibration_path: Option<PathBuf>,
) -> eyre::Result<Backend> {
    let motor: MotorCfg = (&cfg.motor).into();
    let travel: TravelCfg = (&cfg.travel).into();
    let supervisor: SupervisorCfg = (&cfg.supervisor).into();
    let timeouts: Timeouts = (&cfg.sensor).into();
    let calibration_core = calibration.map(CalibrationData::from);

    let base = Shade::builder()
        .with_motor(motor)
        .with_travel(travel)
        .with_supervisor(supervisor)
        .with_timeouts(timeouts)
        .with_calibration(calibration_core);

    let base = match calibration_path {
        Some(path) => base.with_calibration_sink(Box::new(move |data: &CalibrationData| {
            match shade_config::save_calibration(&path, PersistedCalibration::from(*data)) {
                Ok(()) => tracing::info!(path = %path.display(), "calibration saved"),
                Err(e) => tracing::error!(error = %e, path = %path.display(), "failed to save calibration"),
            }
        })),
        None => base,
    };

    #[cfg(all(feature = "hardware", target_os = "linux"))]
    {
        use eyre::WrapErr;

        let coils = shade_hardware::gpio::GpioCoils::new(cfg.pins.coils, cfg.pins.enable)
            .wrap_err("open coil pins")?;
        let sensor = shade_hardware::ads1115::Ads1115::new(
            cfg.sensor.i2c_bus,
            cfg.sensor.i2c_address,
            cfg.sensor.full_scale_steps,
        )
        .wrap_err("open position sensor (i2c)")?;
        let mut builder = base.with_coils(coils).with_sensor(sensor);
        if let Some(pin) = cfg.pins.fault_in {
            match shade_hardware::gpio::make_fault_checker(pin, cfg.supervisor.fault_active_low) {
                Ok(check) => {
                    tracing::info!(pin, active_low = cfg.supervisor.fault_active_low, "fault input enabled");
                    builder = builder.with_fault_check(check);
                }
                Err(e) => tracing::warn!(error = %e, "failed to init fault input; continuing without it"),
            }
        }
        Ok(Backend {
            builder,
            sim: None,
            name: "hardware",
        })
    }

    #[cfg(not(all(feature = "hardware", target_os = "linux")))]
    {
        let start = match std::env::var(SIM_POSITION_ENV) {
            Ok(v) => v
                .trim()
                .parse::<u32>()
                .map_err(|e| eyre::eyre!("{SIM_POSITION_ENV}={v}: {e}"))?,
            Err(_) => calibration.map_or(0, |c| c.min_position),
        };
        let sim = shade_hardware::SimulatedShade::new(start);
        let builder = base.with_coils(sim.coils()).with_sensor(sim.sensor());
        Ok(Backend {
            builder,
            sim: Some(sim),
            name: "simulator",
        })
    }
}
