//! ULN2003-style four-wire coil driver and a fault input line.
use std::sync::Mutex;

use rppal::gpio::{Gpio, Level, OutputPin};
use shade_traits::{CoilDriver, CoilPattern, HwResult};
use tracing::{debug, trace};

use crate::error::{HwError, Result};

pub struct GpioCoils {
    coils: [OutputPin; 4],
    enable: Option<OutputPin>,
}

impl GpioCoils {
    /// Claim the four coil pins (IN1..IN4) and an optional driver enable pin.
    /// All coils start released.
    pub fn new(coil_pins: [u8; 4], enable_pin: Option<u8>) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let claim = |pin: u8| -> Result<OutputPin> {
            let mut out = gpio
                .get(pin)
                .map_err(|e| HwError::Gpio(format!("pin {pin}: {e}")))?
                .into_output();
            out.set_low();
            Ok(out)
        };
        let coils = [
            claim(coil_pins[0])?,
            claim(coil_pins[1])?,
            claim(coil_pins[2])?,
            claim(coil_pins[3])?,
        ];
        let enable = enable_pin.map(claim).transpose()?;
        debug!(?coil_pins, ?enable_pin, "coil driver ready");
        Ok(Self { coils, enable })
    }
}

impl CoilDriver for GpioCoils {
    fn energize(&mut self, pattern: CoilPattern) -> HwResult<()> {
        for (pin, on) in self.coils.iter_mut().zip(pattern.0) {
            pin.write(if on { Level::High } else { Level::Low });
        }
        trace!(?pattern, "coils");
        Ok(())
    }

    fn set_enabled(&mut self, enabled: bool) -> HwResult<()> {
        if let Some(pin) = self.enable.as_mut() {
            pin.write(if enabled { Level::High } else { Level::Low });
        }
        if !enabled {
            for pin in &mut self.coils {
                pin.set_low();
            }
        }
        Ok(())
    }
}

/// Build a fault check closure over an input pin (driver FAULT or an
/// end-stop switch). Returns true while the line is asserted.
pub fn make_fault_checker(
    pin: u8,
    active_low: bool,
) -> Result<Box<dyn Fn() -> bool + Send + Sync>> {
    let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
    let input = gpio
        .get(pin)
        .map_err(|e| HwError::Gpio(format!("pin {pin}: {e}")))?;
    let input = if active_low {
        input.into_input_pullup()
    } else {
        input.into_input_pulldown()
    };
    let input = Mutex::new(input);
    Ok(Box::new(move || {
        let Ok(pin) = input.lock() else {
            return false;
        };
        if active_low { pin.is_low() } else { pin.is_high() }
    }))
}
