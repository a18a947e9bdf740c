//! ADS1115 single-shot reads of a potentiometer coupled to the shade roller.
use std::time::Duration;

use rppal::i2c::I2c;
use shade_traits::{HwResult, PositionSensor};
use tracing::{trace, warn};

use crate::error::{HwError, Result};
use crate::util::wait_until_with_timeout;

const REG_CONVERSION: u8 = 0x00;
const REG_CONFIG: u8 = 0x01;
// OS=1 (start), MUX=AIN0/GND, PGA=±4.096V, single-shot, 128 SPS, comparator off
const CONFIG_SINGLE_SHOT: [u8; 2] = [0xC3, 0x83];
const OS_READY: u8 = 0x80;
const MAX_CODE: u64 = i16::MAX as u64;

pub struct Ads1115 {
    i2c: I2c,
    full_scale_steps: u32,
    retries: u32,
}

impl Ads1115 {
    /// `full_scale_steps` maps the top ADC code onto the step frame.
    pub fn new(bus: u8, address: u16, full_scale_steps: u32) -> Result<Self> {
        let mut i2c = I2c::with_bus(bus).map_err(|e| HwError::I2c(e.to_string()))?;
        i2c.set_slave_address(address)
            .map_err(|e| HwError::I2c(e.to_string()))?;
        Ok(Self {
            i2c,
            full_scale_steps,
            retries: 2,
        })
    }

    pub fn read_with_timeout(&mut self, timeout: Duration) -> Result<u32> {
        self.i2c
            .block_write(REG_CONFIG, &CONFIG_SINGLE_SHOT)
            .map_err(|e| HwError::I2c(e.to_string()))?;

        let i2c = &mut self.i2c;
        wait_until_with_timeout(
            || {
                let mut cfg = [0u8; 2];
                i2c.block_read(REG_CONFIG, &mut cfg).is_ok() && cfg[0] & OS_READY != 0
            },
            timeout,
            Duration::from_micros(500),
        )
        .map_err(|_| HwError::Timeout)?;

        let mut buf = [0u8; 2];
        self.i2c
            .block_read(REG_CONVERSION, &mut buf)
            .map_err(|e| HwError::I2c(e.to_string()))?;
        let code = i16::from_be_bytes(buf).max(0) as u64;
        let steps = code * u64::from(self.full_scale_steps) / MAX_CODE;
        trace!(code, steps, "ads1115 sample");
        Ok(steps as u32)
    }
}

impl PositionSensor for Ads1115 {
    fn read(&mut self, timeout: Duration) -> HwResult<u32> {
        let mut attempts = 0;
        loop {
            match self.read_with_timeout(timeout) {
                Ok(steps) => return Ok(steps),
                Err(HwError::Timeout) if attempts < self.retries => {
                    attempts += 1;
                    warn!(retries = attempts, "position sensor timeout, retrying");
                }
                Err(e) => return Err(Box::new(e)),
            }
        }
    }
}
