//! Stepper pulse generation.
//!
//! `PulseEngine` owns the coil driver and the step timer. A job is a direction,
//! a step budget and a speed; each timer tick advances the coil phase by one
//! pattern and reports a `StepEvent`. The engine knows nothing about absolute
//! shade position.
use std::time::Duration;

use shade_traits::{CoilDriver, CoilPattern, StepMode, StepTimer};
use tracing::{debug, trace, warn};

use crate::config::MotorCfg;
use crate::error::{Result, ShadeError};
use crate::hw_error::hw;
use crate::util::{clamp_speed, step_delay_us};

/// Rotation direction. `Up` raises the shade and increases position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    Up,
    Down,
    #[default]
    Stopped,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Stopped => Direction::Stopped,
        }
    }
}

/// Snapshot of the active job.
///
/// `remaining_steps == 0` exactly when `direction == Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseJob {
    pub direction: Direction,
    pub remaining_steps: u32,
    /// Index into the active step sequence, always `< sequence_len`.
    pub step_index: u32,
    pub speed: u8,
    pub half_step: bool,
}

/// One completed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepEvent {
    pub direction: Direction,
    pub step_index: u32,
    pub remaining: u32,
}

impl StepEvent {
    /// The job finished with this step and the engine has stopped itself.
    pub fn completed(&self) -> bool {
        self.remaining == 0
    }
}

pub struct PulseEngine<C: CoilDriver, T: StepTimer> {
    coils: C,
    timer: T,
    mode: StepMode,
    direction: Direction,
    remaining: u32,
    step_index: u32,
    speed: u8,
    min_delay_us: u32,
    max_delay_us: u32,
    disable_on_stop: bool,
    driver_enabled: bool,
    coils_released: bool,
}

impl<C: CoilDriver, T: StepTimer> PulseEngine<C, T> {
    pub fn new(coils: C, timer: T, cfg: &MotorCfg) -> Self {
        Self {
            coils,
            timer,
            mode: StepMode::from_half_step(cfg.half_step),
            direction: Direction::Stopped,
            remaining: 0,
            step_index: 0,
            speed: clamp_speed(cfg.default_speed),
            min_delay_us: cfg.min_step_delay_us,
            max_delay_us: cfg.max_step_delay_us,
            disable_on_stop: cfg.disable_on_stop,
            driver_enabled: false,
            coils_released: false,
        }
    }

    /// Tick period for `speed` under this engine's delay bounds.
    pub fn period_for(&self, speed: u8) -> Duration {
        Duration::from_micros(u64::from(step_delay_us(
            speed,
            self.min_delay_us,
            self.max_delay_us,
        )))
    }

    /// Start a job, replacing any job in flight.
    ///
    /// The previous timer is cancelled before the new one is armed so there
    /// is never more than one periodic source driving the coils.
    pub fn start(&mut self, direction: Direction, steps: u32, speed: u8) -> Result<()> {
        if steps == 0 {
            return Err(ShadeError::invalid("step count must be > 0; use stop()"));
        }
        if direction == Direction::Stopped {
            return Err(ShadeError::invalid("direction must be Up or Down"));
        }
        let speed = clamp_speed(speed);

        let was_moving = self.is_moving();
        self.clear_job();
        if let Err(e) = self.timer.cancel() {
            return Err(hw(e));
        }
        if was_moving {
            debug!("previous job replaced");
        }
        if !self.driver_enabled {
            self.coils.set_enabled(true).map_err(hw)?;
            self.driver_enabled = true;
        }

        self.direction = direction;
        self.remaining = steps;
        self.speed = speed;
        let period = self.period_for(speed);
        if let Err(e) = self.timer.arm(period) {
            self.clear_job();
            return Err(hw(e));
        }
        debug!(?direction, steps, speed, period_us = period.as_micros() as u64, "job started");
        Ok(())
    }

    /// Advance one step. Returns `None` for a stale tick with no job.
    ///
    /// A coil write failure leaves the job untouched and is returned as
    /// `HardwareFault`; the caller decides how to stop.
    pub fn on_tick(&mut self) -> Result<Option<StepEvent>> {
        if !self.is_moving() {
            return Ok(None);
        }
        let len = self.mode.sequence_len();
        let next = match self.direction {
            Direction::Up => (self.step_index + 1) % len,
            Direction::Down => (self.step_index + len - 1) % len,
            Direction::Stopped => return Ok(None),
        };
        self.coils.energize(self.mode.pattern(next)).map_err(hw)?;
        self.coils_released = false;
        self.step_index = next;
        self.remaining -= 1;
        let event = StepEvent {
            direction: self.direction,
            step_index: next,
            remaining: self.remaining,
        };
        trace!(index = next, remaining = self.remaining, "step");
        if self.remaining == 0 {
            self.halt()?;
        }
        Ok(Some(event))
    }

    /// Change speed; a running job continues from its current phase at the
    /// new period.
    pub fn set_speed(&mut self, speed: u8) -> Result<()> {
        self.speed = clamp_speed(speed);
        if self.is_moving() {
            // arm() replaces the period in place
            self.timer.arm(self.period_for(self.speed)).map_err(hw)?;
        }
        Ok(())
    }

    /// Reverse or redirect a running job without touching the timer or the
    /// step index. `Stopped` is the same as `stop()`.
    pub fn set_direction(&mut self, direction: Direction) -> Result<()> {
        if direction == Direction::Stopped {
            return self.stop();
        }
        if !self.is_moving() {
            return Err(ShadeError::invalid("no job to redirect"));
        }
        self.direction = direction;
        Ok(())
    }

    /// Stop and release the coils. No-op when already stopped and released.
    pub fn stop(&mut self) -> Result<()> {
        if !self.is_moving() && self.coils_released {
            return Ok(());
        }
        self.clear_job();
        self.halt()
    }

    /// Switch sequencing; the step index is remapped so the coil phase is kept.
    pub fn set_step_mode(&mut self, mode: StepMode) {
        if mode == self.mode {
            return;
        }
        self.step_index = match mode {
            StepMode::Full => self.step_index / 2,
            StepMode::Half => self.step_index * 2,
        } % mode.sequence_len();
        self.mode = mode;
        debug!(?mode, index = self.step_index, "step mode changed");
    }

    pub fn is_moving(&self) -> bool {
        self.direction != Direction::Stopped
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn remaining_steps(&self) -> u32 {
        self.remaining
    }

    pub fn step_index(&self) -> u32 {
        self.step_index
    }

    pub fn speed(&self) -> u8 {
        self.speed
    }

    pub fn step_mode(&self) -> StepMode {
        self.mode
    }

    pub fn job(&self) -> PulseJob {
        PulseJob {
            direction: self.direction,
            remaining_steps: self.remaining,
            step_index: self.step_index,
            speed: self.speed,
            half_step: self.mode.is_half(),
        }
    }

    fn clear_job(&mut self) {
        self.direction = Direction::Stopped;
        self.remaining = 0;
    }

    // Cancel the timer, release the coils, optionally drop the enable line.
    // Every step runs even if an earlier one fails; the first error wins.
    fn halt(&mut self) -> Result<()> {
        self.clear_job();
        let mut first_err: Option<ShadeError> = None;
        if let Err(e) = self.timer.cancel() {
            warn!(error = %e, "timer cancel failed");
            first_err = first_err.or(Some(hw(e)));
        }
        match self.coils.energize(CoilPattern::OFF) {
            Ok(()) => self.coils_released = true,
            Err(e) => {
                warn!(error = %e, "coil release failed");
                first_err = first_err.or(Some(hw(e)));
            }
        }
        if self.disable_on_stop && self.driver_enabled {
            match self.coils.set_enabled(false) {
                Ok(()) => self.driver_enabled = false,
                Err(e) => {
                    warn!(error = %e, "driver disable failed");
                    first_err = first_err.or(Some(hw(e)));
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
