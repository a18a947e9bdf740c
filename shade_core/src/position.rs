//! Absolute position tracking and the guided calibration sequence.
//!
//! Position is counted in steps. The sensor frame (raw readings) and the step
//! frame differ by the zebra offset captured during calibration:
//! `step = raw - zebra_offset`.
use std::time::Duration;

use shade_traits::PositionSensor;
use tracing::{debug, info, warn};

use crate::config::Timeouts;
use crate::error::{Result, ShadeError};
use crate::hw_error::hw;
use crate::pulse::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionState {
    pub min_position: u32,
    pub max_position: u32,
    pub current_position: u32,
    pub calibrated: bool,
}

impl PositionState {
    fn uncalibrated(current_position: u32) -> Self {
        Self {
            min_position: 0,
            max_position: u32::MAX,
            current_position,
            calibrated: false,
        }
    }

    fn clamp(&mut self) {
        self.current_position = self
            .current_position
            .clamp(self.min_position, self.max_position);
    }
}

/// Committed calibration, as persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationData {
    pub min_position: u32,
    pub max_position: u32,
    pub zebra_offset: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CalibrationStep {
    UpperLimit,
    LowerLimit,
    ZebraOffset,
    Complete,
}

impl CalibrationStep {
    /// Operator instruction for this step.
    pub fn prompt(self) -> &'static str {
        match self {
            CalibrationStep::UpperLimit => "jog the shade to its top position, then confirm",
            CalibrationStep::LowerLimit => "jog the shade to its bottom position, then confirm",
            CalibrationStep::ZebraOffset => "align the shade with the index mark, then confirm",
            CalibrationStep::Complete => "calibration complete",
        }
    }

    fn slot(self) -> Option<usize> {
        match self {
            CalibrationStep::UpperLimit => Some(0),
            CalibrationStep::LowerLimit => Some(1),
            CalibrationStep::ZebraOffset => Some(2),
            CalibrationStep::Complete => None,
        }
    }
}

/// Captures buffered until the sequence completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationSession {
    step: CalibrationStep,
    captured: [Option<u32>; 3],
}

impl CalibrationSession {
    fn new() -> Self {
        Self {
            step: CalibrationStep::UpperLimit,
            captured: [None; 3],
        }
    }

    pub fn step(&self) -> CalibrationStep {
        self.step
    }

    /// Raw reading captured at `step`, if that step is done.
    pub fn captured(&self, step: CalibrationStep) -> Option<u32> {
        step.slot().and_then(|i| self.captured[i])
    }
}

/// Result of applying one step to the position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Moved(u32),
    /// The step would have left the window; position is clamped.
    OverTravel(u32),
}

pub struct PositionEstimator<S: PositionSensor> {
    sensor: S,
    read_timeout: Duration,
    state: PositionState,
    zebra_offset: i64,
    session: Option<CalibrationSession>,
    saved: Option<(PositionState, i64)>,
}

impl<S: PositionSensor> PositionEstimator<S> {
    pub fn new(sensor: S, timeouts: &Timeouts) -> Self {
        Self {
            sensor,
            read_timeout: Duration::from_millis(timeouts.sensor_ms),
            state: PositionState::uncalibrated(0),
            zebra_offset: 0,
            session: None,
            saved: None,
        }
    }

    /// Raw sensor reading.
    pub fn read(&mut self) -> Result<u32> {
        self.sensor.read(self.read_timeout).map_err(hw)
    }

    pub fn state(&self) -> PositionState {
        self.state
    }

    pub fn current_position(&self) -> u32 {
        self.state.current_position
    }

    pub fn is_calibrated(&self) -> bool {
        self.state.calibrated
    }

    pub fn zebra_offset(&self) -> i64 {
        self.zebra_offset
    }

    /// Percentage of calibrated travel, clamped to `[0, 100]`.
    pub fn get_percentage(&self) -> Result<f32> {
        if !self.state.calibrated {
            return Err(ShadeError::NotCalibrated);
        }
        let span = f64::from(self.state.max_position - self.state.min_position);
        let pos = f64::from(self.state.current_position.saturating_sub(self.state.min_position));
        Ok((pos / span * 100.0).clamp(0.0, 100.0) as f32)
    }

    /// Step position for a percentage of calibrated travel.
    pub fn position_for_percentage(&self, percentage: f32) -> Result<u32> {
        if !self.state.calibrated {
            return Err(ShadeError::NotCalibrated);
        }
        if percentage.is_nan() {
            return Err(ShadeError::invalid("percentage is NaN"));
        }
        let p = f64::from(percentage.clamp(0.0, 100.0));
        let span = f64::from(self.state.max_position - self.state.min_position);
        let offset = (span * p / 100.0).round() as u32;
        Ok(self.state.min_position + offset)
    }

    /// Steps left before `direction` hits the edge of the tracking window.
    pub fn room(&self, direction: Direction) -> u32 {
        match direction {
            Direction::Up => self.state.max_position - self.state.current_position,
            Direction::Down => self.state.current_position - self.state.min_position,
            Direction::Stopped => 0,
        }
    }

    /// `OverTravel` if one more step in `direction` would leave the window.
    pub fn check_step(&self, direction: Direction) -> Result<()> {
        if direction != Direction::Stopped && self.room(direction) == 0 {
            return Err(ShadeError::OverTravel);
        }
        Ok(())
    }

    /// Step-completion callback: moves the position by exactly one step.
    pub fn on_step(&mut self, direction: Direction) -> StepOutcome {
        let s = &mut self.state;
        match direction {
            Direction::Up if s.current_position < s.max_position => {
                s.current_position += 1;
                StepOutcome::Moved(s.current_position)
            }
            Direction::Down if s.current_position > s.min_position => {
                s.current_position -= 1;
                StepOutcome::Moved(s.current_position)
            }
            Direction::Stopped => StepOutcome::Moved(s.current_position),
            _ => {
                warn!(position = s.current_position, ?direction, "over-travel");
                StepOutcome::OverTravel(s.current_position)
            }
        }
    }

    /// Re-read the sensor and replace the tracked position.
    pub fn resync(&mut self) -> Result<u32> {
        let raw = self.read()?;
        let pos = (i64::from(raw) - self.zebra_offset)
            .clamp(i64::from(self.state.min_position), i64::from(self.state.max_position));
        let pos = pos as u32;
        if pos != self.state.current_position {
            debug!(from = self.state.current_position, to = pos, raw, "position resynced");
        }
        self.state.current_position = pos;
        Ok(pos)
    }

    /// Install persisted calibration, or `None` for an uncalibrated shade.
    pub fn restore(&mut self, data: Option<CalibrationData>) -> Result<()> {
        let current = self.state.current_position;
        self.session = None;
        self.saved = None;
        match data {
            None => {
                self.state = PositionState::uncalibrated(current);
                self.zebra_offset = 0;
                Ok(())
            }
            Some(d) if d.min_position >= d.max_position => {
                self.state = PositionState::uncalibrated(current);
                self.zebra_offset = 0;
                Err(ShadeError::invalid(format!(
                    "persisted calibration min {} >= max {}",
                    d.min_position, d.max_position
                )))
            }
            Some(d) => {
                self.state = PositionState {
                    min_position: d.min_position,
                    max_position: d.max_position,
                    current_position: current,
                    calibrated: true,
                };
                self.state.clamp();
                self.zebra_offset = d.zebra_offset;
                info!(min = d.min_position, max = d.max_position, offset = d.zebra_offset, "calibration restored");
                Ok(())
            }
        }
    }

    /// Committed bounds for persistence.
    pub fn calibration_data(&self) -> Option<CalibrationData> {
        self.state.calibrated.then_some(CalibrationData {
            min_position: self.state.min_position,
            max_position: self.state.max_position,
            zebra_offset: self.zebra_offset,
        })
    }

    pub fn session(&self) -> Option<&CalibrationSession> {
        self.session.as_ref()
    }

    /// Open a session at `UpperLimit` and widen the window so the operator
    /// can jog past stale bounds. Restarts an open session.
    pub fn begin_calibration(&mut self) -> CalibrationStep {
        if self.saved.is_none() {
            self.saved = Some((self.state, self.zebra_offset));
        }
        let current = self.state.current_position;
        self.state = PositionState::uncalibrated(current);
        self.session = Some(CalibrationSession::new());
        CalibrationStep::UpperLimit
    }

    /// Capture the sensor for the current step and move to the next one.
    ///
    /// The capture after `ZebraOffset` commits the bounds and returns
    /// `Complete`. A commit that does not yield `min < max` fails with
    /// `InvalidArgument` and restarts the session at `UpperLimit`.
    pub fn advance_calibration(&mut self) -> Result<CalibrationStep> {
        let step = match &self.session {
            Some(s) => s.step,
            None => return Err(ShadeError::invalid("no calibration in progress")),
        };
        let Some(slot) = step.slot() else {
            return Err(ShadeError::invalid("calibration already complete"));
        };
        let raw = self.read()?;
        debug!(?step, raw, position = self.state.current_position, "calibration capture");

        let Some(session) = self.session.as_mut() else {
            return Err(ShadeError::invalid("no calibration in progress"));
        };
        session.captured[slot] = Some(raw);
        session.step = match step {
            CalibrationStep::UpperLimit => CalibrationStep::LowerLimit,
            CalibrationStep::LowerLimit => CalibrationStep::ZebraOffset,
            CalibrationStep::ZebraOffset | CalibrationStep::Complete => CalibrationStep::Complete,
        };
        if session.step != CalibrationStep::Complete {
            return Ok(session.step);
        }
        let captured = session.captured;
        self.commit(captured)
    }

    fn commit(&mut self, captured: [Option<u32>; 3]) -> Result<CalibrationStep> {
        let [Some(upper), Some(lower), Some(zebra)] = captured else {
            self.session = Some(CalibrationSession::new());
            return Err(ShadeError::invalid("calibration capture missing"));
        };
        let offset = i64::from(zebra) - i64::from(self.state.current_position);
        let min = i64::from(lower) - offset;
        let max = i64::from(upper) - offset;
        let in_range = |v: i64| (0..=i64::from(u32::MAX)).contains(&v);
        if !(in_range(min) && in_range(max)) || min >= max {
            warn!(upper, lower, zebra, offset, "calibration rejected, restarting");
            self.session = Some(CalibrationSession::new());
            return Err(ShadeError::invalid(format!(
                "calibration bounds min {min} must be < max {max}"
            )));
        }

        let current = self.state.current_position;
        self.state = PositionState {
            min_position: min as u32,
            max_position: max as u32,
            current_position: current,
            calibrated: true,
        };
        self.state.clamp();
        self.zebra_offset = offset;
        self.session = None;
        self.saved = None;
        info!(min, max, offset, "calibration committed");
        Ok(CalibrationStep::Complete)
    }

    /// Drop the session and put back the bounds in force before it started.
    pub fn abort_calibration(&mut self) {
        if self.session.take().is_none() {
            return;
        }
        if let Some((mut prev, offset)) = self.saved.take() {
            prev.current_position = self.state.current_position;
            prev.clamp();
            self.state = prev;
            self.zebra_offset = offset;
        }
        debug!("calibration abandoned");
    }
}
