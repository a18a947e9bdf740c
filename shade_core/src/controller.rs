//! Supervisory state machine.
//!
//! `Controller` owns the shade state, the pulse engine and the position
//! estimator. Every command source goes through `handle` (or the matching
//! method); the tick source calls `on_tick`; the supervisor calls `supervise`.
//!
//! Arbitration: Stop always wins, a same-direction move is a no-op, any other
//! move preempts the running job. While calibrating only advance, jog and
//! Stop are accepted. EmergencyStop rejects everything until `reset`.
use shade_traits::{CoilDriver, PositionSensor, StepMode, StepTimer};
use tracing::{debug, error, info, warn};

use crate::config::{MotorCfg, TravelCfg};
use crate::error::{Fault, Result, ShadeError};
use crate::position::{CalibrationData, CalibrationStep, PositionEstimator, StepOutcome};
use crate::pulse::{Direction, PulseEngine};
use crate::safety::SafetyMonitor;
use crate::status::{ShadeState, ShadeStatus, StatusPublisher};
use crate::util::clamp_speed;

/// High-level motion requests shared by every command source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionCommand {
    MoveUp,
    MoveDown,
    /// Whole percent, `0..=100`.
    MoveToPercentage(u8),
    Stop,
    Calibrate,
}

/// Everything the inbound queue carries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShadeCommand {
    Motion(MotionCommand),
    AdvanceCalibration,
    Jog { direction: Direction, steps: u32 },
    /// Fractional percentage, clamped to `[0, 100]`.
    SetPositionPercentage(f32),
    MoveToPosition(u32),
    SetSpeed(u8),
    SetStepMode(StepMode),
    Resync,
    Reset,
    /// Snapshot only.
    Status,
}

impl From<MotionCommand> for ShadeCommand {
    fn from(m: MotionCommand) -> Self {
        ShadeCommand::Motion(m)
    }
}

/// Called with freshly committed calibration (e.g. to persist it).
pub type CalibrationSink = Box<dyn FnMut(&CalibrationData) + Send>;

fn moving_state(direction: Direction) -> ShadeState {
    match direction {
        Direction::Up => ShadeState::MovingUp,
        Direction::Down => ShadeState::MovingDown,
        Direction::Stopped => ShadeState::Idle,
    }
}

pub struct Controller<C: CoilDriver, S: PositionSensor, T: StepTimer> {
    engine: PulseEngine<C, T>,
    position: PositionEstimator<S>,
    state: ShadeState,
    target: Option<u32>,
    speed: u8,
    calibration_speed: u8,
    nominal_steps: u32,
    steps_taken: u64,
    fault: Option<Fault>,
    safety: SafetyMonitor,
    publisher: Option<StatusPublisher>,
    last_published: Option<ShadeStatus>,
    calibration_sink: Option<CalibrationSink>,
}

impl<C: CoilDriver, S: PositionSensor, T: StepTimer> std::fmt::Debug for Controller<C, S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("state", &self.state)
            .field("target", &self.target)
            .field("speed", &self.speed)
            .field("fault", &self.fault)
            .finish_non_exhaustive()
    }
}

impl<C: CoilDriver, S: PositionSensor, T: StepTimer> Controller<C, S, T> {
    pub fn new(
        engine: PulseEngine<C, T>,
        position: PositionEstimator<S>,
        motor: &MotorCfg,
        travel: &TravelCfg,
    ) -> Self {
        Self {
            engine,
            position,
            state: ShadeState::Idle,
            target: None,
            speed: clamp_speed(motor.default_speed),
            calibration_speed: clamp_speed(motor.calibration_speed),
            nominal_steps: travel.nominal_steps,
            steps_taken: 0,
            fault: None,
            safety: SafetyMonitor::default(),
            publisher: None,
            last_published: None,
            calibration_sink: None,
        }
    }

    pub fn set_safety_monitor(&mut self, safety: SafetyMonitor) {
        self.safety = safety;
    }

    pub fn set_status_publisher(&mut self, publisher: StatusPublisher) {
        self.publisher = Some(publisher);
        self.publish();
    }

    pub fn set_calibration_sink(&mut self, sink: CalibrationSink) {
        self.calibration_sink = Some(sink);
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub fn state(&self) -> ShadeState {
        self.state
    }

    pub fn is_moving(&self) -> bool {
        self.engine.is_moving()
    }

    pub fn position(&self) -> u32 {
        self.position.current_position()
    }

    pub fn percentage(&self) -> Result<f32> {
        self.position.get_percentage()
    }

    pub fn is_calibrated(&self) -> bool {
        self.position.is_calibrated()
    }

    pub fn calibration_data(&self) -> Option<CalibrationData> {
        self.position.calibration_data()
    }

    pub fn calibration_step(&self) -> Option<CalibrationStep> {
        self.position.session().map(|s| s.step())
    }

    pub fn fault(&self) -> Option<&Fault> {
        self.fault.as_ref()
    }

    /// Monotonic count of steps driven since start; the watchdog watches it.
    pub fn steps_taken(&self) -> u64 {
        self.steps_taken
    }

    pub fn speed(&self) -> u8 {
        self.speed
    }

    pub fn engine(&self) -> &PulseEngine<C, T> {
        &self.engine
    }

    pub fn estimator(&self) -> &PositionEstimator<S> {
        &self.position
    }

    pub(crate) fn estimator_mut(&mut self) -> &mut PositionEstimator<S> {
        &mut self.position
    }

    pub fn status(&self) -> ShadeStatus {
        ShadeStatus {
            state: self.state,
            position_percentage: self
                .position
                .get_percentage()
                .ok()
                .map(|p| p.round() as u8),
            is_moving: self.engine.is_moving(),
            position: self.position.current_position(),
        }
    }

    // ── Command entry point ──────────────────────────────────────────────────

    /// Apply one command and return the resulting snapshot.
    ///
    /// Rejections leave the state untouched, except a hardware fault while
    /// the motor runs, which latches EmergencyStop.
    pub fn handle(&mut self, cmd: ShadeCommand) -> Result<ShadeStatus> {
        let res = match cmd {
            ShadeCommand::Motion(MotionCommand::MoveUp) => self.move_up(),
            ShadeCommand::Motion(MotionCommand::MoveDown) => self.move_down(),
            ShadeCommand::Motion(MotionCommand::MoveToPercentage(p)) => self.move_to_percentage(p),
            ShadeCommand::Motion(MotionCommand::Stop) => self.stop(),
            ShadeCommand::Motion(MotionCommand::Calibrate) => self.calibrate(),
            ShadeCommand::AdvanceCalibration => self.advance_calibration().map(|_| ()),
            ShadeCommand::Jog { direction, steps } => self.jog(direction, steps),
            ShadeCommand::SetPositionPercentage(p) => self.set_position_percentage(p),
            ShadeCommand::MoveToPosition(pos) => self.move_to_position(pos),
            ShadeCommand::SetSpeed(s) => self.set_speed(s),
            ShadeCommand::SetStepMode(m) => self.set_step_mode(m),
            ShadeCommand::Resync => self.resync_position().map(|_| ()),
            ShadeCommand::Reset => self.reset(),
            ShadeCommand::Status => Ok(()),
        };
        if let Err(e) = &res {
            debug!(?cmd, error = %e, "command rejected");
        }
        self.publish();
        res.map(|()| self.status())
    }

    // ── Motion ───────────────────────────────────────────────────────────────

    pub fn move_up(&mut self) -> Result<()> {
        self.move_to_limit(Direction::Up)
    }

    pub fn move_down(&mut self) -> Result<()> {
        self.move_to_limit(Direction::Down)
    }

    /// Move to a whole percentage of calibrated travel.
    pub fn move_to_percentage(&mut self, percentage: u8) -> Result<()> {
        self.ensure_motion_allowed()?;
        if percentage > 100 {
            return Err(ShadeError::invalid(format!(
                "percentage {percentage} out of range 0..=100"
            )));
        }
        let target = self.position.position_for_percentage(f32::from(percentage))?;
        self.travel_to(target)
    }

    /// Fractional percentage; clamped to `[0, 100]`.
    pub fn set_position_percentage(&mut self, percentage: f32) -> Result<()> {
        self.ensure_motion_allowed()?;
        let target = self.position.position_for_percentage(percentage)?;
        self.travel_to(target)
    }

    /// Absolute target in steps, inside the calibrated bounds.
    pub fn move_to_position(&mut self, position: u32) -> Result<()> {
        self.ensure_motion_allowed()?;
        let st = self.position.state();
        if !st.calibrated {
            return Err(ShadeError::NotCalibrated);
        }
        if position < st.min_position || position > st.max_position {
            return Err(ShadeError::invalid(format!(
                "position {position} outside [{}, {}]",
                st.min_position, st.max_position
            )));
        }
        self.travel_to(position)
    }

    pub fn goto_top(&mut self) -> Result<()> {
        self.move_to_percentage(100)
    }

    pub fn goto_bottom(&mut self) -> Result<()> {
        self.move_to_percentage(0)
    }

    /// Stop whatever is running. During calibration this abandons the session.
    pub fn stop(&mut self) -> Result<()> {
        match self.state {
            ShadeState::EmergencyStop => Ok(()),
            ShadeState::Calibrating => {
                let was_moving = self.engine.is_moving();
                self.position.abort_calibration();
                let res = self.engine.stop();
                self.target = None;
                self.set_state(ShadeState::Idle);
                info!("calibration abandoned");
                self.latch_on_motion_fault(was_moving, res)
            }
            _ => self.halt_motion(),
        }
    }

    pub fn set_speed(&mut self, speed: u8) -> Result<()> {
        self.ensure_not_latched()?;
        self.speed = clamp_speed(speed);
        if matches!(self.state, ShadeState::MovingUp | ShadeState::MovingDown) {
            let res = self.engine.set_speed(self.speed);
            return self.latch_on_motion_fault(true, res);
        }
        Ok(())
    }

    pub fn set_step_mode(&mut self, mode: StepMode) -> Result<()> {
        self.ensure_not_latched()?;
        self.engine.set_step_mode(mode);
        Ok(())
    }

    /// Re-read the sensor into the tracked position. Idle only: the read may
    /// block for the sensor timeout and must not stall the tick path.
    pub fn resync_position(&mut self) -> Result<u32> {
        self.ensure_motion_allowed()?;
        if !self.position.is_calibrated() {
            return Err(ShadeError::NotCalibrated);
        }
        if self.engine.is_moving() {
            return Err(ShadeError::busy("cannot resync while moving"));
        }
        let pos = self.position.resync()?;
        self.publish();
        Ok(pos)
    }

    // ── Calibration ──────────────────────────────────────────────────────────

    /// Enter `Calibrating`, preempting any running job.
    pub fn calibrate(&mut self) -> Result<()> {
        self.ensure_not_latched()?;
        if self.state == ShadeState::Calibrating {
            return Err(ShadeError::busy("calibration already in progress"));
        }
        if self.engine.is_moving() {
            self.halt_motion()?;
        }
        self.position.begin_calibration();
        self.engine.set_speed(self.calibration_speed)?;
        self.set_state(ShadeState::Calibrating);
        info!(prompt = CalibrationStep::UpperLimit.prompt(), "calibration started");
        Ok(())
    }

    /// Capture the current calibration step. Returns the step now pending,
    /// or `Complete` once the bounds are committed and the shade is Idle.
    pub fn advance_calibration(&mut self) -> Result<CalibrationStep> {
        self.ensure_not_latched()?;
        if self.state != ShadeState::Calibrating {
            return Err(ShadeError::invalid("no calibration in progress"));
        }
        if self.engine.is_moving() {
            let res = self.engine.stop();
            self.target = None;
            self.latch_on_motion_fault(true, res)?;
        }
        let step = self.position.advance_calibration()?;
        if step == CalibrationStep::Complete {
            self.set_state(ShadeState::Idle);
            if let (Some(data), Some(sink)) =
                (self.position.calibration_data(), self.calibration_sink.as_mut())
            {
                sink(&data);
            }
        } else {
            info!(prompt = step.prompt(), ?step, "calibration step");
        }
        Ok(step)
    }

    /// Move a fixed number of steps at calibration speed. Calibration only.
    pub fn jog(&mut self, direction: Direction, steps: u32) -> Result<()> {
        self.ensure_not_latched()?;
        if self.state != ShadeState::Calibrating {
            return Err(ShadeError::invalid("jog is only available while calibrating"));
        }
        if steps == 0 || direction == Direction::Stopped {
            return Err(ShadeError::invalid("jog needs a direction and steps > 0"));
        }
        let steps = steps.min(self.position.room(direction));
        if steps == 0 {
            warn!(?direction, "jog ignored at end of travel");
            return Ok(());
        }
        let target = self.offset_target(direction, steps);
        self.begin_job(direction, steps, self.calibration_speed, target)
    }

    // ── Safety ───────────────────────────────────────────────────────────────

    /// Force-stop and latch. Stays latched until `reset`.
    pub fn emergency_stop(&mut self, fault: Fault) {
        if let Err(e) = self.engine.stop() {
            error!(error = %e, "engine stop failed during emergency stop");
        }
        self.position.abort_calibration();
        self.target = None;
        if self.state == ShadeState::EmergencyStop {
            warn!(%fault, "emergency stop already latched");
            return;
        }
        error!(%fault, position = self.position.current_position(), "emergency stop latched");
        self.fault = Some(fault);
        self.set_state(ShadeState::EmergencyStop);
    }

    /// Leave EmergencyStop. No-op in any other state.
    pub fn reset(&mut self) -> Result<()> {
        if self.state == ShadeState::EmergencyStop {
            info!(fault = ?self.fault, "emergency stop cleared");
            self.fault = None;
            self.safety.reset();
            self.set_state(ShadeState::Idle);
        }
        Ok(())
    }

    /// One supervisory poll: fault input and step watchdog.
    pub fn supervise(&mut self) -> Option<Fault> {
        if self.state == ShadeState::EmergencyStop {
            return None;
        }
        let fault = self.safety.check(self.engine.is_moving(), self.steps_taken)?;
        self.emergency_stop(fault.clone());
        Some(fault)
    }

    // ── Tick ─────────────────────────────────────────────────────────────────

    /// Step-timer callback: one step, position update, target check.
    pub fn on_tick(&mut self) -> Result<()> {
        if !self.engine.is_moving() {
            return Ok(());
        }
        let direction = self.engine.direction();
        if self.position.check_step(direction).is_err() {
            warn!(position = self.position.current_position(), ?direction, "over-travel, stopping");
            return self.finish_job();
        }
        let event = match self.engine.on_tick() {
            Ok(Some(ev)) => ev,
            Ok(None) => return Ok(()),
            Err(e) => {
                let msg = match &e {
                    ShadeError::HardwareFault(m) => m.clone(),
                    other => other.to_string(),
                };
                self.emergency_stop(Fault::Hardware(msg));
                self.publish();
                return Err(e);
            }
        };
        self.steps_taken += 1;
        let outcome = self.position.on_step(event.direction);
        let pos = self.position.current_position();
        let reached = match (self.target, event.direction) {
            (Some(t), Direction::Up) => pos >= t,
            (Some(t), Direction::Down) => pos <= t,
            _ => false,
        };
        if event.completed() || reached || matches!(outcome, StepOutcome::OverTravel(_)) {
            return self.finish_job();
        }
        self.publish();
        Ok(())
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn ensure_not_latched(&self) -> Result<()> {
        if self.state == ShadeState::EmergencyStop {
            return Err(ShadeError::busy("emergency stop latched; reset required"));
        }
        Ok(())
    }

    fn ensure_motion_allowed(&self) -> Result<()> {
        self.ensure_not_latched()?;
        if self.state == ShadeState::Calibrating {
            return Err(ShadeError::busy("calibration in progress"));
        }
        Ok(())
    }

    fn move_to_limit(&mut self, direction: Direction) -> Result<()> {
        self.ensure_motion_allowed()?;
        if self.state == moving_state(direction) {
            return Ok(());
        }
        let room = self.position.room(direction);
        let steps = if self.position.is_calibrated() {
            room
        } else {
            room.min(self.nominal_steps)
        };
        if steps == 0 {
            debug!(?direction, "already at end of travel");
            return if self.engine.is_moving() {
                self.halt_motion()
            } else {
                Ok(())
            };
        }
        let target = self.offset_target(direction, steps);
        self.begin_job(direction, steps, self.speed, target)
    }

    fn travel_to(&mut self, target: u32) -> Result<()> {
        let current = self.position.current_position();
        if target == current {
            return if self.engine.is_moving() {
                self.halt_motion()
            } else {
                Ok(())
            };
        }
        if self.engine.is_moving() && self.target == Some(target) {
            return Ok(());
        }
        let (direction, steps) = if target > current {
            (Direction::Up, target - current)
        } else {
            (Direction::Down, current - target)
        };
        self.begin_job(direction, steps, self.speed, target)
    }

    fn offset_target(&self, direction: Direction, steps: u32) -> u32 {
        let current = self.position.current_position();
        match direction {
            Direction::Up => current.saturating_add(steps),
            Direction::Down => current.saturating_sub(steps),
            Direction::Stopped => current,
        }
    }

    fn begin_job(&mut self, direction: Direction, steps: u32, speed: u8, target: u32) -> Result<()> {
        let was_moving = self.engine.is_moving();
        if let Err(e) = self.engine.start(direction, steps, speed) {
            self.target = None;
            if self.state != ShadeState::Calibrating {
                self.set_state(ShadeState::Idle);
            }
            return self.latch_on_motion_fault(was_moving, Err(e));
        }
        self.target = Some(target);
        if self.state != ShadeState::Calibrating {
            self.set_state(moving_state(direction));
        }
        info!(?direction, steps, speed, target, "motion started");
        Ok(())
    }

    fn halt_motion(&mut self) -> Result<()> {
        let was_moving = self.engine.is_moving();
        let res = self.engine.stop();
        self.target = None;
        if matches!(self.state, ShadeState::MovingUp | ShadeState::MovingDown) {
            self.set_state(ShadeState::Idle);
        }
        if was_moving {
            info!(position = self.position.current_position(), "motion stopped");
        }
        self.latch_on_motion_fault(was_moving, res)
    }

    fn finish_job(&mut self) -> Result<()> {
        let res = self.engine.stop();
        self.target = None;
        if matches!(self.state, ShadeState::MovingUp | ShadeState::MovingDown) {
            self.set_state(ShadeState::Idle);
        }
        info!(position = self.position.current_position(), "motion complete");
        let res = self.latch_on_motion_fault(true, res);
        self.publish();
        res
    }

    fn latch_on_motion_fault(&mut self, was_moving: bool, res: Result<()>) -> Result<()> {
        if let Err(ShadeError::HardwareFault(msg)) = &res
            && was_moving
        {
            self.emergency_stop(Fault::Hardware(msg.clone()));
        }
        res
    }

    fn set_state(&mut self, next: ShadeState) {
        if self.state != next {
            info!(from = %self.state, to = %next, "state");
            self.state = next;
        }
    }

    fn publish(&mut self) {
        let Some(publisher) = &self.publisher else {
            return;
        };
        let status = self.status();
        if self.last_published != Some(status) {
            publisher.publish(status);
            self.last_published = Some(status);
        }
    }
}
