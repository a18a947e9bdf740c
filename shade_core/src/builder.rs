//! Type-state builder for the boxed `Shade` controller.
//!
//! `build()` is only available once coils, sensor and timer are set;
//! `try_build()` is always available and reports what is missing.
use std::marker::PhantomData;
use std::sync::Arc;

use eyre::WrapErr;
use shade_traits::{Clock, CoilDriver, MonotonicClock, PositionSensor, StepTimer};
use tracing::info;

use crate::config::{MotorCfg, SupervisorCfg, Timeouts, TravelCfg};
use crate::controller::{CalibrationSink, Controller};
use crate::error::BuildError;
use crate::position::{CalibrationData, PositionEstimator};
use crate::pulse::PulseEngine;
use crate::safety::{FaultCheck, SafetyMonitor};
use crate::status::StatusPublisher;

pub type BoxedCoils = Box<dyn CoilDriver + Send>;
pub type BoxedSensor = Box<dyn PositionSensor + Send>;
pub type BoxedTimer = Box<dyn StepTimer + Send>;

/// Controller over boxed hardware, as the runtime and CLI use it.
pub type Shade = Controller<BoxedCoils, BoxedSensor, BoxedTimer>;

impl Shade {
    /// Start building a Shade.
    pub fn builder() -> ShadeBuilder<Missing, Missing, Missing> {
        ShadeBuilder::default()
    }
}

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

pub struct ShadeBuilder<C, S, T> {
    coils: Option<BoxedCoils>,
    sensor: Option<BoxedSensor>,
    timer: Option<BoxedTimer>,
    motor: MotorCfg,
    travel: TravelCfg,
    supervisor: SupervisorCfg,
    timeouts: Timeouts,
    calibration: Option<CalibrationData>,
    fault_check: Option<FaultCheck>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    publisher: Option<StatusPublisher>,
    calibration_sink: Option<CalibrationSink>,
    _c: PhantomData<C>,
    _s: PhantomData<S>,
    _t: PhantomData<T>,
}

impl Default for ShadeBuilder<Missing, Missing, Missing> {
    fn default() -> Self {
        Self {
            coils: None,
            sensor: None,
            timer: None,
            motor: MotorCfg::default(),
            travel: TravelCfg::default(),
            supervisor: SupervisorCfg::default(),
            timeouts: Timeouts::default(),
            calibration: None,
            fault_check: None,
            clock: None,
            publisher: None,
            calibration_sink: None,
            _c: PhantomData,
            _s: PhantomData,
            _t: PhantomData,
        }
    }
}

impl<C, S, T> ShadeBuilder<C, S, T> {
    fn retype<C2, S2, T2>(self) -> ShadeBuilder<C2, S2, T2> {
        ShadeBuilder {
            coils: self.coils,
            sensor: self.sensor,
            timer: self.timer,
            motor: self.motor,
            travel: self.travel,
            supervisor: self.supervisor,
            timeouts: self.timeouts,
            calibration: self.calibration,
            fault_check: self.fault_check,
            clock: self.clock,
            publisher: self.publisher,
            calibration_sink: self.calibration_sink,
            _c: PhantomData,
            _s: PhantomData,
            _t: PhantomData,
        }
    }

    pub fn with_coils(mut self, coils: impl CoilDriver + Send + 'static) -> ShadeBuilder<Set, S, T> {
        self.coils = Some(Box::new(coils));
        self.retype()
    }

    pub fn with_sensor(
        mut self,
        sensor: impl PositionSensor + Send + 'static,
    ) -> ShadeBuilder<C, Set, T> {
        self.sensor = Some(Box::new(sensor));
        self.retype()
    }

    pub fn with_timer(mut self, timer: impl StepTimer + Send + 'static) -> ShadeBuilder<C, S, Set> {
        self.timer = Some(Box::new(timer));
        self.retype()
    }

    pub fn with_motor(mut self, motor: MotorCfg) -> Self {
        self.motor = motor;
        self
    }

    pub fn with_travel(mut self, travel: TravelCfg) -> Self {
        self.travel = travel;
        self
    }

    pub fn with_supervisor(mut self, supervisor: SupervisorCfg) -> Self {
        self.supervisor = supervisor;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Persisted calibration to restore at startup; `None` starts uncalibrated.
    pub fn with_calibration(mut self, calibration: Option<CalibrationData>) -> Self {
        self.calibration = calibration;
        self
    }

    /// Motor driver fault input, polled with debounce by the supervisor.
    pub fn with_fault_check(mut self, check: FaultCheck) -> Self {
        self.fault_check = Some(check);
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + Send + Sync + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    pub fn with_status_publisher(mut self, publisher: StatusPublisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn with_calibration_sink(mut self, sink: CalibrationSink) -> Self {
        self.calibration_sink = Some(sink);
        self
    }

    pub fn supervisor_cfg(&self) -> &SupervisorCfg {
        &self.supervisor
    }

    /// Validate and construct; reads the sensor once to seed the position.
    pub fn try_build(self) -> eyre::Result<Shade> {
        let coils = self
            .coils
            .ok_or_else(|| eyre::Report::new(BuildError::MissingCoils))?;
        let sensor = self
            .sensor
            .ok_or_else(|| eyre::Report::new(BuildError::MissingSensor))?;
        let timer = self
            .timer
            .ok_or_else(|| eyre::Report::new(BuildError::MissingTimer))?;
        validate(&self.motor, &self.travel, &self.supervisor, &self.timeouts)?;

        let engine = PulseEngine::new(coils, timer, &self.motor);
        let estimator = PositionEstimator::new(sensor, &self.timeouts);
        let mut shade = Controller::new(engine, estimator, &self.motor, &self.travel);

        let clock: Arc<dyn Clock + Send + Sync> = match self.clock {
            Some(c) => c,
            None => Arc::new(MonotonicClock::new()),
        };
        shade.set_safety_monitor(SafetyMonitor::new(&self.supervisor, clock, self.fault_check));

        shade
            .estimator_mut()
            .restore(self.calibration)
            .wrap_err("restore calibration")?;
        let pos = shade
            .estimator_mut()
            .resync()
            .wrap_err("initial position read")?;
        info!(
            position = pos,
            calibrated = shade.is_calibrated(),
            "shade controller ready"
        );

        if let Some(sink) = self.calibration_sink {
            shade.set_calibration_sink(sink);
        }
        if let Some(p) = self.publisher {
            shade.set_status_publisher(p);
        }
        Ok(shade)
    }
}

impl ShadeBuilder<Set, Set, Set> {
    pub fn build(self) -> eyre::Result<Shade> {
        self.try_build()
    }
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

fn validate(
    motor: &MotorCfg,
    travel: &TravelCfg,
    supervisor: &SupervisorCfg,
    timeouts: &Timeouts,
) -> eyre::Result<()> {
    if motor.min_step_delay_us == 0 {
        return Err(invalid("min_step_delay_us must be >= 1"));
    }
    if motor.min_step_delay_us >= motor.max_step_delay_us {
        return Err(invalid("min_step_delay_us must be < max_step_delay_us"));
    }
    if motor.steps_per_revolution == 0 {
        return Err(invalid("steps_per_revolution must be > 0"));
    }
    if travel.nominal_steps == 0 {
        return Err(invalid("nominal_steps must be > 0"));
    }
    if supervisor.poll_ms == 0 {
        return Err(invalid("poll_ms must be >= 1"));
    }
    if supervisor.watchdog_ms <= supervisor.poll_ms {
        return Err(invalid("watchdog_ms must be > poll_ms"));
    }
    if supervisor.watchdog_ms.saturating_mul(1000) <= 2 * u64::from(motor.max_step_delay_us) {
        return Err(invalid("watchdog_ms must exceed two slowest step periods"));
    }
    if supervisor.fault_debounce_n == 0 {
        return Err(invalid("fault_debounce_n must be >= 1"));
    }
    if timeouts.sensor_ms == 0 {
        return Err(invalid("sensor_ms must be >= 1"));
    }
    Ok(())
}
