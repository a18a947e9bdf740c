//! Command execution against a running shade: the stdin loop, one-shot
//! moves, guided calibration and the checks.

use std::io::BufRead;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel as xch;
use serde_json::json;
use shade_core::{
    CalibrationStep, CommandSender, Direction, Fault, ShadeCommand, ShadeError, ShadeRuntime,
    ShadeState, ShadeStatus,
};

use crate::backend::Backend;
use crate::protocol::{Line, error_line, parse_line, status_line};

const POLL: Duration = Duration::from_millis(10);

/// Where results go: text or JSON lines on stdout.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
}

impl Output {
    pub fn status(self, status: &ShadeStatus) {
        println!("{}", status_line(status, self.json));
    }

    pub fn rejected(self, err: &ShadeError) {
        println!("{}", error_line(err, self.json));
    }

    pub fn event(self, value: &serde_json::Value, text: &str) {
        if self.json {
            println!("{value}");
        } else {
            println!("{text}");
        }
    }
}

pub struct Session {
    runtime: ShadeRuntime,
    commands: CommandSender,
    shutdown: Arc<AtomicBool>,
    out: Output,
    /// Last state printed, shared with the watcher to avoid repeats.
    reported: Arc<Mutex<Option<ShadeState>>>,
    steps_per_revolution: u32,
    pub backend_name: &'static str,
    pub sim: Option<shade_hardware::SimulatedShade>,
}

impl Session {
    pub fn start(
        backend: Backend,
        shutdown: Arc<AtomicBool>,
        out: Output,
        steps_per_revolution: u32,
    ) -> eyre::Result<Self> {
        let runtime = ShadeRuntime::spawn(backend.builder)?;
        let commands = runtime.commands();
        Ok(Self {
            runtime,
            commands,
            shutdown,
            out,
            reported: Arc::new(Mutex::new(None)),
            steps_per_revolution,
            backend_name: backend.name,
            sim: backend.sim,
        })
    }

    /// Send one command and wait for motion it started to finish.
    pub fn run_to_completion(&self, cmd: impl Into<ShadeCommand>) -> eyre::Result<ShadeStatus> {
        self.commands.send(cmd)?;
        self.wait_idle()
    }

    /// Block until the shade stops. Ctrl-C stops the motion and returns the
    /// stopped status; an emergency stop is returned as its `Fault`.
    pub fn wait_idle(&self) -> eyre::Result<ShadeStatus> {
        loop {
            let st = self.commands.status()?;
            if st.state == ShadeState::EmergencyStop {
                return Err(self.latched_fault().into());
            }
            if !st.is_moving {
                return Ok(st);
            }
            if self.shutdown.load(Ordering::Relaxed) {
                tracing::info!("interrupted, stopping");
                return Ok(self.commands.stop()?);
            }
            std::thread::sleep(POLL);
        }
    }

    fn report(&self, st: &ShadeStatus) {
        *self.reported.lock().unwrap_or_else(|p| p.into_inner()) = Some(st.state);
        self.out.status(st);
    }

    fn latched_fault(&self) -> Fault {
        let ctrl = self.runtime.controller();
        let guard = ctrl.lock().unwrap_or_else(|p| p.into_inner());
        guard.fault().cloned().unwrap_or(Fault::Requested)
    }

    /// Read protocol lines until QUIT, end of input or Ctrl-C.
    ///
    /// Every reply is printed as a status or error line; state changes made
    /// by the controller on its own (job complete, emergency stop) are
    /// printed by a watcher thread.
    pub fn run_lines(&self, input: impl BufRead + Send + 'static) -> eyre::Result<()> {
        self.report(&self.commands.status()?);
        let lines = spawn_reader(input);
        let watcher_stop = Arc::new(AtomicBool::new(false));
        let watcher = self.spawn_watcher(watcher_stop.clone());

        let res = self.line_loop(&lines);

        watcher_stop.store(true, Ordering::Relaxed);
        if watcher.join().is_err() {
            tracing::warn!("status watcher panicked");
        }
        // printed after the watcher is gone so it is always the last line
        self.out.status(&res?);
        Ok(())
    }

    /// Returns the final status once the session ends.
    fn line_loop(&self, lines: &xch::Receiver<String>) -> eyre::Result<ShadeStatus> {
        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                return Ok(self.commands.stop()?);
            }
            let line = match lines.recv_timeout(Duration::from_millis(100)) {
                Ok(l) => l,
                Err(xch::RecvTimeoutError::Timeout) => continue,
                // end of input: let a running move finish
                Err(xch::RecvTimeoutError::Disconnected) => return self.wait_idle(),
            };
            match parse_line(&line, self.steps_per_revolution) {
                Ok(Line::Empty) => {}
                Ok(Line::Quit) => return Ok(self.commands.stop()?),
                Ok(Line::Command(cmd)) => match self.commands.send(cmd) {
                    Ok(st) => self.report(&st),
                    Err(ShadeError::Disconnected) => return Err(ShadeError::Disconnected.into()),
                    Err(e) => self.out.rejected(&e),
                },
                Err(msg) => self.out.rejected(&ShadeError::InvalidArgument(msg)),
            }
        }
    }

    fn spawn_watcher(&self, stop: Arc<AtomicBool>) -> std::thread::JoinHandle<()> {
        let status = self.runtime.status();
        let reported = self.reported.clone();
        let out = self.out;
        std::thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                let Some(st) = status.recv_timeout(Duration::from_millis(50)) else {
                    continue;
                };
                let mut last = reported.lock().unwrap_or_else(|p| p.into_inner());
                if *last != Some(st.state) {
                    *last = Some(st.state);
                    out.status(&st);
                }
            }
        })
    }

    /// Guided calibration. Interactive sessions read JOG / NEXT / STOP lines;
    /// `auto` scripts the sequence over `span` steps (simulator only).
    pub fn calibrate(&self, input: impl BufRead + Send + 'static, auto: bool, span: u32) -> eyre::Result<()> {
        if auto && self.sim.is_none() {
            eyre::bail!("calibrate --auto is only available with the simulator backend");
        }
        self.commands.calibrate()?;
        self.prompt(CalibrationStep::UpperLimit);

        if auto {
            self.run_to_completion(ShadeCommand::Jog { direction: Direction::Up, steps: span })?;
            self.advance()?;
            self.run_to_completion(ShadeCommand::Jog { direction: Direction::Down, steps: span })?;
            self.advance()?;
            let step = self.advance()?;
            return self.finish_calibration(step);
        }

        let lines = spawn_reader(input);
        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                self.commands.stop()?;
                eyre::bail!("calibration interrupted");
            }
            let line = match lines.recv_timeout(Duration::from_millis(100)) {
                Ok(l) => l,
                Err(xch::RecvTimeoutError::Timeout) => continue,
                Err(xch::RecvTimeoutError::Disconnected) => {
                    self.commands.stop()?;
                    eyre::bail!("calibration abandoned: input closed before completion");
                }
            };
            let cmd = match parse_line(&line, self.steps_per_revolution) {
                // a bare Enter confirms the current step
                Ok(Line::Empty) => ShadeCommand::AdvanceCalibration,
                Ok(Line::Quit) => {
                    self.commands.stop()?;
                    eyre::bail!("calibration abandoned");
                }
                Ok(Line::Command(cmd)) => cmd,
                Err(msg) => {
                    self.out.rejected(&ShadeError::InvalidArgument(msg));
                    continue;
                }
            };
            match cmd {
                ShadeCommand::AdvanceCalibration => match self.advance() {
                    Ok(CalibrationStep::Complete) => return self.finish_calibration(CalibrationStep::Complete),
                    Ok(step) => self.prompt(step),
                    Err(e) => {
                        self.out.rejected(&e);
                        self.prompt(self.current_step());
                    }
                },
                ShadeCommand::Jog { .. } => match self.run_to_completion(cmd) {
                    Ok(st) => self.out.status(&st),
                    Err(e) => match e.downcast::<ShadeError>() {
                        Ok(se) => self.out.rejected(&se),
                        Err(other) => return Err(other),
                    },
                },
                other => match self.commands.send(other) {
                    Ok(st) if st.state != ShadeState::Calibrating => {
                        eyre::bail!("calibration abandoned");
                    }
                    Ok(st) => self.out.status(&st),
                    Err(e) => self.out.rejected(&e),
                },
            }
        }
    }

    fn advance(&self) -> Result<CalibrationStep, ShadeError> {
        self.commands.advance_calibration()?;
        Ok(self.current_step())
    }

    fn current_step(&self) -> CalibrationStep {
        let ctrl = self.runtime.controller();
        let guard = ctrl.lock().unwrap_or_else(|p| p.into_inner());
        guard.calibration_step().unwrap_or(CalibrationStep::Complete)
    }

    fn prompt(&self, step: CalibrationStep) {
        self.out.event(
            &json!({ "type": "calibration_step", "step": format!("{step:?}"), "prompt": step.prompt() }),
            &format!("{}  (JOG UP|DOWN <n>, Enter to confirm, STOP to abort)", step.prompt()),
        );
    }

    fn finish_calibration(&self, step: CalibrationStep) -> eyre::Result<()> {
        if step != CalibrationStep::Complete {
            eyre::bail!("calibration did not complete (stuck at {step:?})");
        }
        let ctrl = self.runtime.controller();
        let data = ctrl
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .calibration_data()
            .ok_or(ShadeError::NotCalibrated)?;
        self.out.event(
            &json!({
                "type": "calibration",
                "min_position": data.min_position,
                "max_position": data.max_position,
                "zebra_offset": data.zebra_offset,
            }),
            &format!(
                "calibration complete: min={} max={} offset={}",
                data.min_position, data.max_position, data.zebra_offset
            ),
        );
        Ok(())
    }

    /// Report the backend and the position read at startup.
    pub fn self_check(&self) -> eyre::Result<()> {
        let st = self.commands.status()?;
        let calibrated = st.position_percentage.is_some();
        self.out.event(
            &json!({
                "type": "self_check",
                "backend": self.backend_name,
                "position": st.position,
                "calibrated": calibrated,
                "state": st.state.as_str(),
            }),
            &format!(
                "self-check ok: backend={} position={} calibrated={calibrated}",
                self.backend_name, st.position
            ),
        );
        Ok(())
    }
}

/// Forward lines from `input` to a channel. The reader thread is detached:
/// it may stay blocked on stdin until the process exits.
fn spawn_reader(input: impl BufRead + Send + 'static) -> xch::Receiver<String> {
    let (tx, rx) = xch::unbounded();
    std::thread::spawn(move || {
        for line in input.lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}
