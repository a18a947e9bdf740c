//! Supervisory thread and the threaded runtime.
//!
//! All command sources share one inbound queue. The supervisor thread applies
//! each command to the controller under its mutex and sends the result back
//! to the caller, so a rejection reaches the source that issued it. Between
//! commands it polls the fault input and the step watchdog every `poll_ms`.
//!
//! Safety: each spawned thread is joined when its owner is dropped.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crossbeam_channel as xch;
use shade_traits::{CoilDriver, PositionSensor, StepTimer};
use tracing::{debug, error, warn};

use crate::builder::{Missing, Set, Shade, ShadeBuilder};
use crate::controller::{Controller, MotionCommand, ShadeCommand};
use crate::error::{Result, ShadeError};
use crate::pulse::Direction;
use crate::status::{ShadeStatus, StatusSubscriber, status_channel};
use crate::ticker::{Ticker, tick_channel};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

struct Request {
    cmd: ShadeCommand,
    reply: xch::Sender<Result<ShadeStatus>>,
}

/// Cloneable handle every command source uses.
#[derive(Clone)]
pub struct CommandSender {
    tx: xch::Sender<Request>,
}

impl CommandSender {
    /// Enqueue `cmd` and wait for the controller's verdict.
    pub fn send(&self, cmd: impl Into<ShadeCommand>) -> Result<ShadeStatus> {
        let (reply, rx) = xch::bounded(1);
        self.tx
            .send(Request {
                cmd: cmd.into(),
                reply,
            })
            .map_err(|_| ShadeError::Disconnected)?;
        rx.recv().map_err(|_| ShadeError::Disconnected)?
    }

    pub fn move_up(&self) -> Result<ShadeStatus> {
        self.send(MotionCommand::MoveUp)
    }

    pub fn move_down(&self) -> Result<ShadeStatus> {
        self.send(MotionCommand::MoveDown)
    }

    pub fn stop(&self) -> Result<ShadeStatus> {
        self.send(MotionCommand::Stop)
    }

    pub fn move_to_percentage(&self, percentage: u8) -> Result<ShadeStatus> {
        self.send(MotionCommand::MoveToPercentage(percentage))
    }

    pub fn set_position_percentage(&self, percentage: f32) -> Result<ShadeStatus> {
        self.send(ShadeCommand::SetPositionPercentage(percentage))
    }

    pub fn calibrate(&self) -> Result<ShadeStatus> {
        self.send(MotionCommand::Calibrate)
    }

    pub fn advance_calibration(&self) -> Result<ShadeStatus> {
        self.send(ShadeCommand::AdvanceCalibration)
    }

    pub fn jog(&self, direction: Direction, steps: u32) -> Result<ShadeStatus> {
        self.send(ShadeCommand::Jog { direction, steps })
    }

    pub fn reset(&self) -> Result<ShadeStatus> {
        self.send(ShadeCommand::Reset)
    }

    pub fn status(&self) -> Result<ShadeStatus> {
        self.send(ShadeCommand::Status)
    }
}

pub struct Supervisor {
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl Supervisor {
    /// Spawn the supervisory loop and return it with the command handle.
    pub fn spawn<C, S, T>(
        controller: Arc<Mutex<Controller<C, S, T>>>,
        poll: Duration,
    ) -> (Self, CommandSender)
    where
        C: CoilDriver + Send + 'static,
        S: PositionSensor + Send + 'static,
        T: StepTimer + Send + 'static,
    {
        let (tx, rx) = xch::unbounded::<Request>();
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let poll = poll.max(Duration::from_millis(1));

        let join_handle = std::thread::spawn(move || {
            let mut next_poll = Instant::now() + poll;
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    debug!("supervisor received shutdown signal");
                    break;
                }
                match rx.recv_deadline(next_poll) {
                    Ok(req) => {
                        let res = lock(&controller).handle(req.cmd);
                        // caller may have given up waiting
                        let _ = req.reply.send(res);
                    }
                    Err(xch::RecvTimeoutError::Timeout) => {}
                    Err(xch::RecvTimeoutError::Disconnected) => break,
                }
                let now = Instant::now();
                if now >= next_poll {
                    if let Some(fault) = lock(&controller).supervise() {
                        error!(%fault, "supervisor tripped emergency stop");
                    }
                    next_poll += poll;
                    if next_poll <= now {
                        next_poll = now + poll;
                    }
                }
            }
            tracing::trace!("supervisor thread exiting cleanly");
        });

        (
            Self {
                shutdown,
                join_handle: Some(join_handle),
            },
            CommandSender { tx },
        )
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        // the loop wakes at least once per poll period
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("supervisor thread joined"),
                Err(e) => warn!(?e, "supervisor thread panicked during shutdown"),
            }
        }
    }
}

/// A running shade: controller, tick thread and supervisor thread.
pub struct ShadeRuntime {
    controller: Arc<Mutex<Shade>>,
    commands: CommandSender,
    status: StatusSubscriber,
    supervisor: Option<Supervisor>,
    ticker: Option<Ticker>,
}

impl ShadeRuntime {
    /// Build the controller around a tick-thread timer and start both threads.
    pub fn spawn(builder: ShadeBuilder<Set, Set, Missing>) -> eyre::Result<Self> {
        let (timer, source) = tick_channel();
        let (publisher, status) = status_channel();
        let poll = Duration::from_millis(builder.supervisor_cfg().poll_ms);
        let shade = builder
            .with_timer(timer)
            .with_status_publisher(publisher)
            .build()?;
        let controller = Arc::new(Mutex::new(shade));

        let tick_ctrl = controller.clone();
        let ticker = Ticker::spawn(source, move || {
            if let Err(e) = lock(&tick_ctrl).on_tick() {
                error!(error = %e, "tick failed");
            }
        });
        let (supervisor, commands) = Supervisor::spawn(controller.clone(), poll);

        Ok(Self {
            controller,
            commands,
            status,
            supervisor: Some(supervisor),
            ticker: Some(ticker),
        })
    }

    pub fn commands(&self) -> CommandSender {
        self.commands.clone()
    }

    pub fn status(&self) -> StatusSubscriber {
        self.status.clone()
    }

    /// Direct access to the controller, for inspection.
    pub fn controller(&self) -> Arc<Mutex<Shade>> {
        self.controller.clone()
    }
}

impl Drop for ShadeRuntime {
    fn drop(&mut self) {
        drop(self.supervisor.take());
        if let Err(e) = lock(&self.controller).stop() {
            warn!(error = %e, "stop on shutdown failed");
        }
        drop(self.ticker.take());
    }
}
