//! Step tick thread.
//!
//! `TickTimer` is the `StepTimer` handed to the pulse engine: arming and
//! cancelling only send a control message, so they never block. The `Ticker`
//! thread owns the receiving end and fires the tick callback at the armed
//! period using `recv_deadline`. Control messages are always drained before
//! a due tick fires, so a cancel is never followed by a stale step.
//!
//! Safety: the thread is joined when the `Ticker` is dropped.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel as xch;
use shade_traits::{HwResult, StepTimer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCtl {
    Arm(Duration),
    Cancel,
    Shutdown,
}

/// Engine-side handle of the tick thread.
#[derive(Debug, Clone)]
pub struct TickTimer {
    tx: xch::Sender<TimerCtl>,
}

impl TickTimer {
    fn send(&self, msg: TimerCtl) -> HwResult<()> {
        self.tx
            .send(msg)
            .map_err(|_| std::io::Error::other("tick thread is gone").into())
    }
}

impl StepTimer for TickTimer {
    fn arm(&mut self, period: Duration) -> HwResult<()> {
        self.send(TimerCtl::Arm(period))
    }

    fn cancel(&mut self) -> HwResult<()> {
        self.send(TimerCtl::Cancel)
    }
}

/// Receiving end, consumed by `Ticker::spawn`.
pub struct TickSource {
    tx: xch::Sender<TimerCtl>,
    rx: xch::Receiver<TimerCtl>,
}

pub fn tick_channel() -> (TickTimer, TickSource) {
    let (tx, rx) = xch::unbounded();
    (TickTimer { tx: tx.clone() }, TickSource { tx, rx })
}

pub struct Ticker {
    tx: xch::Sender<TimerCtl>,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl Ticker {
    pub fn spawn<F: FnMut() + Send + 'static>(source: TickSource, mut on_tick: F) -> Self {
        let TickSource { tx, rx } = source;
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();

        let join_handle = std::thread::spawn(move || {
            let mut period: Option<Duration> = None;
            let mut next = Instant::now();
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }
                let msg = match period {
                    Some(_) => rx.recv_deadline(next),
                    None => rx.recv().map_err(|_| xch::RecvTimeoutError::Disconnected),
                };
                match msg {
                    Ok(TimerCtl::Arm(p)) => {
                        period = Some(p);
                        next = Instant::now() + p;
                    }
                    Ok(TimerCtl::Cancel) => period = None,
                    Ok(TimerCtl::Shutdown) | Err(xch::RecvTimeoutError::Disconnected) => break,
                    Err(xch::RecvTimeoutError::Timeout) => {
                        if !rx.is_empty() {
                            continue;
                        }
                        on_tick();
                        if let Some(p) = period {
                            let now = Instant::now();
                            next += p;
                            // fell behind: skip missed ticks instead of bursting
                            if next < now {
                                next = now;
                            }
                        }
                    }
                }
            }
            tracing::trace!("ticker thread exiting cleanly");
        });

        Self {
            tx,
            shutdown,
            join_handle: Some(join_handle),
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        let _ = self.tx.send(TimerCtl::Shutdown);
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("ticker thread joined"),
                Err(e) => tracing::warn!(?e, "ticker thread panicked during shutdown"),
            }
        }
    }
}
