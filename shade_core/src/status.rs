//! Status snapshots and the latest-value publication channel.
use std::time::Duration;

use crossbeam_channel as xch;

/// Operating state of the shade. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShadeState {
    #[default]
    Idle,
    MovingUp,
    MovingDown,
    Calibrating,
    EmergencyStop,
}

impl ShadeState {
    pub fn as_str(self) -> &'static str {
        match self {
            ShadeState::Idle => "idle",
            ShadeState::MovingUp => "moving_up",
            ShadeState::MovingDown => "moving_down",
            ShadeState::Calibrating => "calibrating",
            ShadeState::EmergencyStop => "emergency_stop",
        }
    }
}

impl std::fmt::Display for ShadeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadeStatus {
    pub state: ShadeState,
    /// Rounded percentage of calibrated travel; `None` until calibrated.
    pub position_percentage: Option<u8>,
    pub is_moving: bool,
    /// Position in steps.
    pub position: u32,
}

/// Cover state as a home-automation bridge reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverState {
    Opening,
    Closing,
    Open,
    Closed,
}

impl CoverState {
    /// Only fully down reads as `Closed`; every other resting position,
    /// including an uncalibrated one, reads as `Open`.
    pub fn from_status(status: &ShadeStatus) -> Self {
        match status.state {
            ShadeState::MovingUp => CoverState::Opening,
            ShadeState::MovingDown => CoverState::Closing,
            _ if status.position_percentage == Some(0) => CoverState::Closed,
            _ => CoverState::Open,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CoverState::Opening => "opening",
            CoverState::Closing => "closing",
            CoverState::Open => "open",
            CoverState::Closed => "closed",
        }
    }
}

/// Create a status channel that only ever holds the newest snapshot.
pub fn status_channel() -> (StatusPublisher, StatusSubscriber) {
    let (tx, rx) = xch::bounded(1);
    (
        StatusPublisher {
            tx,
            drain: rx.clone(),
        },
        StatusSubscriber { rx },
    )
}

/// Sending half; never blocks.
#[derive(Debug, Clone)]
pub struct StatusPublisher {
    tx: xch::Sender<ShadeStatus>,
    drain: xch::Receiver<ShadeStatus>,
}

impl StatusPublisher {
    /// Replace whatever snapshot is waiting with `status`.
    pub fn publish(&self, status: ShadeStatus) {
        let mut status = status;
        for _ in 0..2 {
            match self.tx.try_send(status) {
                Ok(()) => return,
                Err(xch::TrySendError::Full(s)) => {
                    let _ = self.drain.try_recv();
                    status = s;
                }
                Err(xch::TrySendError::Disconnected(_)) => return,
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatusSubscriber {
    rx: xch::Receiver<ShadeStatus>,
}

impl StatusSubscriber {
    /// Newest snapshot published since the last call, if any.
    pub fn latest(&self) -> Option<ShadeStatus> {
        self.rx.try_iter().last()
    }

    /// Wait up to `timeout` for the next snapshot.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ShadeStatus> {
        self.rx.recv_timeout(timeout).ok()
    }
}
