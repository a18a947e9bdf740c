//! Test and helper mocks for shade_core.
//!
//! Each mock is a cheap clonable handle over shared state so a test can keep
//! one handle while the engine owns another.
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use shade_traits::{CoilDriver, CoilPattern, HwResult, PositionSensor, StepTimer};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

#[derive(Debug, Default)]
struct TimerState {
    armed: Option<Duration>,
    arms: u32,
    cancels: u32,
    fail_next_arm: bool,
}

/// Step timer that never fires on its own; tests call `on_tick` directly.
#[derive(Debug, Clone, Default)]
pub struct ManualTimer {
    state: Arc<Mutex<TimerState>>,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently armed period, if any.
    pub fn armed(&self) -> Option<Duration> {
        lock(&self.state).armed
    }

    pub fn arm_count(&self) -> u32 {
        lock(&self.state).arms
    }

    pub fn cancel_count(&self) -> u32 {
        lock(&self.state).cancels
    }

    pub fn fail_next_arm(&self) {
        lock(&self.state).fail_next_arm = true;
    }
}

impl StepTimer for ManualTimer {
    fn arm(&mut self, period: Duration) -> HwResult<()> {
        let mut s = lock(&self.state);
        if std::mem::take(&mut s.fail_next_arm) {
            return Err(Box::new(std::io::Error::other("timer arm refused")));
        }
        s.armed = Some(period);
        s.arms += 1;
        Ok(())
    }

    fn cancel(&mut self) -> HwResult<()> {
        let mut s = lock(&self.state);
        s.armed = None;
        s.cancels += 1;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct CoilState {
    last: Option<CoilPattern>,
    writes: u64,
    enabled: bool,
    fail_writes: u32,
}

/// Coil driver that records what it was told.
#[derive(Debug, Clone, Default)]
pub struct RecordingCoils {
    state: Arc<Mutex<CoilState>>,
}

impl RecordingCoils {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<CoilPattern> {
        lock(&self.state).last
    }

    pub fn writes(&self) -> u64 {
        lock(&self.state).writes
    }

    pub fn enabled(&self) -> bool {
        lock(&self.state).enabled
    }

    pub fn fail_next_writes(&self, n: u32) {
        lock(&self.state).fail_writes = n;
    }
}

impl CoilDriver for RecordingCoils {
    fn energize(&mut self, pattern: CoilPattern) -> HwResult<()> {
        let mut s = lock(&self.state);
        if s.fail_writes > 0 {
            s.fail_writes -= 1;
            return Err(Box::new(std::io::Error::other("coil write failed")));
        }
        s.last = Some(pattern);
        s.writes += 1;
        Ok(())
    }

    fn set_enabled(&mut self, enabled: bool) -> HwResult<()> {
        lock(&self.state).enabled = enabled;
        Ok(())
    }
}

/// Position sensor returning a settable value.
#[derive(Debug, Clone, Default)]
pub struct FixedSensor {
    value: Arc<AtomicU32>,
    fail: Arc<AtomicBool>,
}

impl FixedSensor {
    pub fn new(value: u32) -> Self {
        Self {
            value: Arc::new(AtomicU32::new(value)),
            fail: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set(&self, value: u32) {
        self.value.store(value, Ordering::Relaxed);
    }

    /// Make every read time out until cleared.
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::Relaxed);
    }
}

impl PositionSensor for FixedSensor {
    fn read(&mut self, _timeout: Duration) -> HwResult<u32> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "sensor read timeout",
            )));
        }
        Ok(self.value.load(Ordering::Relaxed))
    }
}
