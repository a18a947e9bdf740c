//! Fault-input debounce and the step-progress watchdog.
//!
//! Polled by the supervisor at `SupervisorCfg::poll_ms`; time is read from a
//! `Clock` so tests can drive the watchdog deterministically.
use std::sync::Arc;
use std::time::Instant;

use shade_traits::{Clock, MonotonicClock};

use crate::config::SupervisorCfg;
use crate::error::Fault;

/// Returns true while the fault line is asserted.
pub type FaultCheck = Box<dyn Fn() -> bool + Send + Sync>;

pub struct SafetyMonitor {
    clock: Arc<dyn Clock + Send + Sync>,
    fault_check: Option<FaultCheck>,
    fault_debounce_n: u8,
    fault_count: u8,
    watchdog_ms: u64,
    last_steps: u64,
    last_progress: Instant,
}

impl Default for SafetyMonitor {
    fn default() -> Self {
        Self::new(&SupervisorCfg::default(), Arc::new(MonotonicClock::new()), None)
    }
}

impl SafetyMonitor {
    pub fn new(
        cfg: &SupervisorCfg,
        clock: Arc<dyn Clock + Send + Sync>,
        fault_check: Option<FaultCheck>,
    ) -> Self {
        let now = clock.now();
        Self {
            clock,
            fault_check,
            fault_debounce_n: cfg.fault_debounce_n.max(1),
            fault_count: 0,
            watchdog_ms: cfg.watchdog_ms,
            last_steps: 0,
            last_progress: now,
        }
    }

    /// One supervisory poll. `steps_taken` is the controller's monotonic step
    /// counter; it must advance while `moving` or the watchdog trips.
    pub fn check(&mut self, moving: bool, steps_taken: u64) -> Option<Fault> {
        if self.poll_fault_input() {
            return Some(Fault::MotorFault);
        }

        let now = self.clock.now();
        if !moving || steps_taken != self.last_steps {
            self.last_steps = steps_taken;
            self.last_progress = now;
            return None;
        }
        if self.clock.ms_since(self.last_progress) >= self.watchdog_ms {
            self.last_progress = now;
            return Some(Fault::WatchdogTimeout);
        }
        None
    }

    /// Forget partial debounce counts and restart the watchdog window.
    pub fn reset(&mut self) {
        self.fault_count = 0;
        self.last_progress = self.clock.now();
    }

    fn poll_fault_input(&mut self) -> bool {
        if let Some(check) = &self.fault_check {
            if check() {
                self.fault_count = self.fault_count.saturating_add(1);
                if self.fault_count >= self.fault_debounce_n {
                    self.fault_count = 0;
                    return true;
                }
            } else {
                self.fault_count = 0;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shade_traits::ManualClock;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn monitor(clock: &ManualClock, check: Option<FaultCheck>) -> SafetyMonitor {
        let cfg = SupervisorCfg {
            poll_ms: 100,
            watchdog_ms: 500,
            fault_debounce_n: 3,
        };
        SafetyMonitor::new(&cfg, Arc::new(clock.clone()), check)
    }

    #[test]
    fn fault_needs_consecutive_hits() {
        let clock = ManualClock::new();
        let line = Arc::new(AtomicBool::new(true));
        let l = line.clone();
        let mut m = monitor(&clock, Some(Box::new(move || l.load(Ordering::Relaxed))));
        assert_eq!(m.check(false, 0), None);
        assert_eq!(m.check(false, 0), None);
        line.store(false, Ordering::Relaxed);
        assert_eq!(m.check(false, 0), None);
        line.store(true, Ordering::Relaxed);
        assert_eq!(m.check(false, 0), None);
        assert_eq!(m.check(false, 0), None);
        assert_eq!(m.check(false, 0), Some(Fault::MotorFault));
    }

    #[test]
    fn watchdog_trips_only_without_progress() {
        let clock = ManualClock::new();
        let mut m = monitor(&clock, None);
        assert_eq!(m.check(true, 1), None);
        clock.advance(Duration::from_millis(400));
        assert_eq!(m.check(true, 2), None);
        clock.advance(Duration::from_millis(400));
        assert_eq!(m.check(true, 2), None);
        clock.advance(Duration::from_millis(100));
        assert_eq!(m.check(true, 2), Some(Fault::WatchdogTimeout));
    }

    #[test]
    fn idle_never_trips_watchdog() {
        let clock = ManualClock::new();
        let mut m = monitor(&clock, None);
        clock.advance(Duration::from_secs(60));
        assert_eq!(m.check(false, 0), None);
    }
}
