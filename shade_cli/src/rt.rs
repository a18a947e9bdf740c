//! Real-time scheduling helpers (Linux SCHED_FIFO + mlockall).
//!
//! Failures are warnings: a shade still works without real-time scheduling,
//! only with more step jitter.

use crate::cli::RtLock;

#[cfg(target_os = "linux")]
pub fn setup_rt_once(prio: Option<i32>, lock: RtLock) {
    use std::sync::OnceLock;
    static RT_ONCE: OnceLock<()> = OnceLock::new();

    RT_ONCE.get_or_init(|| {
        match apply_mem_lock(lock) {
            Ok(()) => tracing::info!(?lock, "RT: memory lock applied"),
            Err(err) => tracing::warn!(error = %err, "mlockall failed"),
        }
        match apply_fifo_priority(prio) {
            Ok(p) => tracing::info!(priority = p, "RT: SCHED_FIFO enabled"),
            Err(err) => {
                let prio_dbg = prio.map_or_else(|| "(max)".into(), |p| p.to_string());
                tracing::warn!(error = %err, prio = %prio_dbg, "sched_setscheduler(SCHED_FIFO) failed");
            }
        }
    });
}

#[cfg(target_os = "linux")]
fn is_retryable_memlock_error(err: &std::io::Error) -> bool {
    matches!(err.raw_os_error(), Some(code) if code == libc::EPERM || code == libc::ENOMEM)
}

#[cfg(target_os = "linux")]
fn mlockall(flags: libc::c_int) -> std::io::Result<()> {
    // SAFETY: mlockall takes no pointers; it only changes process paging state.
    let rc = unsafe { libc::mlockall(flags) };
    if rc != 0 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(target_os = "linux")]
fn memlock_limit_hint() -> Option<String> {
    let mut rlim = std::mem::MaybeUninit::<libc::rlimit>::uninit();
    // SAFETY: getrlimit writes a full rlimit into the provided buffer on success.
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_MEMLOCK, rlim.as_mut_ptr()) };
    if rc != 0 {
        return None;
    }
    // SAFETY: rc == 0, so the buffer was initialized.
    let cur = unsafe { rlim.assume_init() }.rlim_cur;
    if cur == libc::RLIM_INFINITY {
        Some("memlock limit: unlimited".to_string())
    } else {
        Some(format!("memlock limit: {} KiB", cur / 1024))
    }
}

#[cfg(target_os = "linux")]
fn apply_mem_lock(lock: RtLock) -> eyre::Result<()> {
    use libc::{MCL_CURRENT, MCL_FUTURE};

    let attempted_all = matches!(lock, RtLock::All);
    let err = match lock {
        RtLock::None => return Ok(()),
        RtLock::Current => mlockall(MCL_CURRENT),
        RtLock::All => mlockall(MCL_CURRENT | MCL_FUTURE),
    };
    let Err(err) = err else {
        return Ok(());
    };

    // All failed for lack of privilege or memory: settle for Current
    if attempted_all && is_retryable_memlock_error(&err) && mlockall(MCL_CURRENT).is_ok() {
        tracing::warn!("mlockall(current|future) failed; locked current pages only");
        return Ok(());
    }

    let mut msg = format!(
        "mlockall({}) failed: {err}",
        if attempted_all { "current|future" } else { "current" }
    );
    if is_retryable_memlock_error(&err) {
        if let Some(h) = memlock_limit_hint() {
            msg.push_str("; ");
            msg.push_str(&h);
        }
        msg.push_str("; hint: needs CAP_IPC_LOCK (or root) and sufficient 'ulimit -l'");
    }
    Err(eyre::eyre!(msg))
}

#[cfg(target_os = "linux")]
fn apply_fifo_priority(prio: Option<i32>) -> eyre::Result<i32> {
    use libc::{SCHED_FIFO, sched_get_priority_max, sched_get_priority_min, sched_param};

    // SAFETY: pure queries of the scheduler's priority range.
    let (min, max) = unsafe { (sched_get_priority_min(SCHED_FIFO), sched_get_priority_max(SCHED_FIFO)) };
    let (min, max) = if min < 0 || max < 0 { (1, 99) } else { (min, max) };
    // Leave headroom above the controller for kernel threads
    let wanted = prio.unwrap_or(max / 2);
    let prio_val = wanted.clamp(min, max);
    let param = sched_param {
        sched_priority: prio_val,
    };
    // SAFETY: param is a valid sched_param for the duration of the call.
    let rc = unsafe { libc::sched_setscheduler(0, SCHED_FIFO, &param) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EPERM) {
            eyre::bail!("{err}; hint: needs CAP_SYS_NICE or root (e.g. 'sudo setcap cap_sys_nice=ep /path/to/shade')");
        }
        return Err(eyre::eyre!(err));
    }
    Ok(prio_val)
}

#[cfg(not(target_os = "linux"))]
pub fn setup_rt_once(_prio: Option<i32>, _lock: RtLock) {
    tracing::warn!("--rt is only supported on Linux; continuing without it");
}
