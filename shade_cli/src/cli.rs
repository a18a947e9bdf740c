//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "shade", version, about = "Motorized shade controller")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/shade_config.toml")]
    pub config: PathBuf,

    /// Calibration file; loaded at startup and rewritten after calibration
    #[arg(long, value_name = "FILE")]
    pub calibration: Option<PathBuf>,

    /// Print status and errors as JSON lines instead of text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Enable real-time mode (SCHED_FIFO, mlockall)
    #[arg(
        long,
        action = ArgAction::SetTrue,
        long_help = "Enable real-time mode on Linux.\n\nAttempts SCHED_FIFO priority and mlockall to keep step timing steady. Requires CAP_SYS_NICE / CAP_IPC_LOCK (or root) and a sufficient 'ulimit -l'. Failures are reported as warnings and the controller keeps running."
    )]
    pub rt: bool,

    /// SCHED_FIFO priority when --rt is enabled (Linux only)
    #[arg(long, value_name = "PRIO")]
    pub rt_prio: Option<i32>,

    /// Memory locking mode for --rt: none, current, or all
    #[arg(long, value_enum, value_name = "MODE", default_value = "current")]
    pub rt_lock: RtLock,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Memory locking mode for real-time operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum RtLock {
    /// Do not lock memory
    None,
    /// Lock currently resident pages
    Current,
    /// Lock current and future pages
    All,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read commands from stdin, one per line, and print status lines
    ///
    /// Commands: OPEN, CLOSE, STOP, 0..100, CALIBRATE, NEXT,
    /// JOG UP|DOWN <n> [steps|deg|rev], SPEED <1..100>, RESYNC, RESET, STATUS, QUIT.
    Run,
    /// Move to a percentage of calibrated travel and wait
    Move {
        /// Target position, 0 (bottom) to 100 (top)
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        percent: u8,
    },
    /// Raise the shade to the top (or by the nominal travel if uncalibrated)
    Up,
    /// Lower the shade to the bottom (or by the nominal travel if uncalibrated)
    Down,
    /// Guided calibration of the travel limits
    Calibrate {
        /// Drive the simulator through a scripted sequence (no prompts)
        #[arg(long, action = ArgAction::SetTrue)]
        auto: bool,
        /// Travel in steps between the limits for --auto
        #[arg(long, value_name = "STEPS", default_value_t = 1000)]
        span: u32,
    },
    /// Quick hardware check: builds the controller and reads the position once
    SelfCheck,
    /// Health check for operational monitoring (config and calibration only)
    Health,
}
