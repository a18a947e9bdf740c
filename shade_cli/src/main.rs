#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod backend;
mod cli;
mod error_fmt;
mod logging;
mod protocol;
mod rt;
mod session;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::WrapErr;
use shade_config::{Config, PersistedCalibration};

use crate::cli::{Cli, Commands, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};
use crate::session::{Output, Session};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    if let Err(e) = color_eyre::install() {
        eprintln!("color-eyre install failed: {e}");
    }

    if let Err(err) = real_main(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        std::process::exit(exit_code_for_error(&err));
    }
}

fn load_config(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let cfg = shade_config::load_toml(&text)
        .wrap_err_with(|| format!("parse config {}", path.display()))?;
    cfg.validate().wrap_err("invalid configuration")?;
    Ok(cfg)
}

/// A `--calibration` file wins over the config's inline table. A missing
/// file falls back to the inline table so first runs work.
fn load_calibration(cli: &Cli, cfg: &Config) -> eyre::Result<Option<PersistedCalibration>> {
    let from_file = match &cli.calibration {
        Some(path) => shade_config::load_calibration(path)?,
        None => None,
    };
    Ok(from_file.or(cfg.calibration))
}

fn real_main(cli: Cli) -> eyre::Result<()> {
    let cfg = load_config(&cli.config)?;
    logging::init(cli.json, &cli.log_level, &cfg.logging)?;
    let calibration = load_calibration(&cli, &cfg)?;
    tracing::debug!(config = %cli.config.display(), calibrated = calibration.is_some(), "configuration loaded");

    if let Commands::Health = cli.cmd {
        let out = Output { json: cli.json };
        out.event(
            &serde_json::json!({ "type": "health", "status": "ok", "calibrated": calibration.is_some() }),
            &format!("ok (calibrated={})", calibration.is_some()),
        );
        return Ok(());
    }

    if cli.rt {
        rt::setup_rt_once(cli.rt_prio, cli.rt_lock);
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = shutdown.clone();
        ctrlc::set_handler(move || {
            flag.store(true, Ordering::Relaxed);
        })
        .wrap_err("install Ctrl-C handler")?;
    }

    let backend = backend::assemble(&cfg, calibration, cli.calibration.clone())?;
    let out = Output { json: cli.json };
    let session = Session::start(backend, shutdown, out, cfg.motor.steps_per_revolution)?;

    match cli.cmd {
        Commands::Run => session.run_lines(std::io::BufReader::new(std::io::stdin())),
        Commands::Move { percent } => {
            let st = session.run_to_completion(shade_core::MotionCommand::MoveToPercentage(percent))?;
            out.status(&st);
            Ok(())
        }
        Commands::Up => {
            let st = session.run_to_completion(shade_core::MotionCommand::MoveUp)?;
            out.status(&st);
            Ok(())
        }
        Commands::Down => {
            let st = session.run_to_completion(shade_core::MotionCommand::MoveDown)?;
            out.status(&st);
            Ok(())
        }
        Commands::Calibrate { auto, span } => {
            if cli.calibration.is_none() {
                tracing::warn!("no --calibration file given; the result will not be saved");
            }
            session.calibrate(std::io::BufReader::new(std::io::stdin()), auto, span)
        }
        Commands::SelfCheck => session.self_check(),
        Commands::Health => Ok(()),
    }
}
