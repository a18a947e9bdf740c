//! Line protocol for `shade run` and status line formatting.
//!
//! Commands are case-insensitive words, one per line. A bare integer
//! `0..=100` is a percentage move; a decimal is a fractional one.

use serde_json::json;
use shade_core::util::{degrees_to_steps, rotations_to_steps};
use shade_core::{CoverState, Direction, MotionCommand, ShadeCommand, ShadeError, ShadeStatus};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Line {
    Command(ShadeCommand),
    Quit,
    Empty,
}

/// Parse one input line. `steps_per_revolution` converts `deg`/`rev` jogs.
pub fn parse_line(line: &str, steps_per_revolution: u32) -> Result<Line, String> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(Line::Empty);
    };
    let rest: Vec<&str> = words.collect();
    let upper = head.to_ascii_uppercase();
    if !matches!(upper.as_str(), "JOG" | "SPEED") && !rest.is_empty() {
        return Err(format!("unexpected arguments after {head}"));
    }
    let cmd = match upper.as_str() {
        "OPEN" | "UP" => MotionCommand::MoveUp.into(),
        "CLOSE" | "DOWN" => MotionCommand::MoveDown.into(),
        "STOP" => MotionCommand::Stop.into(),
        "CALIBRATE" => MotionCommand::Calibrate.into(),
        "NEXT" => ShadeCommand::AdvanceCalibration,
        "RESET" => ShadeCommand::Reset,
        "RESYNC" => ShadeCommand::Resync,
        "STATUS" => ShadeCommand::Status,
        "QUIT" | "EXIT" => return Ok(Line::Quit),
        "SPEED" => {
            let speed = rest
                .first()
                .and_then(|s| s.parse::<u8>().ok())
                .ok_or_else(|| "SPEED needs a value 1..100".to_string())?;
            ShadeCommand::SetSpeed(speed)
        }
        "JOG" => parse_jog(&rest, steps_per_revolution)?,
        other => parse_percentage(other)?,
    };
    Ok(Line::Command(cmd))
}

fn parse_percentage(word: &str) -> Result<ShadeCommand, String> {
    if let Ok(p) = word.parse::<u8>() {
        if p > 100 {
            return Err(format!("percentage {p} out of range 0..100"));
        }
        return Ok(MotionCommand::MoveToPercentage(p).into());
    }
    match word.parse::<f32>() {
        Ok(p) if (0.0..=100.0).contains(&p) => Ok(ShadeCommand::SetPositionPercentage(p)),
        Ok(p) => Err(format!("percentage {p} out of range 0..100")),
        Err(_) => Err(format!("unknown command: {word}")),
    }
}

fn parse_jog(args: &[&str], steps_per_revolution: u32) -> Result<ShadeCommand, String> {
    const USAGE: &str = "usage: JOG UP|DOWN <n> [steps|deg|rev]";
    let (dir, amount, unit) = match args {
        [d, n] => (*d, *n, "steps"),
        [d, n, u] => (*d, *n, *u),
        _ => return Err(USAGE.to_string()),
    };
    let direction = match dir.to_ascii_uppercase().as_str() {
        "UP" => Direction::Up,
        "DOWN" => Direction::Down,
        _ => return Err(USAGE.to_string()),
    };
    let steps: i64 = match unit.to_ascii_lowercase().as_str() {
        "steps" | "step" => amount.parse::<i64>().map_err(|_| USAGE.to_string())?,
        "deg" => {
            let v = amount.parse::<f32>().map_err(|_| USAGE.to_string())?;
            degrees_to_steps(v, steps_per_revolution)
        }
        "rev" => {
            let v = amount.parse::<f32>().map_err(|_| USAGE.to_string())?;
            rotations_to_steps(v, steps_per_revolution)
        }
        _ => return Err(USAGE.to_string()),
    };
    if steps <= 0 {
        return Err("jog amount must be at least one step".to_string());
    }
    let steps = u32::try_from(steps).unwrap_or(u32::MAX);
    Ok(ShadeCommand::Jog { direction, steps })
}

/// Render a status snapshot as one output line.
pub fn status_line(status: &ShadeStatus, json: bool) -> String {
    let cover = CoverState::from_status(status).as_str();
    if json {
        json!({
            "type": "status",
            "state": status.state.as_str(),
            "cover": cover,
            "position": status.position,
            "position_percentage": status.position_percentage,
            "is_moving": status.is_moving,
        })
        .to_string()
    } else {
        let pct = status
            .position_percentage
            .map_or_else(|| "--".to_string(), |p| format!("{p}%"));
        format!(
            "state={} cover={cover} position={} percent={pct}",
            status.state, status.position
        )
    }
}

/// Render a rejected command as one output line.
pub fn error_line(err: &ShadeError, json: bool) -> String {
    if json {
        json!({ "type": "error", "reason": error_reason(err), "message": err.to_string() })
            .to_string()
    } else {
        format!("error: {err}")
    }
}

/// Stable machine-readable name for an error kind.
pub fn error_reason(err: &ShadeError) -> &'static str {
    match err {
        ShadeError::InvalidArgument(_) => "InvalidArgument",
        ShadeError::NotCalibrated => "NotCalibrated",
        ShadeError::Busy(_) => "Busy",
        ShadeError::HardwareFault(_) => "HardwareFault",
        ShadeError::OverTravel => "OverTravel",
        ShadeError::Disconnected => "Disconnected",
    }
}
