use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::tempdir;

// Fast motor so simulated moves finish in milliseconds.
fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[pins]
# pins are unused in the simulator backend but must be present
coils = [17, 18, 27, 22]
enable = 23
fault_in = 24

[motor]
min_step_delay_us = 100
max_step_delay_us = 200
default_speed = 50
calibration_speed = 50

[travel]
nominal_steps = 200

[supervisor]
poll_ms = 10
watchdog_ms = 1000
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn write_calibration(dir: &tempfile::TempDir, min: u32, max: u32) -> PathBuf {
    let path = dir.path().join("calibration.toml");
    fs::write(
        &path,
        format!("[calibration]\nmin_position = {min}\nmax_position = {max}\n"),
    )
    .unwrap();
    path
}

fn shade(cfg: &Path) -> Command {
    let mut cmd = Command::cargo_bin("shade").unwrap();
    cmd.arg("--config").arg(cfg).arg("--log-level").arg("error");
    cmd.env_remove("RUST_LOG");
    cmd
}

fn last_json(stdout: &[u8]) -> serde_json::Value {
    let text = String::from_utf8_lossy(stdout);
    let line = text.lines().last().unwrap_or_default();
    serde_json::from_str(line).unwrap_or_else(|e| panic!("bad JSON line {line:?}: {e}"))
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["health"], 0, "ok", "stdout")]
#[case(&["move"], 2, "required", "stderr")]
#[case(&["move", "--percent", "101"], 2, "101", "stderr")]
#[case(&["move", "--percent", "50"], 4, "not calibrated", "stderr")]
#[case(&["calibrate", "--auto", "--span", "0"], 3, "steps > 0", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = shade(&cfg);
    for a in args {
        cmd.arg(a);
    }
    let output = cmd.output().unwrap();
    assert_eq!(
        output.status.code(),
        Some(exit_code),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let text = match stream {
        "stdout" => String::from_utf8_lossy(&output.stdout).to_string(),
        _ => String::from_utf8_lossy(&output.stderr).to_string(),
    };
    assert!(text.contains(needle), "{stream} lacks {needle:?}: {text}");
}

#[test]
fn move_runs_to_the_requested_percentage() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let cal = write_calibration(&dir, 0, 400);

    let out = shade(&cfg)
        .arg("--json")
        .arg("--calibration")
        .arg(&cal)
        .args(["move", "--percent", "50"])
        .env("SHADE_SIM_POSITION", "0")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v = last_json(&out);
    assert_eq!(v["type"], "status");
    assert_eq!(v["state"], "idle");
    assert_eq!(v["position"], 200);
    assert_eq!(v["position_percentage"], 50);
    assert_eq!(v["cover"], "open");
}

#[test]
fn down_without_calibration_travels_nominal_steps() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let out = shade(&cfg)
        .arg("--json")
        .arg("down")
        .env("SHADE_SIM_POSITION", "1000")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v = last_json(&out);
    assert_eq!(v["position"], 800);
    assert!(v["position_percentage"].is_null());
}

#[test]
fn auto_calibration_writes_the_calibration_file() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let cal = dir.path().join("saved.toml");

    shade(&cfg)
        .arg("--calibration")
        .arg(&cal)
        .args(["calibrate", "--auto", "--span", "300"])
        .env("SHADE_SIM_POSITION", "0")
        .assert()
        .success()
        .stdout(predicate::str::contains("calibration complete: min=0 max=300"));

    let text = fs::read_to_string(&cal).unwrap();
    assert!(text.contains("[calibration]"), "{text}");
    assert!(text.contains("min_position = 0"), "{text}");
    assert!(text.contains("max_position = 300"), "{text}");

    // The saved file is picked up on the next run.
    let out = shade(&cfg)
        .arg("--json")
        .arg("--calibration")
        .arg(&cal)
        .args(["move", "--percent", "100"])
        .env("SHADE_SIM_POSITION", "0")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(last_json(&out)["position"], 300);
}

#[test]
fn bad_calibration_file_is_rejected() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let cal = write_calibration(&dir, 500, 100);

    shade(&cfg)
        .arg("--calibration")
        .arg(&cal)
        .arg("health")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid calibration"));
}

#[test]
fn missing_calibration_file_starts_uncalibrated() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    shade(&cfg)
        .arg("--calibration")
        .arg(dir.path().join("absent.toml"))
        .arg("health")
        .assert()
        .success()
        .stdout(predicate::str::contains("calibrated=false"));
}

#[test]
fn invalid_config_reports_the_offending_key() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[pins]\ncoils = [1, 2, 3, 4]\n[motor]\ndefault_speed = 0\n").unwrap();

    shade(&path)
        .arg("health")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("motor.default_speed"));
}

#[test]
fn missing_config_file_is_explained() {
    let dir = tempdir().unwrap();
    shade(&dir.path().join("nope.toml"))
        .arg("health")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Could not load the configuration"));
}

#[test]
fn json_errors_are_structured() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let out = shade(&cfg)
        .arg("--json")
        .args(["move", "--percent", "10"])
        .assert()
        .code(4)
        .get_output()
        .stderr
        .clone();
    let text = String::from_utf8_lossy(&out);
    let line = text
        .lines()
        .find(|l| l.contains("\"type\":\"error\""))
        .unwrap_or_else(|| panic!("no JSON error line in {text}"));
    let v: serde_json::Value = serde_json::from_str(line).unwrap();
    assert_eq!(v["reason"], "NotCalibrated");
}

#[test]
fn self_check_reports_the_simulator() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let out = shade(&cfg)
        .arg("--json")
        .arg("self-check")
        .env("SHADE_SIM_POSITION", "42")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v = last_json(&out);
    assert_eq!(v["type"], "self_check");
    assert_eq!(v["backend"], "simulator");
    assert_eq!(v["position"], 42);
    assert_eq!(v["calibrated"], false);
}
