use std::fs;

use rstest::rstest;
use shade_config::{PersistedCalibration, load_calibration, save_calibration};
use tempfile::tempdir;

#[rstest]
fn save_then_load_returns_same_bounds() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("calibration.toml");
    let cal = PersistedCalibration {
        min_position: 120,
        max_position: 18_400,
        zebra_offset: -3,
    };
    save_calibration(&path, cal).unwrap();
    assert_eq!(load_calibration(&path).unwrap(), Some(cal));
    // temp file is renamed away
    assert!(!path.with_extension("toml.new").exists());
}

#[rstest]
fn missing_file_means_uncalibrated() {
    let dir = tempdir().unwrap();
    assert_eq!(load_calibration(&dir.path().join("nope.toml")).unwrap(), None);
}

#[rstest]
fn offset_is_optional_on_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cal.toml");
    fs::write(&path, "[calibration]\nmin_position = 0\nmax_position = 500\n").unwrap();
    let cal = load_calibration(&path).unwrap().unwrap();
    assert_eq!(cal.zebra_offset, 0);
}

#[rstest]
#[case("[calibration]\nmin_position = 500\nmax_position = 500\n", "must be <")]
#[case("[calibration]\nmin_position = 1\n", "parse calibration")]
#[case("not toml at all [", "parse calibration")]
fn bad_files_are_rejected(#[case] body: &str, #[case] needle: &str) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cal.toml");
    fs::write(&path, body).unwrap();
    let err = load_calibration(&path).unwrap_err();
    assert!(format!("{err:#}").contains(needle), "{err:#}");
}

#[rstest]
fn refuses_to_save_inverted_bounds() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cal.toml");
    let err = save_calibration(
        &path,
        PersistedCalibration {
            min_position: 10,
            max_position: 5,
            zebra_offset: 0,
        },
    )
    .unwrap_err();
    assert!(format!("{err}").contains("must be <"));
    assert!(!path.exists());
}

#[rstest]
fn save_overwrites_previous_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cal.toml");
    let a = PersistedCalibration { min_position: 0, max_position: 10, zebra_offset: 0 };
    let b = PersistedCalibration { min_position: 5, max_position: 50, zebra_offset: 2 };
    save_calibration(&path, a).unwrap();
    save_calibration(&path, b).unwrap();
    assert_eq!(load_calibration(&path).unwrap(), Some(b));
}
