use std::sync::{Arc, Mutex};

use shade_core::mocks::ManualTimer;
use shade_core::{
    CalibrationData, CalibrationStep, Direction, Shade, ShadeCommand, ShadeError, ShadeState,
};
use shade_hardware::SimulatedShade;

fn shade(sim: &SimulatedShade, calibration: Option<CalibrationData>) -> Shade {
    Shade::builder()
        .with_coils(sim.coils())
        .with_sensor(sim.sensor())
        .with_timer(ManualTimer::new())
        .with_calibration(calibration)
        .build()
        .unwrap()
}

fn jog(shade: &mut Shade, direction: Direction, steps: u32) {
    shade.jog(direction, steps).unwrap();
    while shade.is_moving() {
        shade.on_tick().unwrap();
    }
}

#[test]
fn guided_calibration_end_to_end() {
    let sim = SimulatedShade::new(0);
    let mut s = shade(&sim, None);
    assert_eq!(s.move_to_percentage(0), Err(ShadeError::NotCalibrated));

    s.calibrate().unwrap();
    assert_eq!(s.state(), ShadeState::Calibrating);
    assert_eq!(s.calibration_step(), Some(CalibrationStep::UpperLimit));

    jog(&mut s, Direction::Up, 1000);
    assert_eq!(s.advance_calibration().unwrap(), CalibrationStep::LowerLimit);
    jog(&mut s, Direction::Down, 900);
    assert_eq!(s.advance_calibration().unwrap(), CalibrationStep::ZebraOffset);
    assert_eq!(s.advance_calibration().unwrap(), CalibrationStep::Complete);

    assert_eq!(s.state(), ShadeState::Idle);
    assert!(s.is_calibrated());
    assert_eq!(
        s.calibration_data(),
        Some(CalibrationData { min_position: 100, max_position: 1000, zebra_offset: 0 })
    );

    s.move_to_percentage(100).unwrap();
    while s.is_moving() {
        s.on_tick().unwrap();
    }
    assert_eq!(s.position(), 1000);
    s.move_to_percentage(0).unwrap();
    while s.is_moving() {
        s.on_tick().unwrap();
    }
    assert_eq!(s.position(), 100);
    assert_eq!(sim.position(), 100);
}

#[test]
fn zebra_capture_sets_the_sensor_offset() {
    let sim = SimulatedShade::new(0);
    let mut s = shade(&sim, None);
    s.calibrate().unwrap();
    jog(&mut s, Direction::Up, 1000);
    s.advance_calibration().unwrap();
    jog(&mut s, Direction::Down, 900);
    s.advance_calibration().unwrap();
    // index mark reads 40 counts ahead of the tracked position
    sim.set_sensor_bias(40);
    s.advance_calibration().unwrap();

    let data = s.calibration_data().unwrap();
    assert_eq!(data.zebra_offset, 40);
    assert_eq!((data.min_position, data.max_position), (60, 960));
    assert_eq!(s.resync_position().unwrap(), 100);
}

#[test]
fn inverted_captures_restart_the_sequence() {
    let sim = SimulatedShade::new(500);
    let mut s = shade(&sim, None);
    s.calibrate().unwrap();
    jog(&mut s, Direction::Down, 200);
    s.advance_calibration().unwrap();
    jog(&mut s, Direction::Up, 300);
    s.advance_calibration().unwrap();
    assert!(matches!(
        s.advance_calibration(),
        Err(ShadeError::InvalidArgument(_))
    ));
    assert_eq!(s.state(), ShadeState::Calibrating);
    assert_eq!(s.calibration_step(), Some(CalibrationStep::UpperLimit));
    assert!(!s.is_calibrated());
}

#[test]
fn stop_abandons_calibration_and_keeps_old_bounds() {
    let sim = SimulatedShade::new(300);
    let old = CalibrationData { min_position: 100, max_position: 900, zebra_offset: 0 };
    let mut s = shade(&sim, Some(old));
    s.calibrate().unwrap();
    jog(&mut s, Direction::Up, 2000);
    assert_eq!(s.position(), 2300);
    s.stop().unwrap();
    assert_eq!(s.state(), ShadeState::Idle);
    assert_eq!(s.calibration_step(), None);
    assert_eq!(s.calibration_data(), Some(old));
    // clamped back into the restored window
    assert_eq!(s.position(), 900);
}

#[test]
fn calibration_rejects_other_motion() {
    let sim = SimulatedShade::new(0);
    let mut s = shade(&sim, None);
    s.calibrate().unwrap();
    assert!(matches!(s.move_up(), Err(ShadeError::Busy(_))));
    assert!(matches!(s.calibrate(), Err(ShadeError::Busy(_))));
    assert!(matches!(
        s.jog(Direction::Up, 0),
        Err(ShadeError::InvalidArgument(_))
    ));
    assert_eq!(s.state(), ShadeState::Calibrating);
}

#[test]
fn advance_outside_calibration_is_rejected() {
    let sim = SimulatedShade::new(0);
    let mut s = shade(&sim, None);
    assert!(matches!(
        s.handle(ShadeCommand::AdvanceCalibration),
        Err(ShadeError::InvalidArgument(_))
    ));
}

#[test]
fn calibrate_preempts_a_running_move() {
    let sim = SimulatedShade::new(0);
    let mut s = shade(&sim, None);
    s.move_up().unwrap();
    s.on_tick().unwrap();
    s.calibrate().unwrap();
    assert!(!s.is_moving());
    assert_eq!(s.state(), ShadeState::Calibrating);
}

#[test]
fn advance_stops_a_running_jog() {
    let sim = SimulatedShade::new(0);
    let mut s = shade(&sim, None);
    s.calibrate().unwrap();
    s.jog(Direction::Up, 50).unwrap();
    for _ in 0..20 {
        s.on_tick().unwrap();
    }
    assert_eq!(s.advance_calibration().unwrap(), CalibrationStep::LowerLimit);
    assert!(!s.is_moving());
    assert_eq!(s.position(), 20);
}

#[test]
fn committed_calibration_reaches_the_sink() {
    let seen: Arc<Mutex<Option<CalibrationData>>> = Arc::default();
    let sink_seen = seen.clone();
    let sim = SimulatedShade::new(0);
    let mut s = Shade::builder()
        .with_coils(sim.coils())
        .with_sensor(sim.sensor())
        .with_timer(ManualTimer::new())
        .with_calibration_sink(Box::new(move |d| {
            *sink_seen.lock().unwrap() = Some(*d);
        }))
        .build()
        .unwrap();
    s.calibrate().unwrap();
    jog(&mut s, Direction::Up, 10);
    s.advance_calibration().unwrap();
    jog(&mut s, Direction::Down, 10);
    s.advance_calibration().unwrap();
    s.advance_calibration().unwrap();
    assert_eq!(
        *seen.lock().unwrap(),
        Some(CalibrationData { min_position: 0, max_position: 10, zebra_offset: 0 })
    );
}
