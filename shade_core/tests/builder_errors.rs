use rstest::rstest;
use shade_core::error::BuildError;
use shade_core::mocks::{FixedSensor, ManualTimer, RecordingCoils};
use shade_core::{CalibrationData, MotorCfg, Shade, ShadeError, SupervisorCfg, Timeouts, TravelCfg};
use shade_hardware::SimulatedShade;

#[rstest]
fn missing_coils_yields_typed_build_error() {
    let err = Shade::builder()
        .with_sensor(FixedSensor::new(0))
        .with_timer(ManualTimer::new())
        .try_build()
        .expect_err("should fail with MissingCoils");
    match err.downcast_ref::<BuildError>() {
        Some(BuildError::MissingCoils) => {}
        other => panic!("expected MissingCoils, got: {other:?}"),
    }
}

#[rstest]
fn missing_timer_yields_typed_build_error() {
    let err = Shade::builder()
        .with_coils(RecordingCoils::new())
        .with_sensor(FixedSensor::new(0))
        .try_build()
        .expect_err("should fail with MissingTimer");
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::MissingTimer)
    ));
}

#[rstest]
#[case::zero_min_delay(MotorCfg { min_step_delay_us: 0, ..MotorCfg::default() }, "min_step_delay_us")]
#[case::inverted_delays(MotorCfg { min_step_delay_us: 6000, ..MotorCfg::default() }, "max_step_delay_us")]
#[case::no_steps_per_rev(MotorCfg { steps_per_revolution: 0, ..MotorCfg::default() }, "steps_per_revolution")]
fn invalid_motor_config_is_rejected(#[case] motor: MotorCfg, #[case] needle: &str) {
    let err = Shade::builder()
        .with_coils(RecordingCoils::new())
        .with_sensor(FixedSensor::new(0))
        .with_timer(ManualTimer::new())
        .with_motor(motor)
        .build()
        .expect_err("config should be rejected");
    match err.downcast_ref::<BuildError>() {
        Some(BuildError::InvalidConfig(msg)) => assert!(msg.contains(needle), "{msg}"),
        other => panic!("expected InvalidConfig, got: {other:?}"),
    }
}

#[rstest]
fn watchdog_shorter_than_a_slow_step_is_rejected() {
    let err = Shade::builder()
        .with_coils(RecordingCoils::new())
        .with_sensor(FixedSensor::new(0))
        .with_timer(ManualTimer::new())
        .with_motor(MotorCfg {
            max_step_delay_us: 900_000,
            ..MotorCfg::default()
        })
        .with_supervisor(SupervisorCfg {
            poll_ms: 100,
            watchdog_ms: 200,
            fault_debounce_n: 2,
        })
        .build()
        .expect_err("watchdog would trip on a healthy speed 1 job");
    match err.downcast_ref::<BuildError>() {
        Some(BuildError::InvalidConfig(msg)) => {
            assert!(msg.contains("slowest step"), "{msg}");
        }
        other => panic!("expected InvalidConfig, got: {other:?}"),
    }
}

#[rstest]
#[case(TravelCfg { nominal_steps: 0 }, SupervisorCfg::default(), Timeouts::default())]
#[case(TravelCfg::default(), SupervisorCfg { poll_ms: 0, ..SupervisorCfg::default() }, Timeouts::default())]
#[case(TravelCfg::default(), SupervisorCfg { watchdog_ms: 100, ..SupervisorCfg::default() }, Timeouts::default())]
#[case(TravelCfg::default(), SupervisorCfg { fault_debounce_n: 0, ..SupervisorCfg::default() }, Timeouts::default())]
#[case(TravelCfg::default(), SupervisorCfg::default(), Timeouts { sensor_ms: 0 })]
fn invalid_runtime_config_is_rejected(
    #[case] travel: TravelCfg,
    #[case] supervisor: SupervisorCfg,
    #[case] timeouts: Timeouts,
) {
    let err = Shade::builder()
        .with_coils(RecordingCoils::new())
        .with_sensor(FixedSensor::new(0))
        .with_timer(ManualTimer::new())
        .with_travel(travel)
        .with_supervisor(supervisor)
        .with_timeouts(timeouts)
        .build()
        .expect_err("config should be rejected");
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::InvalidConfig(_))
    ));
}

#[rstest]
fn inverted_persisted_calibration_fails_the_build() {
    let err = Shade::builder()
        .with_coils(RecordingCoils::new())
        .with_sensor(FixedSensor::new(0))
        .with_timer(ManualTimer::new())
        .with_calibration(Some(CalibrationData {
            min_position: 500,
            max_position: 500,
            zebra_offset: 0,
        }))
        .build()
        .expect_err("min == max must be rejected");
    assert!(err.to_string().contains("restore calibration"));
    assert!(matches!(
        err.downcast_ref::<ShadeError>(),
        Some(ShadeError::InvalidArgument(_))
    ));
}

#[rstest]
fn unreadable_sensor_fails_the_build() {
    let sim = SimulatedShade::new(0);
    sim.fail_sensor_reads(1);
    let err = Shade::builder()
        .with_coils(sim.coils())
        .with_sensor(sim.sensor())
        .with_timer(ManualTimer::new())
        .build()
        .expect_err("sensor timeout must fail the build");
    assert!(err.to_string().contains("initial position read"));
    assert_eq!(
        err.downcast_ref::<ShadeError>(),
        Some(&ShadeError::HardwareFault("position sensor timeout".into()))
    );
}

#[rstest]
fn built_shade_starts_at_the_sensor_reading() {
    let shade = Shade::builder()
        .with_coils(RecordingCoils::new())
        .with_sensor(FixedSensor::new(321))
        .with_timer(ManualTimer::new())
        .build()
        .unwrap();
    assert_eq!(shade.position(), 321);
    assert!(!shade.is_calibrated());
}
