use rstest::{fixture, rstest};
use shade_core::mocks::ManualTimer;
use shade_core::{
    CalibrationData, CoverState, Direction, MotionCommand, Shade, ShadeCommand, ShadeError,
    ShadeState,
};
use shade_hardware::SimulatedShade;

struct Rig {
    sim: SimulatedShade,
    timer: ManualTimer,
    shade: Shade,
}

impl Rig {
    fn new(position: u32, calibration: Option<CalibrationData>) -> Self {
        let sim = SimulatedShade::new(position);
        let timer = ManualTimer::new();
        let shade = Shade::builder()
            .with_coils(sim.coils())
            .with_sensor(sim.sensor())
            .with_timer(timer.clone())
            .with_calibration(calibration)
            .build()
            .unwrap();
        Self { sim, timer, shade }
    }

    fn tick(&mut self, n: u32) {
        for _ in 0..n {
            self.shade.on_tick().unwrap();
        }
    }

    fn run_to_idle(&mut self) -> u32 {
        let mut ticks = 0;
        while self.shade.is_moving() {
            self.shade.on_tick().unwrap();
            ticks += 1;
            assert!(ticks < 100_000, "job never finished");
        }
        ticks
    }
}

const BOUNDS: CalibrationData = CalibrationData {
    min_position: 100,
    max_position: 900,
    zebra_offset: 0,
};

#[fixture]
fn rig() -> Rig {
    Rig::new(100, Some(BOUNDS))
}

#[rstest]
fn move_to_half_reaches_the_midpoint(mut rig: Rig) {
    rig.shade.move_to_percentage(50).unwrap();
    assert_eq!(rig.shade.state(), ShadeState::MovingUp);
    assert_eq!(rig.run_to_idle(), 400);
    assert_eq!(rig.shade.position(), 500);
    assert_eq!(rig.sim.position(), 500);
    assert_eq!(rig.shade.percentage().unwrap(), 50.0);
    assert_eq!(rig.shade.state(), ShadeState::Idle);
    assert_eq!(rig.shade.status().position_percentage, Some(50));
}

#[rstest]
#[case(0, 100)]
#[case(25, 300)]
#[case(100, 900)]
fn percentages_map_linearly(mut rig: Rig, #[case] pct: u8, #[case] expected: u32) {
    rig.shade.move_to_percentage(pct).unwrap();
    rig.run_to_idle();
    assert_eq!(rig.shade.position(), expected);
}

#[rstest]
fn fractional_percentage_rounds_to_nearest_step(mut rig: Rig) {
    rig.shade.set_position_percentage(12.3).unwrap();
    rig.run_to_idle();
    assert_eq!(rig.shade.position(), 198);
    rig.shade.set_position_percentage(250.0).unwrap();
    rig.run_to_idle();
    assert_eq!(rig.shade.position(), 900);
}

#[rstest]
fn percentage_above_hundred_is_rejected(mut rig: Rig) {
    assert!(matches!(
        rig.shade.move_to_percentage(101),
        Err(ShadeError::InvalidArgument(_))
    ));
    assert_eq!(rig.shade.state(), ShadeState::Idle);
    assert!(!rig.shade.is_moving());
}

#[rstest]
fn move_to_position_is_bounds_checked(mut rig: Rig) {
    assert!(matches!(
        rig.shade.move_to_position(901),
        Err(ShadeError::InvalidArgument(_))
    ));
    rig.shade.move_to_position(120).unwrap();
    assert_eq!(rig.run_to_idle(), 20);
}

#[rstest]
fn stop_halts_within_one_tick(mut rig: Rig) {
    rig.shade.move_up().unwrap();
    rig.tick(10);
    rig.shade.stop().unwrap();
    assert_eq!(rig.shade.state(), ShadeState::Idle);
    assert_eq!(rig.timer.armed(), None);
    rig.tick(5);
    assert_eq!(rig.shade.position(), 110);
    assert_eq!(rig.sim.position(), 110);
}

#[rstest]
fn repeated_stop_and_same_direction_are_no_ops(mut rig: Rig) {
    rig.shade.stop().unwrap();
    rig.shade.stop().unwrap();
    assert_eq!(rig.shade.state(), ShadeState::Idle);

    rig.shade.move_up().unwrap();
    let arms = rig.timer.arm_count();
    rig.tick(3);
    rig.shade.move_up().unwrap();
    assert_eq!(rig.timer.arm_count(), arms);
    assert_eq!(rig.shade.engine().remaining_steps(), 797);
}

#[rstest]
fn opposite_move_preempts(mut rig: Rig) {
    rig.shade.move_up().unwrap();
    rig.tick(50);
    rig.shade.move_down().unwrap();
    assert_eq!(rig.shade.state(), ShadeState::MovingDown);
    assert_eq!(rig.shade.engine().direction(), Direction::Down);
    rig.run_to_idle();
    assert_eq!(rig.shade.position(), 100);
}

#[rstest]
fn percentage_move_preempts_in_either_direction(mut rig: Rig) {
    rig.shade.move_to_percentage(100).unwrap();
    rig.tick(200);
    rig.shade.move_to_percentage(10).unwrap();
    assert_eq!(rig.shade.state(), ShadeState::MovingDown);
    rig.run_to_idle();
    assert_eq!(rig.shade.position(), 180);
}

#[rstest]
fn moves_at_the_limit_do_nothing(mut rig: Rig) {
    rig.shade.move_down().unwrap();
    assert!(!rig.shade.is_moving());
    assert_eq!(rig.shade.state(), ShadeState::Idle);
    rig.shade.move_to_percentage(0).unwrap();
    assert!(!rig.shade.is_moving());
}

#[test]
fn uncalibrated_shade_refuses_percentages_but_moves() {
    let mut rig = Rig::new(0, None);
    assert_eq!(rig.shade.move_to_percentage(50), Err(ShadeError::NotCalibrated));
    assert_eq!(rig.shade.set_position_percentage(50.0), Err(ShadeError::NotCalibrated));
    assert_eq!(rig.shade.status().position_percentage, None);
    rig.shade.move_up().unwrap();
    rig.tick(10);
    assert_eq!(rig.shade.position(), 10);
    assert!(rig.shade.percentage().is_err());
}

#[rstest]
fn speed_is_clamped_and_applies_to_running_jobs(mut rig: Rig) {
    rig.shade.set_speed(0).unwrap();
    assert_eq!(rig.shade.speed(), 1);
    rig.shade.move_up().unwrap();
    let slow = rig.timer.armed().unwrap();
    rig.shade.set_speed(250).unwrap();
    assert_eq!(rig.shade.speed(), 100);
    assert!(rig.timer.armed().unwrap() < slow);
}

#[rstest]
fn handle_returns_the_new_snapshot(mut rig: Rig) {
    let st = rig.shade.handle(MotionCommand::MoveUp.into()).unwrap();
    assert!(st.is_moving);
    assert_eq!(st.state, ShadeState::MovingUp);
    assert_eq!(CoverState::from_status(&st), CoverState::Opening);
    rig.tick(40);
    let st = rig.shade.handle(ShadeCommand::Motion(MotionCommand::Stop)).unwrap();
    assert!(!st.is_moving);
    assert_eq!(CoverState::from_status(&st), CoverState::Open);
    assert_eq!(
        rig.shade.handle(ShadeCommand::Jog { direction: Direction::Up, steps: 5 }),
        Err(ShadeError::InvalidArgument("jog is only available while calibrating".into()))
    );
}

#[rstest]
fn repeated_target_keeps_the_running_job(mut rig: Rig) {
    rig.shade.move_to_percentage(100).unwrap();
    rig.tick(10);
    let arms = rig.timer.arm_count();
    let cancels = rig.timer.cancel_count();
    rig.shade.move_to_percentage(100).unwrap();
    assert_eq!(rig.timer.arm_count(), arms);
    assert_eq!(rig.timer.cancel_count(), cancels);
    assert_eq!(rig.shade.engine().remaining_steps(), 790);
    assert_eq!(rig.shade.state(), ShadeState::MovingUp);
    rig.run_to_idle();
    assert_eq!(rig.shade.position(), 900);
}

#[rstest]
fn handle_snapshot_before_any_motion_is_closed(mut rig: Rig) {
    let st = rig.shade.handle(MotionCommand::MoveUp.into()).unwrap();
    assert_eq!(st.state, ShadeState::MovingUp);
    let st = rig.shade.handle(MotionCommand::Stop.into()).unwrap();
    assert_eq!(CoverState::from_status(&st), CoverState::Closed);
}

#[rstest]
fn resync_follows_the_sensor_when_idle(mut rig: Rig) {
    rig.sim.set_position(640);
    assert_eq!(rig.shade.resync_position().unwrap(), 640);
    assert_eq!(rig.shade.position(), 640);
    rig.sim.set_position(5000);
    assert_eq!(rig.shade.handle(ShadeCommand::Resync).unwrap().position, 900);
}

#[rstest]
fn closed_only_at_the_bottom(mut rig: Rig) {
    assert_eq!(CoverState::from_status(&rig.shade.status()), CoverState::Closed);
    rig.shade.move_to_percentage(1).unwrap();
    rig.run_to_idle();
    assert_eq!(CoverState::from_status(&rig.shade.status()), CoverState::Open);
}
