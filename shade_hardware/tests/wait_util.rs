use std::cell::Cell;
use std::time::{Duration, Instant};

use rstest::rstest;
use shade_hardware::error::HwError;
use shade_hardware::util::wait_until_with_timeout;

// Conversion becomes ready on the `ready_at`-th poll.
fn conversion_ready_after(ready_at: u32) -> (Cell<u32>, impl Fn(&Cell<u32>) -> bool) {
    (Cell::new(0), move |polls: &Cell<u32>| {
        polls.set(polls.get() + 1);
        polls.get() >= ready_at
    })
}

#[rstest]
#[case(1)]
#[case(3)]
#[case(10)]
fn returns_once_the_conversion_is_ready(#[case] ready_at: u32) {
    let (polls, ready) = conversion_ready_after(ready_at);
    wait_until_with_timeout(|| ready(&polls), Duration::from_millis(500), Duration::from_micros(100))
        .expect("conversion should complete");
    assert_eq!(polls.get(), ready_at);
}

#[test]
fn gives_up_after_the_timeout() {
    let started = Instant::now();
    let err = wait_until_with_timeout(|| false, Duration::from_millis(5), Duration::from_micros(200))
        .expect_err("never ready");
    assert!(matches!(err, HwError::DataReadyTimeout), "{err:?}");
    assert!(started.elapsed() >= Duration::from_millis(5));
}

#[test]
fn ready_line_is_checked_before_the_deadline() {
    // zero timeout still polls once
    let (polls, ready) = conversion_ready_after(1);
    assert!(wait_until_with_timeout(|| ready(&polls), Duration::ZERO, Duration::from_secs(1)).is_ok());
    assert_eq!(polls.get(), 1);
}
