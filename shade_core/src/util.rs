//! Speed, period and unit helpers for the pulse path.

pub const MIN_SPEED: u8 = 1;
pub const MAX_SPEED: u8 = 100;

/// Clamp a speed request into `1..=100`; out-of-range values are never rejected.
#[inline]
pub fn clamp_speed(speed: u8) -> u8 {
    speed.clamp(MIN_SPEED, MAX_SPEED)
}

/// Per-step delay for `speed`, linear between `max_us` (speed 1) and
/// `min_us` (speed 100).
///
/// If the bounds are swapped the larger one is still treated as the slow end.
#[inline]
pub fn step_delay_us(speed: u8, min_us: u32, max_us: u32) -> u32 {
    let (lo, hi) = if min_us <= max_us {
        (min_us, max_us)
    } else {
        (max_us, min_us)
    };
    let s = u64::from(clamp_speed(speed) - MIN_SPEED);
    let span = u64::from(hi - lo);
    let range = u64::from(MAX_SPEED - MIN_SPEED);
    // s <= range, so the product stays below span and fits in u32
    hi - (s * span / range) as u32
}

/// Convert an angle to a signed step count, truncating toward zero.
#[inline]
pub fn degrees_to_steps(degrees: f32, steps_per_revolution: u32) -> i64 {
    if !degrees.is_finite() {
        return 0;
    }
    (f64::from(degrees) * f64::from(steps_per_revolution) / 360.0) as i64
}

/// Convert whole or fractional rotations to a signed step count.
#[inline]
pub fn rotations_to_steps(rotations: f32, steps_per_revolution: u32) -> i64 {
    if !rotations.is_finite() {
        return 0;
    }
    (f64::from(rotations) * f64::from(steps_per_revolution)) as i64
}
