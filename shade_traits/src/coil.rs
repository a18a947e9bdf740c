//! Coil energization patterns for a four-phase unipolar stepper.

/// Levels of the four coil outputs (IN1..IN4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoilPattern(pub [bool; 4]);

impl CoilPattern {
    /// All coils released: the lowest power-draw idle pattern.
    pub const OFF: CoilPattern = CoilPattern([false; 4]);

    pub fn is_off(self) -> bool {
        self == Self::OFF
    }

    /// Position of this pattern in the half-step cycle, if it belongs to it.
    ///
    /// Every full-step pattern is also a half-step pattern (at even indices),
    /// so this gives one phase space for both modes.
    pub fn half_step_phase(self) -> Option<usize> {
        HALF_STEP.iter().position(|p| *p == self)
    }
}

const fn p(a: u8, b: u8, c: u8, d: u8) -> CoilPattern {
    CoilPattern([a != 0, b != 0, c != 0, d != 0])
}

/// Wave drive: one coil at a time.
pub const FULL_STEP: [CoilPattern; 4] = [p(1, 0, 0, 0), p(0, 1, 0, 0), p(0, 0, 1, 0), p(0, 0, 0, 1)];

/// Half stepping: alternates one and two energized coils.
pub const HALF_STEP: [CoilPattern; 8] = [
    p(1, 0, 0, 0),
    p(1, 1, 0, 0),
    p(0, 1, 0, 0),
    p(0, 1, 1, 0),
    p(0, 0, 1, 0),
    p(0, 0, 1, 1),
    p(0, 0, 0, 1),
    p(1, 0, 0, 1),
];

/// Coil sequencing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepMode {
    Full,
    #[default]
    Half,
}

impl StepMode {
    pub fn from_half_step(half_step: bool) -> Self {
        if half_step { StepMode::Half } else { StepMode::Full }
    }

    pub fn is_half(self) -> bool {
        matches!(self, StepMode::Half)
    }

    pub fn sequence(self) -> &'static [CoilPattern] {
        match self {
            StepMode::Full => &FULL_STEP,
            StepMode::Half => &HALF_STEP,
        }
    }

    /// Number of patterns in one electrical cycle (4 or 8).
    pub fn sequence_len(self) -> u32 {
        self.sequence().len() as u32
    }

    /// Pattern for a step index; the index is reduced modulo the cycle length.
    pub fn pattern(self, index: u32) -> CoilPattern {
        let seq = self.sequence();
        seq[(index % seq.len() as u32) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_step_patterns_sit_on_even_half_phases() {
        for (i, pat) in FULL_STEP.iter().enumerate() {
            assert_eq!(pat.half_step_phase(), Some(i * 2));
        }
    }

    #[test]
    fn off_is_not_in_any_sequence() {
        assert!(CoilPattern::OFF.half_step_phase().is_none());
        assert!(CoilPattern::OFF.is_off());
    }

    #[test]
    fn pattern_wraps() {
        assert_eq!(StepMode::Full.pattern(5), FULL_STEP[1]);
        assert_eq!(StepMode::Half.pattern(9), HALF_STEP[1]);
    }
}
